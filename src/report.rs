//! Rendering of volume listings for the terminal.

use std::io::{self, Write};

use crate::volume::VolumeRecord;

const HEADERS: [&str; 6] = ["ID", "NAME", "STATUS", "SIZE", "ATTACHED TO", "CREATED"];
const SIZE_UNITS: [(&str, u32); 4] = [("T", 40), ("G", 30), ("M", 20), ("K", 10)];

/// Formats a byte count with the largest binary unit that divides it
/// exactly, falling back to plain bytes.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    if bytes != 0 {
        for (suffix, shift) in SIZE_UNITS {
            if bytes.trailing_zeros() >= shift {
                return format!("{}{suffix}", bytes >> shift);
            }
        }
    }
    format!("{bytes}B")
}

fn row(record: &VolumeRecord) -> [String; 6] {
    [
        record.id.clone().unwrap_or_default(),
        record.name.clone(),
        record.status.clone(),
        format_size(record.size_bytes),
        record.attached_to(),
        record.created_at.clone().unwrap_or_default(),
    ]
}

fn write_row(out: &mut impl Write, cells: &[String], widths: &[usize]) -> io::Result<()> {
    let mut line = String::new();
    for (index, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if index > 0 {
            line.push_str("  ");
        }
        line.push_str(&format!("{cell:<width$}"));
    }
    writeln!(out, "{}", line.trim_end())
}

/// Writes `volumes` as an aligned table with a header row.
///
/// # Errors
///
/// Returns any error raised by the writer.
pub fn write_table(out: &mut impl Write, volumes: &[VolumeRecord]) -> io::Result<()> {
    let headers = HEADERS.map(str::to_owned);
    let rows: Vec<[String; 6]> = volumes.iter().map(row).collect();
    let mut widths = headers.clone().map(|header| header.chars().count());
    for cells in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    write_row(out, &headers, &widths)?;
    for cells in &rows {
        write_row(out, cells, &widths)?;
    }
    Ok(())
}

/// Writes `volumes` as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns [`serde_json::Error`] when serialisation or writing fails.
pub fn write_json(out: &mut impl Write, volumes: &[VolumeRecord]) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(&mut *out, volumes)?;
    writeln!(out).map_err(serde_json::Error::io)
}
