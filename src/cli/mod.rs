//! Command-line interface definitions for the `volport` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `volport` binary.
#[derive(Debug, Parser)]
#[command(
    name = "volport",
    about = "Import locally built disk images as attachable cloud block volumes",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Build an image, import it as a snapshot and create a volume from it.
    #[command(name = "create", about = "Build, import and materialise a volume")]
    Create(CreateCommand),
    /// List volumes visible to the configured credentials.
    #[command(name = "list", about = "List volumes")]
    List(ListCommand),
    /// Delete a volume. Attached volumes are rejected by the provider.
    #[command(name = "delete", about = "Delete a volume")]
    Delete(DeleteCommand),
    /// Attach a volume to an instance at the configured device slot.
    #[command(name = "attach", about = "Attach a volume to an instance")]
    Attach(AttachmentCommand),
    /// Detach a volume from an instance at the configured device slot.
    #[command(name = "detach", about = "Detach a volume from an instance")]
    Detach(AttachmentCommand),
}

/// Arguments for the `volport create` subcommand.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Logical volume name, also applied as the `Name` tag.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
    /// Directory whose contents seed the image.
    #[arg(long, value_name = "DIR")]
    pub(crate) data: Option<String>,
    /// Image size such as `512M` or `2G`; minimal when omitted.
    #[arg(long, value_name = "SIZE")]
    pub(crate) size: Option<String>,
    /// Extra tag applied to the volume; may be repeated.
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub(crate) tags: Vec<String>,
    /// Provider the image is built for.
    #[arg(long, value_name = "PROVIDER", default_value = "aws")]
    pub(crate) provider: String,
}

/// Arguments for the `volport list` subcommand.
#[derive(Debug, Args)]
pub(crate) struct ListCommand {
    /// Print JSON instead of a table.
    #[arg(long)]
    pub(crate) json: bool,
}

/// Arguments for the `volport delete` subcommand.
#[derive(Debug, Args)]
pub(crate) struct DeleteCommand {
    /// Volume to delete.
    #[arg(value_name = "VOLUME_ID")]
    pub(crate) volume_id: String,
}

/// Arguments for the `volport attach` and `volport detach` subcommands.
#[derive(Debug, Args)]
pub(crate) struct AttachmentCommand {
    /// Target instance.
    #[arg(value_name = "INSTANCE_ID")]
    pub(crate) instance_id: String,
    /// Volume to attach or detach.
    #[arg(value_name = "VOLUME_ID")]
    pub(crate) volume_id: String,
}
