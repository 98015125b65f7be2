//! Key/value tag parsing for created volumes.
//!
//! Users pass tags as `key=value` strings. The parsed set always carries a
//! `Name` tag, which the volume directory later reads back as the volume's
//! name, and a `CreatedBy` marker.

use serde::Serialize;
use thiserror::Error;

/// Tag key holding the user-facing volume name.
pub const NAME_TAG_KEY: &str = "Name";

/// Tag key marking resources created by this tool.
pub const CREATED_BY_TAG_KEY: &str = "CreatedBy";

/// Value stored under [`CREATED_BY_TAG_KEY`].
pub const CREATED_BY_TAG_VALUE: &str = "volport";

/// A single key/value tag.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value; may be empty.
    pub value: String,
}

impl Tag {
    /// Creates a tag from a key and value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered collection of tags applied to a volume.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagSet(Vec<Tag>);

impl TagSet {
    /// Returns the value of the first tag whose key matches exactly.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        find_value(&self.0, key)
    }

    /// Returns the value of the `Name` tag, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get(NAME_TAG_KEY)
    }

    /// Iterates over the tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Returns the number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the set holds no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Errors raised while parsing raw tag strings.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TagError {
    /// The entry has no `=` separator.
    #[error("invalid tag '{0}': expected KEY=VALUE")]
    MissingSeparator(String),
    /// The key is blank.
    #[error("invalid tag '{0}': key must not be empty")]
    EmptyKey(String),
    /// The same key appears twice.
    #[error("duplicate tag key '{0}'")]
    DuplicateKey(String),
}

/// Returns the value of the first tag in `tags` whose key equals `key`.
#[must_use]
pub fn find_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
}

/// Parses `key=value` entries and adds the implicit tags for `volume_name`.
///
/// A user-supplied `Name` tag wins over the implicit one.
///
/// # Errors
///
/// Returns [`TagError`] when an entry is malformed or a key repeats.
pub fn parse_tags<S: AsRef<str>>(raw: &[S], volume_name: &str) -> Result<TagSet, TagError> {
    let mut tags: Vec<Tag> = Vec::with_capacity(raw.len() + 2);
    for entry in raw {
        let text = entry.as_ref();
        let (key, value) = text
            .split_once('=')
            .ok_or_else(|| TagError::MissingSeparator(text.to_owned()))?;
        let trimmed_key = key.trim();
        if trimmed_key.is_empty() {
            return Err(TagError::EmptyKey(text.to_owned()));
        }
        if find_value(&tags, trimmed_key).is_some() {
            return Err(TagError::DuplicateKey(trimmed_key.to_owned()));
        }
        tags.push(Tag::new(trimmed_key, value.trim()));
    }

    if find_value(&tags, NAME_TAG_KEY).is_none() {
        tags.push(Tag::new(NAME_TAG_KEY, volume_name));
    }
    if find_value(&tags, CREATED_BY_TAG_KEY).is_none() {
        tags.push(Tag::new(CREATED_BY_TAG_KEY, CREATED_BY_TAG_VALUE));
    }
    Ok(TagSet(tags))
}
