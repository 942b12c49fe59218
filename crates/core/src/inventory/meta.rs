//! Closed meta vocabularies for items and storage units.
//!
//! Each entity type has its own allow-list of meta keys. A key knows its wire
//! label and validates its own value, so a meta map can never hold a key the
//! entity type does not support.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on photos attached to one entity.
pub const MAX_PHOTOS_COUNT: usize = 5;

/// Meta map keyed by an entity's allowed meta keys.
pub type MetaMap<K> = BTreeMap<K, MetaValue>;

/// One attached photo. `src` is the encoded image, normally a data URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub src: String,
}

impl Photo {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            id: format!("p-{}", Uuid::now_v7().simple()),
            src: src.into(),
        }
    }
}

/// A meta value. `Photos` holds the attached images; everything else is text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    Photos(Vec<Photo>),
}

impl MetaValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Photos(_) => None,
        }
    }
}

/// Behaviour shared by the per-entity meta key enums.
pub trait MetaKey:
    Copy + Ord + Hash + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Every supported key, in display order.
    const ALL: &'static [Self];

    /// Wire and display label, e.g. `"Part Number"`.
    fn label(self) -> &'static str;

    /// Returns the user-facing message when `value` is not acceptable for this key.
    fn validate(self, value: &MetaValue) -> Result<(), String>;

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemMetaKey {
    Description,
    Tags,
    #[serde(rename = "Part Number")]
    PartNumber,
    #[serde(rename = "Serial Number")]
    SerialNumber,
    Link,
    Manufacturer,
    #[serde(rename = "Datasheet Link")]
    DatasheetLink,
    Photos,
}

impl MetaKey for ItemMetaKey {
    const ALL: &'static [Self] = &[
        Self::Description,
        Self::Tags,
        Self::PartNumber,
        Self::SerialNumber,
        Self::Link,
        Self::Manufacturer,
        Self::DatasheetLink,
        Self::Photos,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Description => "Description",
            Self::Tags => "Tags",
            Self::PartNumber => "Part Number",
            Self::SerialNumber => "Serial Number",
            Self::Link => "Link",
            Self::Manufacturer => "Manufacturer",
            Self::DatasheetLink => "Datasheet Link",
            Self::Photos => "Photos",
        }
    }

    fn validate(self, value: &MetaValue) -> Result<(), String> {
        match self {
            Self::Link | Self::DatasheetLink => validate_link(value),
            Self::Photos => validate_photos(value, "max"),
            Self::Description
            | Self::Tags
            | Self::PartNumber
            | Self::SerialNumber
            | Self::Manufacturer => validate_text(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageMetaKey {
    Location,
    Capacity,
    Description,
    Photos,
}

impl MetaKey for StorageMetaKey {
    const ALL: &'static [Self] = &[
        Self::Location,
        Self::Capacity,
        Self::Description,
        Self::Photos,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Location => "Location",
            Self::Capacity => "Capacity",
            Self::Description => "Description",
            Self::Photos => "Photos",
        }
    }

    fn validate(self, value: &MetaValue) -> Result<(), String> {
        match self {
            Self::Photos => validate_photos(value, "maximum"),
            Self::Location | Self::Capacity | Self::Description => validate_text(value),
        }
    }
}

impl fmt::Display for ItemMetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for StorageMetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn validate_text(value: &MetaValue) -> Result<(), String> {
    match value {
        MetaValue::Text(text) if !text.trim().is_empty() => Ok(()),
        MetaValue::Text(_) => Err("Cannot be empty.".to_string()),
        MetaValue::Photos(_) => Err("Must be text.".to_string()),
    }
}

fn validate_link(value: &MetaValue) -> Result<(), String> {
    let Some(link) = value.as_text() else {
        return Err("Must be a valid URL.".to_string());
    };
    if link.trim().is_empty() {
        return Err("Link cannot be empty.".to_string());
    }
    url::Url::parse(link.trim())
        .map(|_| ())
        .map_err(|_| "Must be a valid URL.".to_string())
}

/// `limit_word` is how the limit is spelled in the too-many message, which
/// differs between items ("max") and storage units ("maximum").
fn validate_photos(value: &MetaValue, limit_word: &str) -> Result<(), String> {
    match value {
        MetaValue::Photos(photos) if photos.is_empty() => {
            Err(format!("Upload up to {} photos.", MAX_PHOTOS_COUNT))
        }
        MetaValue::Photos(photos) if photos.len() > MAX_PHOTOS_COUNT => Err(format!(
            "Too many photos ({} {}).",
            limit_word, MAX_PHOTOS_COUNT
        )),
        MetaValue::Photos(_) => Ok(()),
        MetaValue::Text(_) => Err("Photos must be uploaded images.".to_string()),
    }
}
