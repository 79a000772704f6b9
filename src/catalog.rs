//! Sticker catalog
//!
//! The catalog is an ordered list of sticker descriptors loaded from the
//! upstream `characters.json`. Entries are stably sorted by character name
//! (case-insensitive) and numbered `1..=N` on every load; ids are positions,
//! not identifiers carried across loads.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StickerError};

/// Default text placement for a sticker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPlacement {
    pub text: String,
    /// Center x in render space
    pub x: i32,
    /// Center y in render space
    pub y: i32,
    /// Rotation as stored upstream (`r`)
    #[serde(rename = "r")]
    pub rotation: i32,
    /// Font size in render space (`s`)
    #[serde(rename = "s")]
    pub size: i32,
}

/// A single sticker entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerDescriptor {
    /// Position in the sorted catalog, reassigned on every load
    #[serde(skip_deserializing)]
    pub id: String,
    pub name: String,
    /// Owning character, compared case-insensitively
    pub character: String,
    /// Image path relative to the asset root
    #[serde(rename = "img")]
    pub image: String,
    /// Default text color (hex)
    pub color: String,
    #[serde(rename = "defaultText")]
    pub default_text: DefaultPlacement,
}

impl StickerDescriptor {
    pub fn belongs_to(&self, character: &str) -> bool {
        self.character.to_lowercase() == character.to_lowercase()
    }
}

/// Ordered sticker list with deterministic ids
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    stickers: Vec<StickerDescriptor>,
}

impl Catalog {
    /// Parse the upstream JSON document
    pub fn from_json(text: &str) -> Result<Self> {
        let stickers: Vec<StickerDescriptor> = serde_json::from_str(text)?;
        Self::from_descriptors(stickers)
    }

    /// Build a catalog from descriptors in upstream order
    pub fn from_descriptors(mut stickers: Vec<StickerDescriptor>) -> Result<Self> {
        if stickers.is_empty() {
            return Err(StickerError::Catalog("catalog contains no stickers".to_string()));
        }

        // `sort_by_cached_key` is stable, ties keep upstream order
        stickers.sort_by_cached_key(|s| s.character.to_lowercase());
        for (index, sticker) in stickers.iter_mut().enumerate() {
            sticker.id = (index + 1).to_string();
        }

        Ok(Self { stickers })
    }

    pub fn len(&self) -> usize {
        self.stickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stickers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StickerDescriptor> {
        self.stickers.iter()
    }

    /// Sticker with exactly this id
    pub fn get(&self, id: &str) -> Option<&StickerDescriptor> {
        self.stickers.iter().find(|s| s.id == id)
    }

    /// Sticker by id, or a uniformly random one when no id (or a blank
    /// one) is given
    pub fn select(&self, id: Option<&str>) -> Option<&StickerDescriptor> {
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.get(id),
            None => self.stickers.choose(&mut rand::rng()),
        }
    }

    /// All stickers of one character, in catalog order
    pub fn by_character(&self, character: &str) -> Vec<&StickerDescriptor> {
        self.stickers.iter().filter(|s| s.belongs_to(character)).collect()
    }

    /// First sticker of each character paired with the capitalized
    /// character name, in catalog order
    pub fn first_per_character(&self) -> Vec<(String, &StickerDescriptor)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for sticker in &self.stickers {
            let label = capitalize(&sticker.character);
            if seen.insert(label.clone()) {
                out.push((label, sticker));
            }
        }
        out
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Catalog handle shared between the acquirer and the renderer.
///
/// Loads replace the whole catalog; readers work on a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SharedCatalog {
    inner: Arc<RwLock<Arc<Catalog>>>,
}

impl SharedCatalog {
    pub fn snapshot(&self) -> Arc<Catalog> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, catalog: Catalog) {
        let catalog = Arc::new(catalog);
        match self.inner.write() {
            Ok(mut guard) => *guard = catalog,
            Err(poisoned) => *poisoned.into_inner() = catalog,
        }
    }
}
