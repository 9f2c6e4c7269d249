//! Core data model.
//!
//! A memory record is one travel entry: identity, descriptive fields, a
//! location, and an ordered photo gallery. Identity and the gallery are the
//! only parts the engine interprets.

pub mod document;
pub mod gallery;
pub mod memory;
pub mod profile;

pub use document::{DocumentFields, MemoryDocument, RemoteDocument};
pub use gallery::{ImageCollection, ImageRef};
pub use memory::{MemoryRecord, by_category, favorites_first, featured};
pub use profile::Profile;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable record identity. Assigned once at creation, never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub i64);

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MemoryId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(MemoryId)
    }
}

/// Where the authoritative copy of a record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    /// No remote counterpart yet.
    #[default]
    LocalOnly,
    /// Copy of a server document.
    Remote,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Origin::LocalOnly => "local",
            Origin::Remote => "remote",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Descriptive fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Record category. Unknown names from newer data are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    BeachIsland,
    Travel,
    Hiking,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::BeachIsland => "Beach & Island",
            Category::Travel => "Travel",
            Category::Hiking => "Hiking",
            Category::Other(name) => name,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Travel
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Beach & Island" => Category::BeachIsland,
            "Travel" => Category::Travel,
            "Hiking" => Category::Hiking,
            _ => Category::Other(s),
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Caller-supplied draft for a new record. The engine assigns the id.
#[derive(Debug, Clone)]
pub struct MemoryDraft {
    pub(crate) name: String,
    pub(crate) country: String,
    pub(crate) state: String,
    pub(crate) description: String,
    pub(crate) category: Category,
    pub(crate) visited_date: Option<String>,
    pub(crate) is_favorite: bool,
    pub(crate) is_featured: bool,
    pub(crate) coordinates: Coordinates,
}

impl MemoryDraft {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            country: String::new(),
            state: String::new(),
            description: String::new(),
            category,
            visited_date: None,
            is_favorite: false,
            is_featured: false,
            coordinates: Coordinates::default(),
        }
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn visited(mut self, date: impl Into<String>) -> Self {
        self.visited_date = Some(date.into());
        self
    }

    pub fn favorite(mut self, yes: bool) -> Self {
        self.is_favorite = yes;
        self
    }

    pub fn featured(mut self, yes: bool) -> Self {
        self.is_featured = yes;
        self
    }

    pub fn coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.coordinates = Coordinates {
            latitude,
            longitude,
        };
        self
    }

    /// Materialize as a LocalOnly record with an empty gallery.
    pub(crate) fn into_record(self, id: MemoryId) -> MemoryRecord {
        MemoryRecord {
            id,
            name: self.name,
            country: self.country,
            state: self.state,
            description: self.description,
            category: self.category,
            visited_date: self.visited_date,
            is_favorite: self.is_favorite,
            is_featured: self.is_featured,
            coordinates: self.coordinates,
            gallery: ImageCollection::default(),
            remote_id: None,
            origin: Origin::LocalOnly,
            profile_backup: None,
        }
    }
}
