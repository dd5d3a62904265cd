//! # Record Model
//!
//! The stored entity and its identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Permission bits the search relay stamps on every record it forwards (`0755`).
pub const SEARCH_PERMISSIONS: u32 = 0o755;

/// Permission bits a store assigns on creation unless configured otherwise.
pub const DEFAULT_PERMISSIONS: u32 = 0;

/// # Record Identifier
///
/// Opaque, globally unique identifier assigned by the store at creation time.
/// Never reused and never mutated once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Produces a fresh random (v4) identifier. Never returns the nil id.
    pub fn generate() -> Self {
        loop {
            let id = Uuid::new_v4();
            if !id.is_nil() {
                return Self(id);
            }
        }
    }

    /// The all-zero identifier. The transport rejects it as input.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the all-zero identifier.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// # Record
///
/// A stored entity. `permissions` is controlled by the store on creation and is
/// overwritten with [`SEARCH_PERMISSIONS`] on everything that leaves a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Identifier assigned by the store.
    pub id: RecordId,
    /// Searchable name. Search matches case-sensitive substrings of this field.
    pub name: String,
    /// Free-form payload.
    pub data: String,
    /// Permission bits.
    pub permissions: u32,
}

/// Creation payload: everything in a [`Record`] the caller gets to choose.
/// Missing fields deserialize as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewRecord {
    /// Searchable name.
    pub name: String,
    /// Free-form payload.
    pub data: String,
}

impl NewRecord {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Completes the payload into a stored record.
    pub fn into_record(self, id: RecordId, permissions: u32) -> Record {
        Record {
            id,
            name: self.name,
            data: self.data,
            permissions,
        }
    }
}
