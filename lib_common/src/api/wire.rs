use serde::{Deserialize, Serialize};

use crate::records::{Record, RecordId};

/// A record as it appears on the wire: `{"id", "name", "data", "perms"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Record identifier (hyphenated UUID).
    pub id: RecordId,
    /// Record name.
    pub name: String,
    /// Record payload.
    pub data: String,
    /// Permission bits, as a plain integer.
    pub perms: u32,
}

impl From<Record> for WireRecord {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            name: record.name,
            data: record.data,
            perms: record.permissions,
        }
    }
}

/// Acknowledgement returned by `/delete`, whether or not the record existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    /// The id that was requested for deletion.
    pub id: RecordId,
    /// Always `true`.
    pub deleted: bool,
}
