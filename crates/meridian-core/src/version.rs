//! Schema-version marker for persisted records.

use serde::{Deserialize, Serialize};

/// Implemented by every record type that is written to the Storage Port, so
/// the on-disk schema can evolve without breaking the durability contract.
pub trait Versioned {
    /// The current schema version for this record type.
    const SCHEMA_VERSION: u32;
}

/// A wrapper pairing a record with the schema version it was written under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedRecord<T> {
    /// Schema version this record was written under.
    pub schema_version: u32,
    /// The record itself.
    pub record: T,
}

impl<T: Versioned> VersionedRecord<T> {
    /// Wrap a record with its current schema version.
    pub fn new(record: T) -> Self {
        Self {
            schema_version: T::SCHEMA_VERSION,
            record,
        }
    }
}
