//! Persistence coordination layer for trellis.
//!
//! This crate provides named, cached storage contexts arranged in a
//! three-tier hierarchy (background worker, main, background root) over a
//! physical store, plus the cascading save protocol that propagates
//! committed changes bottom-up through the hierarchy to durable storage.
//!
//! # Architecture
//!
//! - [`Registry`] owns one [`ContextTriple`] per storage name. Resolution
//!   is idempotent: the first registration for a name creates the store
//!   handle and the three context loops, every later registration for the
//!   same name returns the same triple.
//! - Each [`Context`] is a serial command loop. All mutation and commit
//!   work for a context runs inside its own loop, fed by an MPSC channel.
//! - [`Graph`] is the user-facing coordinator bound to one name. Records
//!   are staged against its worker context; `save` drives an explicit
//!   bottom-up commit cascade (worker, then main, then root) and reports
//!   through a completion callback delivered on the main queue.
//!
//! # Quick Start
//!
//! ```ignore
//! use trellis_db::{Graph, Record, Registry, StoreKind};
//!
//! let registry = Registry::new();
//! let graph = Graph::open_with(&registry, "people", StoreKind::Disk, db_path)?;
//!
//! graph.insert(Record::entity("Person").with_property("name", "Alice")).await?;
//!
//! graph.save(|success, error| {
//!     assert!(success, "{error:?}");
//! });
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod context;
mod error;
mod graph;
mod queue;
mod record;
mod registry;
mod save;
mod store;

pub use context::{Context, Tier};
pub use error::{CommitError, StoreError};
pub use graph::Graph;
pub use queue::MainQueue;
pub use record::{Change, Properties, Record, RecordKind};
pub use registry::{ContextTriple, Registry, RegistryConfig};
pub use save::SaveCompletion;
pub use store::{default_location, StoreHandle, StoreKind, DEFAULT_NAME};

/// A typesafe wrapper for UUID version 4, used as record identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(Uuid);

impl Id {
    /// Generate a new random UUID v4
    pub fn new() -> Self {
        Id(Uuid::new_v4())
    }

    /// Create from an existing Uuid
    pub fn from_uuid(uuid: Uuid) -> Self {
        Id(uuid)
    }

    /// Parse from a string, returning an error if invalid
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Id(Uuid::parse_str(s)?))
    }

    /// Raw 16-byte form, used as the store key
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Get the underlying Uuid
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Check if this is a nil UUID (all zeros)
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampMilli(pub u64);

impl TimestampMilli {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        TimestampMilli(millis)
    }
}

impl std::fmt::Display for TimestampMilli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_new() {
        let a = Id::new();
        let b = Id::new();

        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn test_id_parse_valid() {
        let s = "550e8400-e29b-41d4-a716-446655440000";
        let id = Id::parse(s).unwrap();

        assert_eq!(format!("{}", id), s);
    }

    #[test]
    fn test_id_parse_invalid() {
        assert!(Id::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_id_nil() {
        assert!(Id::from_uuid(Uuid::nil()).is_nil());
        assert!(!Id::new().is_nil());
    }

    #[test]
    fn test_timestamp_now_is_nonzero() {
        assert!(TimestampMilli::now().0 > 0);
    }
}
