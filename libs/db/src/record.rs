//! Record model: the unit of data the contexts stage and the store persists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Id, TimestampMilli};

/// The three record kinds carried by a storage context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Entity,
    Relationship,
    Action,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Entity,
        RecordKind::Relationship,
        RecordKind::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Entity => "entity",
            RecordKind::Relationship => "relationship",
            RecordKind::Action => "action",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form property map attached to a record.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Identity of a record within one storage: kind plus id.
pub(crate) type RecordKey = (RecordKind, Id);

/// A managed record: id, kind, user-assigned type name, creation time and
/// a property map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: Id,
    pub kind: RecordKind,
    pub type_name: String,
    pub created_at: TimestampMilli,
    pub properties: Properties,
}

impl Record {
    pub fn new(kind: RecordKind, type_name: impl Into<String>) -> Self {
        Self {
            id: Id::new(),
            kind,
            type_name: type_name.into(),
            created_at: TimestampMilli::now(),
            properties: Properties::new(),
        }
    }

    pub fn entity(type_name: impl Into<String>) -> Self {
        Self::new(RecordKind::Entity, type_name)
    }

    pub fn relationship(type_name: impl Into<String>) -> Self {
        Self::new(RecordKind::Relationship, type_name)
    }

    pub fn action(type_name: impl Into<String>) -> Self {
        Self::new(RecordKind::Action, type_name)
    }

    /// Set a property, builder style.
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub(crate) fn key(&self) -> RecordKey {
        (self.kind, self.id)
    }
}

/// A staged, uncommitted change. A later change to the same record key
/// supersedes an earlier one within a context's staged set.
#[derive(Debug, Clone)]
pub enum Change {
    Put(Record),
    Delete { kind: RecordKind, id: Id },
}

impl Change {
    pub(crate) fn key(&self) -> RecordKey {
        match self {
            Change::Put(record) => record.key(),
            Change::Delete { kind, id } => (*kind, *id),
        }
    }
}
