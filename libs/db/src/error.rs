//! Error types for the context hierarchy and the physical store.

use std::path::PathBuf;

use thiserror::Error;

use crate::context::Tier;

/// Failures raised by the physical store and the context loops.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The physical store handle could not be created. Surfaced
    /// synchronously from registry resolution; fatal to opening that
    /// named storage.
    #[error("store initialization failed at {path}: {message}")]
    Init { path: PathBuf, message: String },

    #[error("store error: {0}")]
    Db(#[from] rocksdb::Error),

    #[error("record encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("record decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("missing column family: {0}")]
    MissingColumnFamily(&'static str),

    /// The context's command loop has shut down.
    #[error("context queue closed")]
    ContextClosed,
}

/// A tier's commit attempt failed. Delivered through the save completion;
/// higher tiers are never attempted once a lower tier fails.
#[derive(Debug, Error)]
#[error("commit failed at {tier} tier: {source}")]
pub struct CommitError {
    pub tier: Tier,
    #[source]
    pub source: StoreError,
}
