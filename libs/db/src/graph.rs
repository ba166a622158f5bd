//! Graph coordinator: the user-facing handle bound to one named storage.
//!
//! Opening a coordinator resolves (or creates) the storage's context
//! triple through the registry and binds the worker context as the
//! operating context. Any number of coordinators may share a name; they
//! all operate on the same underlying triple.
//!
//! # Example
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

use std::path::Path;

use tokio::runtime::Handle;

use crate::context::{Context, Tier};
use crate::error::{CommitError, StoreError};
use crate::queue::MainQueue;
use crate::record::{Change, Record, RecordKind};
use crate::registry::{ContextTriple, Registry};
use crate::save::{self, SaveCompletion};
use crate::store::{self, StoreKind};
use crate::Id;

/// Coordinator for one named storage.
pub struct Graph {
    name: String,
    triple: ContextTriple,
    queue: MainQueue,
    runtime: Handle,
}

impl Graph {
    /// Open a coordinator for the default storage name with the default
    /// disk store at the default location.
    pub fn open_default(registry: &Registry) -> Result<Self, StoreError> {
        Self::open(registry, store::DEFAULT_NAME)
    }

    /// Open a coordinator for `name` with the default disk store at the
    /// default location.
    pub fn open(registry: &Registry, name: &str) -> Result<Self, StoreError> {
        Self::open_with(registry, name, StoreKind::Disk, &store::default_location())
    }

    /// Open a coordinator for `name` with an explicit store kind and
    /// location. Never fails except by propagating registry failure.
    pub fn open_with(
        registry: &Registry,
        name: &str,
        kind: StoreKind,
        location: &Path,
    ) -> Result<Self, StoreError> {
        let triple = registry.resolve(name, kind, location)?;
        Ok(Self {
            name: name.to_string(),
            triple,
            queue: registry.main_queue().clone(),
            runtime: registry.runtime().clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker context this coordinator operates on.
    pub fn context(&self) -> &Context {
        self.triple.worker()
    }

    /// The full context triple backing this coordinator's storage name.
    pub fn contexts(&self) -> &ContextTriple {
        &self.triple
    }

    /// Stage a record insert (or update) against the worker context.
    pub async fn insert(&self, record: Record) -> Result<(), StoreError> {
        self.triple.worker().stage(vec![Change::Put(record)]).await
    }

    /// Stage a record deletion against the worker context.
    pub async fn delete(&self, kind: RecordKind, id: Id) -> Result<(), StoreError> {
        self.triple
            .worker()
            .stage(vec![Change::Delete { kind, id }])
            .await
    }

    /// Read the worker context's effective record set, optionally
    /// restricted to one kind. Observes uncommitted in-memory changes.
    pub async fn records(&self, kind: Option<RecordKind>) -> Result<Vec<Record>, StoreError> {
        self.triple.worker().records(kind).await
    }

    /// Perform a save.
    ///
    /// If the worker context has no uncommitted changes the completion is
    /// invoked with `(true, None)` on the main queue before this call
    /// returns (inline when the caller is already on the main queue's
    /// thread). Otherwise a commit cascade is scheduled and `save`
    /// returns immediately; the completion fires on the main queue after
    /// the outermost commit finishes or the first failure occurs. When an
    /// intermediate tier has nothing to commit the cascade stops without
    /// invoking the completion at all.
    pub fn save<F>(&self, completion: F)
    where
        F: FnOnce(bool, Option<CommitError>) + Send + 'static,
    {
        let worker = self.triple.worker().clone();
        if !worker.has_changes() {
            self.queue.run_sync(move || completion(true, None));
            return;
        }
        let main = self.triple.main().clone();
        let root = self.triple.root().clone();
        let queue = self.queue.clone();
        self.runtime.spawn(async move {
            save::drive(&worker, &main, &root, &queue, Box::new(completion)).await;
        });
    }

    /// Clear all persisted data.
    ///
    /// Gathers every record of every kind visible to the worker context,
    /// stages a deletion for each, then performs a save with the caller's
    /// completion. Deletion only becomes durable through the save
    /// cascade.
    pub fn clear<F>(&self, completion: F)
    where
        F: FnOnce(bool, Option<CommitError>) + Send + 'static,
    {
        let worker = self.triple.worker().clone();
        let main = self.triple.main().clone();
        let root = self.triple.root().clone();
        let queue = self.queue.clone();
        self.runtime.spawn(async move {
            let completion: SaveCompletion = Box::new(completion);
            let staged = async {
                for kind in RecordKind::ALL {
                    let records = worker.records(Some(kind)).await?;
                    let deletes: Vec<Change> = records
                        .into_iter()
                        .map(|r| Change::Delete {
                            kind: r.kind,
                            id: r.id,
                        })
                        .collect();
                    if !deletes.is_empty() {
                        worker.stage(deletes).await?;
                    }
                }
                Ok::<(), StoreError>(())
            }
            .await;

            match staged {
                Err(source) => {
                    let error = CommitError {
                        tier: Tier::Worker,
                        source,
                    };
                    queue.dispatch(move || completion(false, Some(error)));
                }
                Ok(()) if !worker.has_changes() => {
                    queue.dispatch(move || completion(true, None));
                }
                Ok(()) => save::drive(&worker, &main, &root, &queue, completion).await,
            }
        });
    }
}
