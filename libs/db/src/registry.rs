//! Context registry: one context triple per storage name.
//!
//! The registry is an explicit, injectable object constructed once at
//! application start and passed by reference to every coordinator. Its
//! internal map is initialized at construction and guarded by a single
//! registry-wide lock, so a race to register the same name converges on
//! one winner and the losers reuse the winner's triple.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::context::{self, Context, Tier};
use crate::error::StoreError;
use crate::queue::MainQueue;
use crate::store::{StoreHandle, StoreKind};

/// Configuration for the registry's context loops.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Size of each context's MPSC command channel buffer
    pub channel_buffer_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
        }
    }
}

/// The three contexts for one storage name.
///
/// Invariants: `worker.parent() == main`, `main.parent() == root`,
/// `root.parent() == None`; exactly one triple exists per distinct name
/// for the registry's lifetime.
#[derive(Clone)]
pub struct ContextTriple {
    worker: Context,
    main: Context,
    root: Context,
}

impl ContextTriple {
    pub fn worker(&self) -> &Context {
        &self.worker
    }

    pub fn main(&self) -> &Context {
        &self.main
    }

    pub fn root(&self) -> &Context {
        &self.root
    }
}

/// Registry mapping storage names to context triples.
///
/// Must be constructed inside a tokio runtime; context loops are spawned
/// on the runtime captured at construction.
pub struct Registry {
    contexts: Mutex<HashMap<String, ContextTriple>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    main_queue: MainQueue,
    runtime: Handle,
    config: RegistryConfig,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            main_queue: MainQueue::spawn(),
            runtime: Handle::current(),
            config,
        }
    }

    /// Resolve the context triple for `name`, creating it on first
    /// registration.
    ///
    /// If the name is already registered the existing triple is returned
    /// unchanged and `kind`/`location` are ignored: first registration
    /// wins. Otherwise a store handle is created for
    /// `(kind, location/name)`, the root, main and worker loops are
    /// spawned parent-chained, and the triple is inserted. Store creation
    /// failure propagates and nothing is inserted.
    pub fn resolve(
        &self,
        name: &str,
        kind: StoreKind,
        location: &Path,
    ) -> Result<ContextTriple, StoreError> {
        if name.is_empty() {
            return Err(StoreError::Init {
                path: location.to_path_buf(),
                message: "storage name is empty".to_string(),
            });
        }

        let mut contexts = self
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(triple) = contexts.get(name) {
            return Ok(triple.clone());
        }

        let store = StoreHandle::create(kind, &location.join(name))?;
        let buffer = self.config.channel_buffer_size;
        let (root, root_task) = context::spawn_root(&self.runtime, store, buffer);
        let (main, main_task) = context::spawn_child(&self.runtime, Tier::Main, root.clone(), buffer);
        let (worker, worker_task) =
            context::spawn_child(&self.runtime, Tier::Worker, main.clone(), buffer);

        let triple = ContextTriple { worker, main, root };
        contexts.insert(name.to_string(), triple.clone());
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([root_task, main_task, worker_task]);

        tracing::info!(name, kind = ?kind, "registered storage contexts");
        Ok(triple)
    }

    /// The completion-delivery queue shared by every coordinator opened
    /// through this registry.
    pub fn main_queue(&self) -> &MainQueue {
        &self.main_queue
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Stop every context loop, leaf first so parents outlive in-flight
    /// pushes, and wait for the loop tasks to finish. Queued commands are
    /// drained before each loop stops.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let triples: Vec<ContextTriple> = {
            let mut contexts = self
                .contexts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            contexts.drain().map(|(_, triple)| triple).collect()
        };
        for triple in &triples {
            triple.worker.shutdown().await;
            triple.main.shutdown().await;
            triple.root.shutdown().await;
        }

        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain(..).collect()
        };
        for task in tasks {
            task.await
                .map_err(|e| anyhow::anyhow!("context loop panicked: {e}"))?;
        }
        tracing::info!("registry shutdown complete");
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let registry = Registry::new();
        let location = std::env::temp_dir();

        let first = registry
            .resolve("people", StoreKind::Memory, &location)
            .unwrap();
        let second = registry
            .resolve("people", StoreKind::Memory, &location)
            .unwrap();

        assert!(first.worker().same(second.worker()));
        assert!(first.main().same(second.main()));
        assert!(first.root().same(second.root()));
    }

    #[tokio::test]
    async fn test_distinct_names_get_distinct_triples() {
        let registry = Registry::new();
        let location = std::env::temp_dir();

        let a = registry.resolve("a", StoreKind::Memory, &location).unwrap();
        let b = registry.resolve("b", StoreKind::Memory, &location).unwrap();

        assert!(!a.worker().same(b.worker()));
        assert!(!a.main().same(b.main()));
        assert!(!a.root().same(b.root()));
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let registry = Registry::new();
        let result = registry.resolve("", StoreKind::Memory, &std::env::temp_dir());
        assert!(matches!(result, Err(StoreError::Init { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_closes_contexts() {
        let registry = Registry::new();
        let triple = registry
            .resolve("doomed", StoreKind::Memory, &std::env::temp_dir())
            .unwrap();

        registry.shutdown().await.unwrap();
        assert!(triple.worker().is_closed());
        assert!(triple.main().is_closed());
        assert!(triple.root().is_closed());
    }
}
