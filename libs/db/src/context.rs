//! Storage contexts: serial change-tracking loops arranged in a
//! parent chain.
//!
//! Each context is a dedicated task consuming [`ContextCommand`]s from an
//! MPSC channel. All mutation and commit work for a context runs inside
//! its own loop; callers interact through the cloneable [`Context`] handle.
//! This is the single-writer-per-context discipline: the channel, not a
//! lock, serializes access to the staged change set.
//!
//! Commit pushes the staged set upward: into the parent context (awaiting
//! the parent's acknowledgement, so absorption happens before the commit
//! reports success) or, at the root, into the physical store. A failed
//! commit leaves the staged set intact so the caller may retry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::record::{Change, Record, RecordKey, RecordKind};
use crate::store::StoreHandle;

/// Position of a context in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Leaf context operated by a coordinator, on its own background loop.
    Worker,
    /// Parent of worker, standing in for the UI tier.
    Main,
    /// Parent of main, bound to the physical store.
    Root,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Worker => "worker",
            Tier::Main => "main",
            Tier::Root => "root",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) enum ContextCommand {
    Stage {
        changes: Vec<Change>,
        reply: oneshot::Sender<()>,
    },
    Commit {
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Records {
        kind: Option<RecordKind>,
        reply: oneshot::Sender<Result<Vec<Record>, StoreError>>,
    },
    Shutdown,
}

struct ContextShared {
    tier: Tier,
    dirty: AtomicBool,
    parent: Option<Context>,
}

/// Handle to one storage context's command loop.
#[derive(Clone)]
pub struct Context {
    sender: mpsc::Sender<ContextCommand>,
    shared: Arc<ContextShared>,
}

impl Context {
    pub fn tier(&self) -> Tier {
        self.shared.tier
    }

    /// The parent context, if any. Worker's parent is main, main's parent
    /// is root, root has none.
    pub fn parent(&self) -> Option<&Context> {
        self.shared.parent.as_ref()
    }

    /// True when the context holds uncommitted changes.
    pub fn has_changes(&self) -> bool {
        self.shared.dirty.load(Ordering::Acquire)
    }

    /// Check if the context loop is still running.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Handle identity: true when both handles refer to the same context.
    pub fn same(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Stage changes into the context, waiting for absorption.
    pub async fn stage(&self, changes: Vec<Change>) -> Result<(), StoreError> {
        let (reply, ack) = oneshot::channel();
        self.sender
            .send(ContextCommand::Stage { changes, reply })
            .await
            .map_err(|_| StoreError::ContextClosed)?;
        ack.await.map_err(|_| StoreError::ContextClosed)
    }

    /// Commit staged changes upward, to the parent context or the store.
    pub async fn commit(&self) -> Result<(), StoreError> {
        let (reply, result) = oneshot::channel();
        self.sender
            .send(ContextCommand::Commit { reply })
            .await
            .map_err(|_| StoreError::ContextClosed)?;
        result.await.map_err(|_| StoreError::ContextClosed)?
    }

    /// Read the effective record set: the parent chain's view overlaid
    /// with this context's staged changes. Observes uncommitted,
    /// in-memory changes.
    pub async fn records(&self, kind: Option<RecordKind>) -> Result<Vec<Record>, StoreError> {
        let (reply, result) = oneshot::channel();
        self.sender
            .send(ContextCommand::Records { kind, reply })
            .await
            .map_err(|_| StoreError::ContextClosed)?;
        result.await.map_err(|_| StoreError::ContextClosed)?
    }

    /// Ask the loop to stop after draining queued commands.
    pub(crate) async fn shutdown(&self) {
        let _ = self.sender.send(ContextCommand::Shutdown).await;
    }
}

/// Where a context's commits land.
enum Upstream {
    Parent(Context),
    Store(StoreHandle),
}

/// The command loop owning one context's staged change set.
struct Consumer {
    receiver: mpsc::Receiver<ContextCommand>,
    staged: BTreeMap<RecordKey, Change>,
    upstream: Upstream,
    shared: Arc<ContextShared>,
}

impl Consumer {
    #[tracing::instrument(skip(self), name = "context", fields(tier = %self.shared.tier))]
    async fn run(mut self) {
        tracing::debug!("context loop started");
        while let Some(command) = self.receiver.recv().await {
            match command {
                ContextCommand::Stage { changes, reply } => {
                    self.stage(changes);
                    let _ = reply.send(());
                }
                ContextCommand::Commit { reply } => {
                    let _ = reply.send(self.commit().await);
                }
                ContextCommand::Records { kind, reply } => {
                    let _ = reply.send(self.records(kind).await);
                }
                ContextCommand::Shutdown => break,
            }
        }
        tracing::debug!("context loop stopped");
    }

    fn stage(&mut self, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        tracing::debug!(count = changes.len(), "staging changes");
        for change in changes {
            self.staged.insert(change.key(), change);
        }
        self.shared.dirty.store(true, Ordering::Release);
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let changes: Vec<Change> = self.staged.values().cloned().collect();
        tracing::debug!(count = changes.len(), "committing");
        match &self.upstream {
            Upstream::Parent(parent) => parent.stage(changes).await?,
            Upstream::Store(store) => store.commit(&changes)?,
        }
        // staged set survives a failed commit above; cleared only on success
        self.staged.clear();
        self.shared.dirty.store(false, Ordering::Release);
        Ok(())
    }

    async fn records(&self, kind: Option<RecordKind>) -> Result<Vec<Record>, StoreError> {
        let base = match &self.upstream {
            Upstream::Parent(parent) => parent.records(None).await?,
            Upstream::Store(store) => store.scan(None)?,
        };
        let mut view: BTreeMap<RecordKey, Record> =
            base.into_iter().map(|r| (r.key(), r)).collect();
        for change in self.staged.values() {
            match change {
                Change::Put(record) => {
                    view.insert(record.key(), record.clone());
                }
                Change::Delete { kind, id } => {
                    view.remove(&(*kind, *id));
                }
            }
        }
        Ok(view
            .into_values()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .collect())
    }
}

/// Spawn the root context loop, which owns the physical store.
pub(crate) fn spawn_root(
    runtime: &Handle,
    store: StoreHandle,
    buffer: usize,
) -> (Context, JoinHandle<()>) {
    spawn_with(runtime, Tier::Root, None, Upstream::Store(store), buffer)
}

/// Spawn a child context loop parented to `parent`.
pub(crate) fn spawn_child(
    runtime: &Handle,
    tier: Tier,
    parent: Context,
    buffer: usize,
) -> (Context, JoinHandle<()>) {
    spawn_with(
        runtime,
        tier,
        Some(parent.clone()),
        Upstream::Parent(parent),
        buffer,
    )
}

fn spawn_with(
    runtime: &Handle,
    tier: Tier,
    parent: Option<Context>,
    upstream: Upstream,
    buffer: usize,
) -> (Context, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(buffer);
    let shared = Arc::new(ContextShared {
        tier,
        dirty: AtomicBool::new(false),
        parent,
    });
    let consumer = Consumer {
        receiver,
        staged: BTreeMap::new(),
        upstream,
        shared: shared.clone(),
    };
    let task = runtime.spawn(consumer.run());
    (Context { sender, shared }, task)
}
