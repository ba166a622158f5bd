//! Cascading save: an explicit, forward-only state machine per save call.
//!
//! Commits run strictly bottom-up. A tier's commit is attempted only
//! after the tier below succeeded and the tier itself has pending
//! changes. The first failure is terminal for the call: higher tiers are
//! never attempted and the completion reports the failing tier.
//!
//! When a tier's commit succeeds but the tier above has no pending
//! changes the cascade stops without invoking the completion at all.
//! A successful commit that produces nothing upstream is treated as
//! "nothing to report"; callers relying on the callback must account for
//! this, and the behavior is pinned by `commit_with_clean_main_skips_completion`
//! below.

use crate::context::{Context, Tier};
use crate::error::CommitError;
use crate::queue::MainQueue;

/// Completion callback shape for save and clear: `(success, error)`,
/// invoked at most once, on the main queue.
pub type SaveCompletion = Box<dyn FnOnce(bool, Option<CommitError>) + Send + 'static>;

enum SaveState {
    CommittingWorker,
    CommittingMain,
    CommittingRoot,
    Done,
    Failed(CommitError),
}

/// Drive one save cascade over the context chain and deliver the
/// completion on the main queue.
#[tracing::instrument(skip_all, name = "save_cascade")]
pub(crate) async fn drive(
    worker: &Context,
    main: &Context,
    root: &Context,
    queue: &MainQueue,
    completion: SaveCompletion,
) {
    let mut state = SaveState::CommittingWorker;
    let outcome = loop {
        state = match state {
            SaveState::CommittingWorker => match worker.commit().await {
                Err(source) => SaveState::Failed(CommitError {
                    tier: Tier::Worker,
                    source,
                }),
                Ok(()) => {
                    if !main.has_changes() {
                        break None;
                    }
                    SaveState::CommittingMain
                }
            },
            SaveState::CommittingMain => match main.commit().await {
                Err(source) => SaveState::Failed(CommitError {
                    tier: Tier::Main,
                    source,
                }),
                Ok(()) => {
                    if !root.has_changes() {
                        break None;
                    }
                    SaveState::CommittingRoot
                }
            },
            SaveState::CommittingRoot => match root.commit().await {
                Err(source) => SaveState::Failed(CommitError {
                    tier: Tier::Root,
                    source,
                }),
                Ok(()) => SaveState::Done,
            },
            SaveState::Done => break Some((true, None)),
            SaveState::Failed(error) => {
                tracing::warn!(tier = %error.tier, error = %error.source, "save cascade failed");
                break Some((false, Some(error)));
            }
        };
    };

    match outcome {
        None => tracing::debug!("upper tier clean, completion skipped"),
        Some((success, error)) => {
            queue.dispatch(move || completion(success, error));
        }
    }
}
