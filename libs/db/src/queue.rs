//! Main queue: the serial completion-delivery executor.
//!
//! Save completions are always marshaled onto this queue, which stands in
//! for the application's main thread. It is a dedicated OS thread draining
//! a FIFO job channel, so completion ordering and delivery are observable
//! in tests without a live UI loop.

use std::thread::{self, ThreadId};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle for scheduling jobs on the main queue.
#[derive(Clone)]
pub struct MainQueue {
    sender: flume::Sender<Job>,
    thread_id: ThreadId,
}

impl MainQueue {
    /// Spawn the queue's thread and return the handle. The thread exits
    /// once every handle clone has been dropped.
    pub(crate) fn spawn() -> Self {
        let (sender, receiver) = flume::unbounded::<Job>();
        let handle = thread::Builder::new()
            .name("trellis-main".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                tracing::debug!("main queue stopped");
            })
            .expect("failed to spawn main queue thread");
        let thread_id = handle.thread().id();
        MainQueue { sender, thread_id }
    }

    /// True when the calling thread is the queue's own thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Enqueue a job without waiting for it to run.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.sender.send(Box::new(job));
    }

    /// Run a job on the queue and wait for it to finish. Runs inline when
    /// the caller is already on the queue's thread, which keeps the
    /// degenerate already-on-main case from deadlocking.
    pub fn run_sync(&self, job: impl FnOnce() + Send + 'static) {
        if self.is_current() {
            job();
            return;
        }
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let sent = self
            .sender
            .send(Box::new(move || {
                job();
                let _ = done_tx.send(());
            }))
            .is_ok();
        if sent {
            let _ = done_rx.recv();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_jobs_run_in_order() {
        let queue = MainQueue::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            queue.dispatch(move || seen.lock().unwrap().push(i));
        }
        // run_sync acts as a barrier behind the dispatched jobs
        queue.run_sync(|| {});

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_is_current_only_on_queue_thread() {
        let queue = MainQueue::spawn();
        assert!(!queue.is_current());

        let inner = queue.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        queue.dispatch(move || {
            let _ = tx.send(inner.is_current());
        });
        assert!(rx.recv().unwrap());
    }

    #[test]
    fn test_run_sync_is_reentrant_from_queue_thread() {
        let queue = MainQueue::spawn();
        let inner = queue.clone();
        let (tx, rx) = std::sync::mpsc::channel();

        queue.run_sync(move || {
            // would deadlock here if run_sync re-enqueued instead of
            // running inline
            inner.run_sync(move || {
                let _ = tx.send(());
            });
        });
        assert!(rx.recv().is_ok());
    }
}
