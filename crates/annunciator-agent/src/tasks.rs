//! Task registry for annunciator background work.
//!
//! Owns the process-wide shutdown handle; every long-running task is spawned
//! here so shutdown can wait for it, then abort stragglers.

use std::future::Future;
use std::time::Duration;

use annunciator_core::{ShutdownHandle, ShutdownSignal};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct TaskRegistry {
    shutdown: ShutdownHandle,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            shutdown: ShutdownHandle::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Spawn a task that observes the shutdown signal itself.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    /// Trigger shutdown without waiting.
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Trigger shutdown, give tasks `grace` to finish, abort the rest.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.trigger();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let count = handles.len();

        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(count, "background tasks did not stop in time, aborting");
            for abort in aborts {
                abort.abort();
            }
        } else {
            debug!(count, "background tasks stopped");
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown.trigger();
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}
