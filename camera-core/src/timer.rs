//! Timer service backed by tokio tasks

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::collaborators::{TimerCallback, TimerHandle, TimerService};
use crate::error::{CoreError, Result};

type SharedCallback = Arc<Mutex<Option<TimerCallback>>>;

struct TimerEntry {
    task: JoinHandle<()>,
    callback: SharedCallback,
}

/// [`TimerService`] that runs each timer as a sleeping tokio task
///
/// A fired timer removes itself from the table before running its callback,
/// so `delete` and `reload` on a fired handle are harmless.
pub struct TokioTimerService {
    runtime: Handle,
    next_id: AtomicU64,
    timers: Arc<DashMap<u64, TimerEntry>>,
}

impl TokioTimerService {
    /// Create a timer service on the current tokio runtime
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| CoreError::ResourceLimit(format!("no tokio runtime: {e}")))?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            timers: Arc::new(DashMap::new()),
        }
    }

    /// Number of timers that have neither fired nor been deleted
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    fn spawn(&self, id: u64, delay: Duration, callback: SharedCallback) -> JoinHandle<()> {
        let timers = Arc::clone(&self.timers);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            if timers.remove(&id).is_none() {
                return;
            }
            let callback = callback.lock().take();
            if let Some(callback) = callback {
                trace!(timer = id, "Timer fired");
                callback();
            }
        })
    }
}

impl TimerService for TokioTimerService {
    fn start(&self, delay: Duration, callback: TimerCallback) -> Result<TimerHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: SharedCallback = Arc::new(Mutex::new(Some(callback)));
        // The shard stays locked until the entry exists, so even a zero delay
        // finds itself registered when it wakes
        self.timers.entry(id).or_insert_with(|| TimerEntry {
            task: self.spawn(id, delay, Arc::clone(&callback)),
            callback,
        });
        Ok(TimerHandle(id))
    }

    fn delete(&self, handle: TimerHandle) {
        if let Some((_, entry)) = self.timers.remove(&handle.0) {
            entry.task.abort();
        }
    }

    fn reload(&self, handle: TimerHandle, delay: Duration) -> bool {
        let Some(mut entry) = self.timers.get_mut(&handle.0) else {
            return false;
        };
        entry.task.abort();
        let callback = Arc::clone(&entry.callback);
        entry.task = self.spawn(handle.0, delay, callback);
        true
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.task.abort();
        }
    }
}
