//! Delayed-send timers.
//!
//! One timer task per pending send id. Re-scheduling an id replaces its
//! timer, canceling aborts it, and stopping the interpreter flushes the
//! whole map, so canceling by send id is always safe.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
pub(crate) struct Scheduler {
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    /// Schedules `fire` after `delay_ms`, keyed by send id.
    pub(crate) fn schedule(
        &self,
        send_id: String,
        delay_ms: u64,
        fire: impl FnOnce() + Send + 'static,
    ) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            fire();
        });

        if let Some(previous) = self.timers.lock().insert(send_id, handle) {
            previous.abort();
        }
    }

    /// Cancels the timer for a send id, if any.
    pub(crate) fn cancel(&self, send_id: &str) {
        if let Some(handle) = self.timers.lock().remove(send_id) {
            handle.abort();
        }
    }

    /// Aborts every pending timer.
    pub(crate) fn clear(&self) {
        for (_, handle) in self.timers.lock().drain() {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.clear();
    }
}
