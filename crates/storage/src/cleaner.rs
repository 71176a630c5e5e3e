//! Background expiry sweeper
//!
//! [`MemoryStore`] evicts an expired key only when something reads it.
//! Shards that aged out of every rebuild window and stale union caches are
//! never read again, so without a sweep they would hold memory until the
//! process exits. The cleaner runs [`MemoryStore::purge_expired`] on a
//! worker thread every interval.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::MemoryStore;

/// Handle to a running sweeper thread
///
/// Dropping the handle stops the thread and waits for it.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(MemoryStore::new());
/// let cleaner = ExpiryCleaner::spawn(Arc::clone(&store), Duration::from_secs(60));
/// // ...
/// cleaner.stop();
/// ```
#[derive(Debug)]
pub struct ExpiryCleaner {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    purged: Arc<AtomicUsize>,
}

impl ExpiryCleaner {
    /// Start sweeping `store` every `every`
    pub fn spawn(store: Arc<MemoryStore>, every: Duration) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let purged = Arc::new(AtomicUsize::new(0));
        let total = Arc::clone(&purged);

        let worker = thread::spawn(move || loop {
            // the sender is only ever dropped, never sent on
            match stopped.recv_timeout(every) {
                Err(RecvTimeoutError::Timeout) => {
                    let n = store.purge_expired();
                    total.fetch_add(n, Ordering::Relaxed);
                    if n > 0 {
                        debug!(target: "kvmodel::store", purged = n, "Expiry sweep");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            stop: Some(stop),
            worker: Some(worker),
            purged,
        }
    }

    /// Keys removed by this cleaner so far
    pub fn purged(&self) -> usize {
        self.purged.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        drop(self.stop.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(target: "kvmodel::store", "Expiry sweeper panicked");
            }
        }
    }
}

impl Drop for ExpiryCleaner {
    fn drop(&mut self) {
        self.halt();
    }
}
