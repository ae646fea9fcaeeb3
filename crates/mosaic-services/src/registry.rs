//! Message registry — the concurrent core of reassembly.
//!
//! Tracks every in-flight transaction and the cleanup timer armed for it.
//! Both maps live behind one mutex; there is no per-transaction lock.
//!
//! Per transaction id: `Absent → Active → {Complete, Abandoned}`. Both end
//! states remove the entry.
//!
//! - The first fragment for an id creates its [`Message`] and arms a one-shot
//!   cleanup task. The deadline is fixed at that moment; later fragments do
//!   not push it back.
//! - When a fragment completes the message, the entry is removed from both
//!   maps and the timer cancelled under the lock. Digesting and notifying
//!   happen after the lock is released: nothing else can reach the message
//!   once it is out of the maps.
//! - When the timer fires it takes the lock and re-checks. An id that already
//!   completed is a no-op; an id still incomplete is removed and each of its
//!   holes reported.
//!
//! Duplicate and misrouted fragments are absorbed here. Callers only ever
//! observe completions and holes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use mosaic_core::{AddFragmentError, Fragment, Hole, Message};

use crate::notify::{Completion, Notifier};
use crate::stats::{RegistryStats, StatsSnapshot};

/// Shared handle to the registry. Cloning is cheap; all clones see the same
/// transactions.
#[derive(Clone)]
pub struct MessageRegistry {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<RegistryState>,
    cleanup_delay: Duration,
    notifier: Notifier,
    stats: RegistryStats,
    runtime: Handle,
}

#[derive(Default)]
struct RegistryState {
    messages: HashMap<u32, Tracked>,
    pending_cleanups: HashMap<u32, CleanupHandle>,
    next_epoch: u64,
}

struct Tracked {
    message: Message,
    /// Distinguishes successive transactions that reuse the same id. A timer
    /// only acts on the incarnation it was armed for.
    epoch: u64,
    started_at: Instant,
}

struct CleanupHandle {
    task: JoinHandle<()>,
}

impl CleanupHandle {
    fn cancel(self) {
        self.task.abort();
    }
}

/// Snapshot of one in-flight transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub transaction_id: u32,
    pub fragments: usize,
    pub received_bytes: u64,
    /// `None` until the end fragment arrives.
    pub expected_total_bytes: Option<u64>,
    pub holes: Vec<Hole>,
    /// Time since the first fragment arrived.
    pub age: Duration,
}

impl MessageRegistry {
    /// Create a registry whose cleanup timers run on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    pub fn new(cleanup_delay: Duration, notifier: Notifier) -> Self {
        Self::with_runtime(cleanup_delay, notifier, Handle::current())
    }

    /// Create a registry whose cleanup timers run on `runtime`.
    ///
    /// `add_fragment` can then be called from any thread, inside or outside
    /// the runtime.
    pub fn with_runtime(cleanup_delay: Duration, notifier: Notifier, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState::default()),
                cleanup_delay,
                notifier,
                stats: RegistryStats::default(),
                runtime,
            }),
        }
    }

    /// Accept one decoded fragment.
    ///
    /// Blocks only on the registry lock. If this fragment completes its
    /// message the completion is reported before returning.
    pub fn add_fragment(&self, fragment: Fragment) {
        let transaction_id = fragment.transaction_id();

        let completed = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;

            let (epoch, is_new) = match state.messages.entry(transaction_id) {
                Entry::Occupied(mut slot) => {
                    let tracked = slot.get_mut();
                    match tracked.message.add_fragment(fragment) {
                        Ok(()) => self.shared.stats.fragment(),
                        Err(e @ AddFragmentError::Duplicate { .. }) => {
                            self.shared.stats.duplicate();
                            tracing::debug!(transaction_id, error = %e, "duplicate fragment ignored");
                        }
                        Err(e @ AddFragmentError::WrongTransaction { .. }) => {
                            self.shared.stats.misrouted();
                            tracing::debug!(transaction_id, error = %e, "misrouted fragment ignored");
                        }
                    }
                    (tracked.epoch, false)
                }
                Entry::Vacant(slot) => {
                    let epoch = state.next_epoch;
                    state.next_epoch += 1;
                    slot.insert(Tracked {
                        message: Message::new(fragment),
                        epoch,
                        started_at: Instant::now(),
                    });
                    self.shared.stats.fragment();
                    tracing::trace!(transaction_id, "tracking new transaction");
                    (epoch, true)
                }
            };

            if !state.pending_cleanups.contains_key(&transaction_id) {
                if !is_new {
                    tracing::warn!(transaction_id, "tracked transaction had no cleanup timer, re-arming");
                    self.shared.stats.rearmed();
                }
                let handle = arm_cleanup(&self.shared, transaction_id, epoch);
                state.pending_cleanups.insert(transaction_id, handle);
            }

            let complete = state
                .messages
                .get(&transaction_id)
                .is_some_and(|t| t.message.is_complete());

            if complete {
                if let Some(handle) = state.pending_cleanups.remove(&transaction_id) {
                    handle.cancel();
                }
                state.messages.remove(&transaction_id).map(|t| t.message)
            } else {
                None
            }
        };

        if let Some(message) = completed {
            self.shared.finish(message);
        }
    }

    /// Whether `transaction_id` has an in-flight message.
    pub fn is_tracked(&self, transaction_id: u32) -> bool {
        self.shared.lock().messages.contains_key(&transaction_id)
    }

    /// Holes an in-flight transaction would report if abandoned now.
    pub fn list_holes(&self, transaction_id: u32) -> Option<Vec<Hole>> {
        self.shared
            .lock()
            .messages
            .get(&transaction_id)
            .map(|t| t.message.holes())
    }

    pub fn progress(&self, transaction_id: u32) -> Option<Progress> {
        let state = self.shared.lock();
        let tracked = state.messages.get(&transaction_id)?;
        Some(Progress {
            transaction_id,
            fragments: tracked.message.fragment_count(),
            received_bytes: tracked.message.received_bytes(),
            expected_total_bytes: tracked.message.expected_total_bytes(),
            holes: tracked.message.holes(),
            age: tracked.started_at.elapsed(),
        })
    }

    /// Ids of all in-flight transactions, ascending.
    pub fn transactions(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.shared.lock().messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.shared.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cleanup_delay(&self) -> Duration {
        self.shared.cleanup_delay
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Cancel and forget the cleanup timer for `transaction_id`, leaving its
    /// message tracked. Simulates the timer being lost out of band.
    #[cfg(test)]
    fn drop_cleanup_timer(&self, transaction_id: u32) -> bool {
        match self.shared.lock().pending_cleanups.remove(&transaction_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("cleanup_delay", &self.shared.cleanup_delay)
            .field("in_flight", &self.len())
            .field("notifier", &self.shared.notifier)
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every critical section leaves both maps consistent, so a panic
        // elsewhere while holding the lock does not invalidate the state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Digest and report a message already removed from the maps.
    fn finish(&self, message: Message) {
        let transaction_id = message.transaction_id();
        match message.digest() {
            Ok(digest) => {
                let total_bytes = message.received_bytes();
                tracing::info!(
                    transaction_id,
                    length = total_bytes,
                    sha256 = %digest,
                    "message reassembled"
                );
                self.stats.completed();
                self.notifier.complete(Completion {
                    transaction_id,
                    total_bytes,
                    digest,
                });
            }
            Err(e) => {
                tracing::error!(transaction_id, error = %e, "completed message could not be digested");
            }
        }
    }

    /// Cleanup timer body. Runs once, `cleanup_delay` after the first fragment.
    fn expire(&self, transaction_id: u32, epoch: u64) {
        let abandoned = {
            let mut state = self.lock();
            let live = state
                .messages
                .get(&transaction_id)
                .is_some_and(|t| t.epoch == epoch && !t.message.is_complete());
            if !live {
                tracing::trace!(transaction_id, "cleanup fired for finished transaction");
                return;
            }
            state.pending_cleanups.remove(&transaction_id);
            state.messages.remove(&transaction_id).map(|t| t.message)
        };

        let Some(message) = abandoned else { return };
        let holes = message.holes();
        tracing::warn!(
            transaction_id,
            received_bytes = message.received_bytes(),
            expected_total_bytes = ?message.expected_total_bytes(),
            holes = holes.len(),
            "abandoning incomplete message"
        );
        self.stats.abandoned(holes.len());
        for hole in holes {
            self.notifier.hole(hole);
        }
    }
}

fn arm_cleanup(shared: &Arc<Shared>, transaction_id: u32, epoch: u64) -> CleanupHandle {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let delay = shared.cleanup_delay;
    let task = shared.runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(shared) = weak.upgrade() {
            shared.expire(transaction_id, epoch);
        }
    });
    CleanupHandle { task }
}
