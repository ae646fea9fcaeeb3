//! Completion and hole notifications.
//!
//! The registry reports through a [`Notifier`]: up to two plain callbacks and
//! an optional event channel. Every sink is optional; an empty notifier
//! digests completed messages and discards them silently.

use std::sync::Arc;

use mosaic_core::Hole;
use tokio::sync::mpsc;

/// A fully reassembled transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub transaction_id: u32,
    pub total_bytes: u64,
    /// Hex-encoded SHA-256 of the payload in offset order.
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Completed(Completion),
    /// One gap in a transaction abandoned at its cleanup deadline.
    Hole(Hole),
}

pub type HoleCallback = Arc<dyn Fn(u32, u64) + Send + Sync>;
pub type CompleteCallback = Arc<dyn Fn(u32, &str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Notifier {
    on_hole: Option<HoleCallback>,
    on_complete: Option<CompleteCallback>,
    events: Option<mpsc::UnboundedSender<RegistryEvent>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per hole, with `(transaction_id, hole_start_offset)`.
    pub fn on_hole<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, u64) + Send + Sync + 'static,
    {
        self.on_hole = Some(Arc::new(f));
        self
    }

    /// Called once per completed transaction, with `(transaction_id, digest_hex)`.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &str) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Push every notification into `tx` as well.
    pub fn events(mut self, tx: mpsc::UnboundedSender<RegistryEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub(crate) fn hole(&self, hole: Hole) {
        if let Some(cb) = &self.on_hole {
            cb(hole.transaction_id, hole.offset);
        }
        self.emit(RegistryEvent::Hole(hole));
    }

    pub(crate) fn complete(&self, completion: Completion) {
        if let Some(cb) = &self.on_complete {
            cb(completion.transaction_id, &completion.digest);
        }
        self.emit(RegistryEvent::Completed(completion));
    }

    fn emit(&self, event: RegistryEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                tracing::trace!("registry event receiver dropped");
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("on_hole", &self.on_hole.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

/// Default hole callback: log the gap.
pub fn report_hole(transaction_id: u32, offset: u64) {
    tracing::warn!(transaction_id, offset, "hole in abandoned message");
}
