//! Per-transaction reassembly state.
//!
//! A [`Message`] accumulates the fragments of one transaction in any arrival
//! order. It is complete once the end fragment has arrived and the received
//! byte count equals the end fragment's `offset + data_length`.
//!
//! Completeness assumes fragments do not overlap. Overlapping input is not
//! rejected; it only makes `is_complete` and `find_holes` unreliable for that
//! transaction.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::store::OrderedFragments;
use crate::wire::Fragment;

/// A gap between two offset-adjacent fragments.
///
/// `offset` is where the gap starts: the end of the fragment before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hole {
    pub transaction_id: u32,
    pub offset: u64,
}

pub struct Message {
    transaction_id: u32,
    store: OrderedFragments,
    /// Offsets already accepted. O(1) duplicate check next to the tree.
    received_offsets: HashSet<u32>,
    received_bytes: u64,
    /// Only meaningful once `end_received` is set.
    expected_total_bytes: u64,
    end_received: bool,
}

impl Message {
    /// Start a message from its first fragment.
    pub fn new(fragment: Fragment) -> Self {
        let mut message = Self {
            transaction_id: fragment.transaction_id(),
            store: OrderedFragments::new(),
            received_offsets: HashSet::new(),
            received_bytes: 0,
            expected_total_bytes: 0,
            end_received: false,
        };
        message.accept(fragment);
        message
    }

    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// Add a fragment. Rejected fragments leave the message untouched.
    ///
    /// A second end fragment replaces the expected total computed from the
    /// first one.
    pub fn add_fragment(&mut self, fragment: Fragment) -> Result<(), AddFragmentError> {
        if fragment.transaction_id() != self.transaction_id {
            return Err(AddFragmentError::WrongTransaction {
                expected: self.transaction_id,
                found: fragment.transaction_id(),
            });
        }
        if self.received_offsets.contains(&fragment.offset()) {
            return Err(AddFragmentError::Duplicate {
                offset: fragment.offset(),
            });
        }
        self.accept(fragment);
        Ok(())
    }

    fn accept(&mut self, fragment: Fragment) {
        if fragment.is_end() {
            self.expected_total_bytes = fragment.end();
            self.end_received = true;
        }
        self.received_bytes += u64::from(fragment.data_length());
        self.received_offsets.insert(fragment.offset());
        self.store.insert(fragment);
    }

    /// End fragment seen and every byte up to it accounted for.
    pub fn is_complete(&self) -> bool {
        self.end_received && self.received_bytes == self.expected_total_bytes
    }

    /// Call `report(transaction_id, hole_start)` for every gap between
    /// offset-adjacent fragments, in ascending order.
    ///
    /// Only interior gaps are reported: missing bytes before the lowest
    /// fragment or after the highest one do not produce a call.
    pub fn find_holes<F>(&self, mut report: F)
    where
        F: FnMut(u32, u64),
    {
        let ordered = self.store.ordered();
        for pair in ordered.windows(2) {
            let hole = pair[0].end();
            if hole != u64::from(pair[1].offset()) {
                report(self.transaction_id, hole);
            }
        }
    }

    pub fn holes(&self) -> Vec<Hole> {
        let mut holes = Vec::new();
        self.find_holes(|transaction_id, offset| {
            holes.push(Hole {
                transaction_id,
                offset,
            })
        });
        holes
    }

    /// Hex-encoded SHA-256 of all payloads concatenated in offset order.
    pub fn digest(&self) -> Result<String, IncompleteMessage> {
        if !self.is_complete() {
            return Err(IncompleteMessage {
                transaction_id: self.transaction_id,
                received_bytes: self.received_bytes,
                expected_total_bytes: self.expected_total_bytes(),
            });
        }
        let mut hasher = Sha256::new();
        for fragment in self.store.ordered() {
            hasher.update(fragment.data());
        }
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// `None` until the end fragment has been received.
    pub fn expected_total_bytes(&self) -> Option<u64> {
        self.end_received.then_some(self.expected_total_bytes)
    }

    pub fn end_received(&self) -> bool {
        self.end_received
    }

    pub fn fragment_count(&self) -> usize {
        self.store.len()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("transaction_id", &self.transaction_id)
            .field("received_bytes", &self.received_bytes)
            .field("expected_total_bytes", &self.expected_total_bytes())
            .field("fragments", &self.store)
            .finish()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddFragmentError {
    #[error("fragment at offset {offset} already received")]
    Duplicate { offset: u32 },

    #[error("fragment for transaction {found} routed to transaction {expected}")]
    WrongTransaction { expected: u32, found: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("message {transaction_id} doesn't have all the fragments ({received_bytes} bytes received, expected {expected_total_bytes:?})")]
pub struct IncompleteMessage {
    pub transaction_id: u32,
    pub received_bytes: u64,
    pub expected_total_bytes: Option<u64>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
