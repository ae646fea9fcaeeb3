//! Registry counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RegistryStats {
    fragments: AtomicU64,
    duplicates: AtomicU64,
    misrouted: AtomicU64,
    completed: AtomicU64,
    abandoned: AtomicU64,
    holes: AtomicU64,
    cleanups_rearmed: AtomicU64,
}

/// Point-in-time copy of [`RegistryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Fragments accepted into a message, including the first one.
    pub fragments: u64,
    pub duplicates: u64,
    /// Fragments whose transaction id did not match the message they reached.
    pub misrouted: u64,
    pub completed: u64,
    pub abandoned: u64,
    pub holes: u64,
    /// Tracked transactions found without a cleanup timer and re-armed.
    pub cleanups_rearmed: u64,
}

impl RegistryStats {
    pub(crate) fn fragment(&self) {
        self.fragments.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn misrouted(&self) {
        self.misrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn abandoned(&self, holes: usize) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
        self.holes.fetch_add(holes as u64, Ordering::Relaxed);
    }

    pub(crate) fn rearmed(&self) {
        self.cleanups_rearmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fragments: self.fragments.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            misrouted: self.misrouted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            holes: self.holes.load(Ordering::Relaxed),
            cleanups_rearmed: self.cleanups_rearmed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counts() {
        let stats = RegistryStats::default();
        stats.fragment();
        stats.fragment();
        stats.duplicate();
        stats.abandoned(3);
        let snap = stats.snapshot();
        assert_eq!(snap.fragments, 2);
        assert_eq!(snap.duplicates, 1);
        assert_eq!(snap.abandoned, 1);
        assert_eq!(snap.holes, 3);
        assert_eq!(snap.completed, 0);
    }
}
