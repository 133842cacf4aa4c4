//! Request id assignment

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of JSON-RPC request ids
///
/// Every call must return a strictly greater id than the call before it.
pub trait RequestIdSequence: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Monotonic counter starting at 1
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

static GLOBAL_IDS: SequentialIds = SequentialIds::new();

impl SequentialIds {
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// The process-wide sequence shared by providers that aren't given one
    pub fn global() -> &'static SequentialIds {
        &GLOBAL_IDS
    }

    /// A handle to the process-wide sequence
    pub fn shared() -> Arc<dyn RequestIdSequence> {
        Arc::new(GlobalIds)
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdSequence for SequentialIds {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Forwards to [`SequentialIds::global`]
struct GlobalIds;

impl RequestIdSequence for GlobalIds {
    fn next_id(&self) -> u64 {
        SequentialIds::global().next_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn test_global_handles_share_one_counter() {
        let a = SequentialIds::shared();
        let b = SequentialIds::shared();

        let first = a.next_id();
        let second = b.next_id();
        let third = a.next_id();
        assert!(first < second && second < third);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let ids = Arc::new(SequentialIds::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..100).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(all.first(), Some(&1));
        assert_eq!(all.last(), Some(&400));
    }
}
