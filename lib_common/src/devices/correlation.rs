//! # Correlation Store
//!
//! The device-requests API leaves it to the client to remember what each
//! `async-id` was for. The store keeps one `CorrelationEntry` per in-flight
//! request until its response is routed.
//!
//! ## Guarantees:
//! - `take_by_id` finds and removes under a single lock, so two callers racing
//!   on the same id cannot both get the entry.
//! - The store does not check id uniqueness; ids come from
//!   `CorrelationIdGenerator`.
//! - Entries never expire on their own. `evict_older_than` exists for callers
//!   that opt into a TTL sweep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::devices::model::CorrelationEntry;

/// An entry plus the moment it was stored.
struct Slot {
    entry: CorrelationEntry,
    stored_at: Instant,
}

/// In-memory table of outstanding device requests.
#[derive(Default)]
pub struct CorrelationStore {
    slots: Mutex<Vec<Slot>>,
}

impl CorrelationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Vec<Slot>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends an entry.
    pub fn insert(&self, entry: CorrelationEntry) {
        log::debug!(
            "Tracking async id {} for {} {}",
            entry.correlation_id,
            entry.device_id,
            entry.path
        );
        self.slots().push(Slot {
            entry,
            stored_at: Instant::now(),
        });
    }

    /// Removes and returns the first entry with `correlation_id`.
    pub fn take_by_id(&self, correlation_id: &str) -> Option<CorrelationEntry> {
        let mut slots = self.slots();
        let index = slots
            .iter()
            .position(|slot| slot.entry.correlation_id == correlation_id)?;
        Some(slots.remove(index).entry)
    }

    /// Drops entries stored more than `ttl` ago and returns how many went.
    pub fn evict_older_than(&self, ttl: Duration) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|slot| slot.stored_at.elapsed() <= ttl);
        before - slots.len()
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// True when nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

/// # Correlation Id Generator
///
/// Produces `<unix millis>-<counter>-<random>` tokens. The counter makes ids
/// unique within the process; the millisecond prefix and random suffix keep
/// them apart from ids issued by earlier runs whose responses may still be
/// queued at the service.
#[derive(Default)]
pub struct CorrelationIdGenerator {
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a generator starting at counter zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh id.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let suffix: u32 = rand::random_range(0..10_000);
        format!("{}-{}-{:04}", Utc::now().timestamp_millis(), n, suffix)
    }
}
