//! Time-bounded volume location cache shared by every session of a client.

use super::types::Location;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    locations: Vec<Location>,
    /// `None` when `now + ttl` is past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// Volume id to locations, each entry bounded by its own expiry.
///
/// Two callers missing on the same volume may both look it up; the later
/// `put` wins.
pub struct LocationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl LocationCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Locations for `volume_id`, or `None` when absent or expired.
    pub fn get(&self, volume_id: &str) -> Option<Vec<Location>> {
        let now = self.now();
        let entries = self.lock();
        entries
            .get(volume_id)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.locations.clone())
    }

    pub fn put(&self, volume_id: &str, locations: Vec<Location>, ttl: Duration) {
        let expires_at = self.now().checked_add(ttl);
        self.lock().insert(
            volume_id.to_string(),
            CacheEntry {
                locations,
                expires_at,
            },
        );
    }

    pub fn invalidate(&self, volume_id: &str) {
        self.lock().remove(volume_id);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
