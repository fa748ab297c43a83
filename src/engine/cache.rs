use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Source of "now" for freshness and event timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A REST snapshot held by the cache.
///
/// The primary value is the one field a live feed may overwrite and the one
/// alert rules compare against (coin USD price, city temperature). Snapshots
/// without one keep the defaults.
pub trait Snapshot: Clone {
    fn primary_value(&self) -> Option<f64> {
        None
    }

    fn set_primary_value(&mut self, _value: f64) {}

    /// Human readable name used in notification messages.
    fn label(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

/// One cached entity. `status == Ready` iff both `value` and `fetched_at` are set.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: Option<V>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub status: CacheStatus,
    pub error_message: Option<String>,
    pub in_flight: bool,
    fetch_started_at: Option<DateTime<Utc>>,
    live_updated_at: Option<DateTime<Utc>>,
}

impl<K, V: Snapshot> CacheEntry<K, V> {
    pub fn idle(key: K) -> Self {
        Self {
            key,
            value: None,
            fetched_at: None,
            status: CacheStatus::Idle,
            error_message: None,
            in_flight: false,
            fetch_started_at: None,
            live_updated_at: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == CacheStatus::Ready
    }

    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        if !self.is_ready() {
            return false;
        }
        match self.fetched_at {
            // A timestamp in the future (clock skew) counts as fresh.
            Some(at) => (now - at).to_std().map_or(true, |age| age < max_age),
            None => false,
        }
    }

    fn has_baseline(&self) -> bool {
        self.value.is_some() && self.fetched_at.is_some()
    }

    /// Marks the entry in flight. An entry that already holds a value stays
    /// `Ready` while it refreshes.
    pub fn begin_fetch(self, now: DateTime<Utc>) -> Self {
        let status = if self.has_baseline() {
            CacheStatus::Ready
        } else {
            CacheStatus::Loading
        };
        Self {
            status,
            error_message: None,
            in_flight: true,
            fetch_started_at: Some(now),
            ..self
        }
    }

    /// Installs a new REST baseline. A live value written after the fetch was
    /// started is newer than the response and survives it.
    pub fn complete_fetch(self, mut value: V, now: DateTime<Utc>) -> Self {
        let started = self.fetch_started_at.unwrap_or(now);
        let newer_live = match (self.live_updated_at, &self.value) {
            (Some(at), Some(current)) if at > started => current.primary_value(),
            _ => None,
        };
        if let Some(live) = newer_live {
            value.set_primary_value(live);
        }
        Self {
            value: Some(value),
            fetched_at: Some(now),
            status: CacheStatus::Ready,
            error_message: None,
            in_flight: false,
            fetch_started_at: None,
            ..self
        }
    }

    pub fn fail_fetch(self, message: impl Into<String>, keep_stale_value: bool) -> Self {
        let message = Some(message.into());
        if keep_stale_value && self.has_baseline() {
            return Self {
                status: CacheStatus::Ready,
                error_message: message,
                in_flight: false,
                fetch_started_at: None,
                ..self
            };
        }
        Self {
            value: None,
            fetched_at: None,
            status: CacheStatus::Error,
            error_message: message,
            in_flight: false,
            fetch_started_at: None,
            live_updated_at: None,
            ..self
        }
    }

    /// Overwrites only the primary value of a `Ready` entry. Anything else is
    /// returned unchanged.
    pub fn apply_live_value(mut self, value: f64, now: DateTime<Utc>) -> Self {
        if self.status != CacheStatus::Ready {
            return self;
        }
        if let Some(snapshot) = self.value.as_mut() {
            snapshot.set_primary_value(value);
            self.live_updated_at = Some(now);
        }
        self
    }
}

/// Latest REST snapshot per key, with freshness and in-flight tracking.
pub struct SnapshotCache<K, V> {
    entries: HashMap<K, CacheEntry<K, V>>,
    clock: Clock,
}

impl<K: Eq + Hash + Clone, V: Snapshot> SnapshotCache<K, V> {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
        }
    }

    /// Current entry, or an `Idle` placeholder for an unseen key.
    pub fn get(&self, key: &K) -> CacheEntry<K, V> {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| CacheEntry::idle(key.clone()))
    }

    pub fn value(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|entry| entry.value.as_ref())
    }

    pub fn is_fresh(&self, key: &K, max_age: Duration) -> bool {
        let now = (self.clock)();
        self.entries
            .get(key)
            .map_or(false, |entry| entry.is_fresh(max_age, now))
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.entries.get(key).map_or(false, |entry| entry.in_flight)
    }

    /// Returns `false` without touching the entry when a fetch for `key` is
    /// already outstanding.
    pub fn begin_fetch(&mut self, key: K) -> bool {
        if self.is_in_flight(&key) {
            return false;
        }
        self.transition(key, |entry, now| entry.begin_fetch(now));
        true
    }

    pub fn complete_fetch(&mut self, key: K, value: V) {
        self.transition(key, |entry, now| entry.complete_fetch(value, now));
    }

    pub fn fail_fetch(&mut self, key: K, message: impl Into<String>, keep_stale_value: bool) {
        let message = message.into();
        self.transition(key, |entry, _| entry.fail_fetch(message, keep_stale_value));
    }

    /// Returns whether the value was merged, i.e. the entry was `Ready`.
    pub fn apply_live_value(&mut self, key: &K, value: f64) -> bool {
        let now = (self.clock)();
        match self.entries.remove(key) {
            Some(entry) => {
                let ready = entry.is_ready();
                self.entries
                    .insert(key.clone(), entry.apply_live_value(value, now));
                ready
            }
            None => false,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry<K, V>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn transition<F>(&mut self, key: K, update: F)
    where
        F: FnOnce(CacheEntry<K, V>, DateTime<Utc>) -> CacheEntry<K, V>,
    {
        let now = (self.clock)();
        let entry = self
            .entries
            .remove(&key)
            .unwrap_or_else(|| CacheEntry::idle(key.clone()));
        self.entries.insert(key, update(entry, now));
    }
}

impl<K: Eq + Hash + Clone, V: Snapshot> Default for SnapshotCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
