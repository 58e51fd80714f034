use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// How long a nonce is remembered after it was recorded
pub const NONCE_RETENTION: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Minimum spacing between opportunistic culls
pub const CULL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);

pub(crate) fn span(duration: std::time::Duration) -> Duration {
    Duration::seconds(duration.as_secs() as i64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRecord {
    pub nonce: String,
    pub seen_at: DateTime<Utc>,
}

#[derive(Default)]
struct NonceState {
    // latest sighting per nonce
    seen: HashMap<String, DateTime<Utc>>,
    // every sighting in insertion order; entries superseded in `seen` are skipped on cull
    by_time: VecDeque<NonceRecord>,
    last_cull: Option<DateTime<Utc>>,
}

impl NonceState {
    fn insert(&mut self, nonce: &str, now: DateTime<Utc>) {
        tracing::trace!(nonce, when = %now, "recording nonce");
        self.seen.insert(nonce.to_string(), now);
        self.by_time.push_back(NonceRecord {
            nonce: nonce.to_string(),
            seen_at: now,
        });
    }
}

/// Replay cache of recently seen request nonces.
///
/// Eviction is by age only; there is no capacity bound. Only callers holding
/// the shared MAC secret can add entries.
#[derive(Default)]
pub struct NonceStore {
    state: RwLock<NonceState>,
}

impl NonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `nonce` is currently remembered
    pub fn seen(&self, nonce: &str) -> bool {
        self.state.read().seen.contains_key(nonce)
    }

    /// Remember `nonce` as seen now. Recording again refreshes its timestamp.
    pub fn record(&self, nonce: &str) {
        self.record_at(nonce, Utc::now());
    }

    pub(crate) fn record_at(&self, nonce: &str, now: DateTime<Utc>) {
        self.state.write().insert(nonce, now);
    }

    /// Record `nonce` unless it is already present, under a single write lock.
    ///
    /// Returns `false` when the nonce was already present (a replay).
    pub fn check_and_record(&self, nonce: &str) -> bool {
        self.check_and_record_at(nonce, Utc::now())
    }

    pub(crate) fn check_and_record_at(&self, nonce: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.state.write();
        if state.seen.contains_key(nonce) {
            return false;
        }
        state.insert(nonce, now);
        true
    }

    /// Forget every nonce recorded more than [`NONCE_RETENTION`] ago.
    ///
    /// Returns the number of nonces forgotten.
    pub fn cull(&self) -> usize {
        self.cull_at(Utc::now())
    }

    pub(crate) fn cull_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - span(NONCE_RETENTION);
        let mut state = self.state.write();
        let mut removed = 0;

        while let Some(front) = state.by_time.front() {
            if front.seen_at >= cutoff {
                break;
            }
            let Some(record) = state.by_time.pop_front() else {
                break;
            };
            // only drop the map entry if it has not been refreshed since
            if state.seen.get(&record.nonce) == Some(&record.seen_at) {
                state.seen.remove(&record.nonce);
                removed += 1;
                tracing::trace!(nonce = %record.nonce, when = %record.seen_at, "culling nonce");
            }
        }

        state.last_cull = Some(now);
        removed
    }

    /// True when more than [`CULL_INTERVAL`] has passed since the last cull
    pub fn cullable(&self) -> bool {
        self.cullable_at(Utc::now())
    }

    pub(crate) fn cullable_at(&self, now: DateTime<Utc>) -> bool {
        match self.state.read().last_cull {
            Some(last) => now - last > span(CULL_INTERVAL),
            None => true,
        }
    }

    /// Number of distinct nonces currently remembered
    pub fn len(&self) -> usize {
        self.state.read().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unrecorded_nonce_is_not_seen() {
        let store = NonceStore::new();
        assert!(!store.seen("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_record_then_seen() {
        let store = NonceStore::new();
        store.record("n1");
        assert!(store.seen("n1"));
        assert!(!store.seen("n2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_check_and_record_rejects_second_insert() {
        let store = NonceStore::new();
        assert!(store.check_and_record("n1"));
        assert!(!store.check_and_record("n1"));
        assert!(store.check_and_record("n2"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_cull_removes_only_expired() {
        let store = NonceStore::new();
        let now = Utc::now();
        store.record_at("old", now - Duration::minutes(61));
        store.record_at("recent", now - Duration::minutes(59));

        assert_eq!(store.cull_at(now), 1);
        assert!(!store.seen("old"));
        assert!(store.seen("recent"));
    }

    #[test]
    fn test_refreshed_nonce_survives_cull() {
        let store = NonceStore::new();
        let now = Utc::now();
        store.record_at("n", now - Duration::minutes(90));
        store.record_at("n", now - Duration::minutes(10));

        assert_eq!(store.cull_at(now), 0);
        assert!(store.seen("n"));

        assert_eq!(store.cull_at(now + Duration::minutes(55)), 1);
        assert!(!store.seen("n"));
    }

    #[test]
    fn test_forgotten_nonce_is_accepted_again() {
        let store = NonceStore::new();
        let now = Utc::now();
        assert!(store.check_and_record_at("n", now - Duration::hours(2)));
        store.cull_at(now);
        assert!(store.check_and_record_at("n", now));
    }

    #[test]
    fn test_cullable_interval() {
        let store = NonceStore::new();
        let now = Utc::now();
        assert!(store.cullable_at(now));

        store.cull_at(now);
        assert!(!store.cullable_at(now + Duration::minutes(4)));
        assert!(!store.cullable_at(now + Duration::minutes(5)));
        assert!(store.cullable_at(now + Duration::minutes(5) + Duration::seconds(1)));
    }

    #[test]
    fn test_concurrent_check_and_record_admits_one() {
        let store = Arc::new(NonceStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.check_and_record("same-nonce"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(admitted, 1);
    }
}
