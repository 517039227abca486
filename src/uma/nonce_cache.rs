use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::Error;

/// Seen signature nonces, for replay protection of signed UMA messages.
///
/// Anything timestamped at or before the floor is rejected outright, so
/// entries at or below the floor can be dropped without reopening a replay
/// window.
#[derive(Debug)]
pub struct InMemoryNonceCache {
    inner: Mutex<NonceState>,
}

#[derive(Debug)]
struct NonceState {
    floor: i64,
    seen: HashMap<String, i64>,
}

impl InMemoryNonceCache {
    pub fn new(oldest_valid_timestamp: i64) -> Self {
        Self {
            inner: Mutex::new(NonceState {
                floor: oldest_valid_timestamp,
                seen: HashMap::new(),
            }),
        }
    }

    pub fn check_and_store(&self, nonce: &str, timestamp: i64) -> Result<(), Error> {
        let mut state = self.inner.lock();
        // the floor itself counts as already seen
        if timestamp <= state.floor {
            return Err(Error::Replay(format!(
                "timestamp {} is too old",
                timestamp
            )));
        }
        if state.seen.contains_key(nonce) {
            return Err(Error::Replay(format!("nonce {} already used", nonce)));
        }
        state.seen.insert(nonce.to_string(), timestamp);
        Ok(())
    }

    /// Forgets nonces at or before `timestamp` and raises the floor to it.
    pub fn purge_older_than(&self, timestamp: i64) {
        let mut state = self.inner.lock();
        state.seen.retain(|_, seen_at| *seen_at > timestamp);
        state.floor = state.floor.max(timestamp);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryNonceCache {
    /// Accepts messages up to a day old.
    fn default() -> Self {
        Self::new(Utc::now().timestamp() - 24 * 60 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_reused_nonce() {
        let cache = InMemoryNonceCache::new(1000);
        cache.check_and_store("abc", 1001).unwrap();
        let err = cache.check_and_store("abc", 1002).unwrap_err();
        assert!(matches!(err, Error::Replay(_)));
        cache.check_and_store("def", 1001).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_rejects_at_or_below_floor() {
        let cache = InMemoryNonceCache::new(1000);
        assert!(matches!(cache.check_and_store("a", 999), Err(Error::Replay(_))));
        assert!(matches!(cache.check_and_store("b", 1000), Err(Error::Replay(_))));
        assert!(cache.is_empty());
        cache.check_and_store("c", 1001).unwrap();
    }

    #[test]
    fn test_purge_advances_floor() {
        let cache = InMemoryNonceCache::new(0);
        cache.check_and_store("old", 10).unwrap();
        cache.check_and_store("edge", 20).unwrap();
        cache.check_and_store("new", 30).unwrap();

        cache.purge_older_than(20);
        assert_eq!(cache.len(), 1);
        assert!(cache.check_and_store("edge", 20).is_err());
        assert!(cache.check_and_store("unseen", 20).is_err());
        // still rejected once purged, through the floor
        assert!(cache.check_and_store("old", 10).is_err());
        assert!(cache.check_and_store("new", 31).is_err());
        cache.check_and_store("fresh", 21).unwrap();

        cache.purge_older_than(5);
        assert!(cache.check_and_store("late", 15).is_err());
    }
}
