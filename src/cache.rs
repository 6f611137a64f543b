use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: DateTime<Utc>,
}

/// Concurrent map whose entries stop being visible once their TTL runs out.
/// Expired entries stay in memory until the next `get` on the same key or a
/// `purge_expired` sweep.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        // Ref guard must be dropped before removing, DashMap deadlocks otherwise
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        None
    }

    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Inserts with an absolute expiry, used when restoring a snapshot.
    pub fn put_until(&self, key: K, value: V, expires_at: DateTime<Utc>) {
        if expires_at > self.clock.now() {
            self.entries.insert(key, CacheEntry { value, expires_at });
        }
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }

    /// Live entries only.
    pub fn snapshot(&self) -> Vec<(K, CacheEntry<V>)> {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|r| r.value().expires_at > now)
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (Arc<ManualClock>, TtlCache<String, u32>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = TtlCache::new(clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_entry_visible_until_ttl() {
        let (clock, cache) = cache();
        cache.put("a".to_string(), 1, Duration::seconds(300));

        clock.advance(Duration::seconds(299));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.len(), 0, "Expired entry should be removed on access");
    }

    #[test]
    fn test_purge_keeps_live_entries() {
        let (clock, cache) = cache();
        cache.put("short".to_string(), 1, Duration::seconds(10));
        cache.put("long".to_string(), 2, Duration::seconds(1000));

        clock.advance(Duration::seconds(60));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get(&"long".to_string()), Some(2));
        assert_eq!(cache.get(&"short".to_string()), None);
    }

    #[test]
    fn test_put_until_ignores_past_expiry() {
        let (clock, cache) = cache();
        let now = clock.now();
        cache.put_until("old".to_string(), 1, now - Duration::seconds(1));
        cache.put_until("new".to_string(), 2, now + Duration::seconds(1));

        assert_eq!(cache.len(), 1);
        let snap = cache.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, "new");
    }
}
