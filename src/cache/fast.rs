//! Fast tier: key -> (value, expiry), evicted lazily on read.

use std::{borrow::Borrow, collections::HashMap, hash::Hash, time::Duration};

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value:   V,
    expires: Instant,
}

impl<V> Entry<V> {
    fn live(&self, now: Instant) -> bool { now < self.expires }
}

#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    map:    HashMap<K, Entry<V>>,
    hits:   u64,
    misses: u64,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self { map: HashMap::new(), hits: 0, misses: 0 }
    }
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, key: K, value: V, ttl: Duration) {
        let expires = Instant::now() + ttl;
        self.map.insert(key, Entry { value, expires });
    }

    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get_mut(key).map(|v| &*v)
    }

    /// Mutable access to a live entry; the expiry is left as it was.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        let live = self.map.get(key).map(|e| e.live(now));
        match live {
            Some(true) => {
                self.hits += 1;
                self.map.get_mut(key).map(|e| &mut e.value)
            }
            Some(false) => {
                self.map.remove(key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        self.map.remove(key).filter(|e| e.live(now)).map(|e| e.value)
    }

    /// Live entries whose key satisfies `pred`.
    pub fn live_where(&self, pred: impl Fn(&K) -> bool) -> impl Iterator<Item = (&K, &V)> {
        let now = Instant::now();
        self.map
            .iter()
            .filter(move |(k, e)| e.live(now) && pred(k))
            .map(|(k, e)| (k, &e.value))
    }

    /// Drops every entry whose key satisfies `pred`, live or not.
    pub fn remove_where(&mut self, pred: impl Fn(&K) -> bool) -> usize {
        let before = self.map.len();
        self.map.retain(|k, _| !pred(k));
        before - self.map.len()
    }

    /// Reclaims expired entries. Returns how many were dropped.
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, e| e.live(now));
        before - self.map.len()
    }

    /// Physical size, expired-but-unswept entries included.
    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }
    pub fn hit_miss(&self) -> (u64, u64) { (self.hits, self.misses) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expired_entry_reads_as_absent() {
        let mut c = TtlCache::new();
        c.insert("cursor", 1, Duration::from_secs(2));
        assert_eq!(c.get("cursor"), Some(&1));

        tokio::time::advance(Duration::from_millis(2001)).await;
        assert_eq!(c.get("cursor"), None);
        assert!(c.is_empty(), "lazy read evicts");
        assert_eq!(c.hit_miss(), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reclaims_only_expired() {
        let mut c = TtlCache::new();
        c.insert(1, "short", Duration::from_secs(1));
        c.insert(2, "long", Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(c.len(), 2);
        assert_eq!(c.sweep(), 1);
        assert_eq!(c.get(&2), Some(&"long"));
    }

    #[tokio::test(start_paused = true)]
    async fn in_place_update_keeps_deadline() {
        let mut c = TtlCache::new();
        c.insert("batch", vec![1], Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(6)).await;
        c.get_mut("batch").unwrap().push(2);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(c.get("batch").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_listing_skips_dead_entries() {
        let mut c = TtlCache::new();
        c.insert(("R1", "a"), 1, Duration::from_secs(1));
        c.insert(("R1", "b"), 2, Duration::from_secs(30));
        c.insert(("R2", "c"), 3, Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(2)).await;

        let live: Vec<_> = c.live_where(|(room, _)| *room == "R1").map(|(_, v)| *v).collect();
        assert_eq!(live, vec![2]);
        assert_eq!(c.remove_where(|(room, _)| *room == "R1"), 2);
        assert_eq!(c.len(), 1);
    }
}
