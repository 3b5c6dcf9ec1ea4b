//! In-process cache backend.
//!
//! Mirrors the Redis layout: JSON snapshots with expiry, a score-ordered
//! recent set and expiring lock keys, all behind one mutex so every
//! operation is atomic.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{CacheError, CacheKeys, CacheStore, RECENT_LIST_LIMIT};
use crate::model::Notification;

/// Deadline used when `now + ttl` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A value with an expiry deadline.
#[derive(Debug, Clone)]
struct Expiring {
    value: String,
    expires_at: Instant,
}

impl Expiring {
    fn new(value: String, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self { value, expires_at }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Member of the recent set.
#[derive(Debug, Clone)]
struct RankedMember {
    score: i64,
    /// Insertion sequence, used to order equal scores.
    seq: u64,
    member: String,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Expiring>,
    recent: Vec<RankedMember>,
    locks: HashMap<String, Expiring>,
    next_seq: u64,
}

impl Inner {
    fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, e| e.is_live(now));
        self.locks.retain(|_, e| e.is_live(now));
    }

    /// Insert or rescore a member, keeping the set ordered by score
    /// descending, then insertion order.
    fn add_ranked(&mut self, score: i64, member: String) {
        if let Some(existing) = self.recent.iter_mut().find(|m| m.member == member) {
            existing.score = score;
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.recent.push(RankedMember { score, seq, member });
        }
        self.recent
            .sort_by(|a, b| b.score.cmp(&a.score).then(a.seq.cmp(&b.seq)));
    }
}

/// In-process [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    keys: CacheKeys,
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new(keys: CacheKeys) -> Self {
        Self {
            keys,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Whether a live snapshot exists for `id`.
    pub fn contains_entity(&self, id: i64) -> bool {
        let key = self.keys.entity_key(id);
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(&key)
            .is_some_and(|e| e.is_live(now))
    }

    /// Number of members in the recent set.
    pub fn recent_len(&self) -> usize {
        self.inner.lock().recent.len()
    }

    /// Whether a live lock is held on `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .locks
            .get(key)
            .is_some_and(|l| l.is_live(now))
    }

    /// Number of live snapshots.
    pub fn entity_count(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_entity(&self, id: i64) -> Result<Option<Notification>, CacheError> {
        let key = self.keys.entity_key(id);
        let now = Instant::now();
        let raw = {
            let inner = self.inner.lock();
            match inner.entries.get(&key) {
                Some(entry) if entry.is_live(now) => entry.value.clone(),
                _ => return Ok(None),
            }
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn put_entity(&self, notification: &Notification, ttl: Duration) -> Result<(), CacheError> {
        let key = self.keys.entity_key(notification.id);
        let raw = serde_json::to_string(notification)?;
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        inner.entries.insert(key, Expiring::new(raw, ttl));
        Ok(())
    }

    async fn delete_entity(&self, id: i64) -> Result<(), CacheError> {
        let key = self.keys.entity_key(id);
        self.inner.lock().entries.remove(&key);
        Ok(())
    }

    async fn get_recent_list(&self) -> Result<Vec<Notification>, CacheError> {
        let members: Vec<String> = self
            .inner
            .lock()
            .recent
            .iter()
            .map(|m| m.member.clone())
            .collect();

        members
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(CacheError::from))
            .collect()
    }

    async fn populate_recent_list(&self, notifications: &[Notification]) -> Result<(), CacheError> {
        if notifications.is_empty() {
            return Ok(());
        }

        // Serialize first so a failure leaves the set untouched.
        let members = notifications
            .iter()
            .map(|n| serde_json::to_string(n).map(|raw| (n.created_at, raw)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut inner = self.inner.lock();
        for (score, member) in members {
            inner.add_ranked(score, member);
        }
        inner.recent.truncate(RECENT_LIST_LIMIT);
        Ok(())
    }

    async fn clear_recent_list(&self) -> Result<(), CacheError> {
        self.inner.lock().recent.clear();
        Ok(())
    }

    async fn try_acquire_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if inner.locks.get(key).is_some_and(|l| l.is_live(now)) {
            return Ok(false);
        }
        inner
            .locks
            .insert(key.to_string(), Expiring::new(token.to_string(), ttl));
        Ok(true)
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.locks.get(key) {
            Some(lock) if lock.is_live(now) && lock.value == token => {
                inner.locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn lock_key_for(&self, operation: &str) -> String {
        self.keys.lock_key(operation)
    }
}
