use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use warden_core::AgentId;

use crate::action::ActionType;
use crate::service::GovernanceDecision;

type CacheKey = (AgentId, ActionType);

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

struct CacheEntry {
    decision: GovernanceDecision,
    inserted_at: Instant,
    /// Monotonic access stamp; the newest stamp in `access_order` for a key
    /// is the authoritative one, older queue entries for the key are stale.
    stamp: u64,
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Access-order queue with lazy cleanup. Stale (key, stamp) pairs are
    /// skipped during eviction and compacted when the queue outgrows the
    /// live entry set, keeping get/insert amortized O(1).
    access_order: VecDeque<(CacheKey, u64)>,
    next_stamp: u64,
}

/// Bounded TTL cache for governance decisions, keyed by (agent, action).
///
/// Staleness up to the TTL is a deliberate trade-off: an agent whose
/// maturity changed can keep its old decision until expiry unless the
/// caller invalidates explicitly.
pub struct GovernanceCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl GovernanceCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                access_order: VecDeque::new(),
                next_stamp: 0,
            }),
            ttl,
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// 60s TTL, 4096 entries.
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(60), 4096)
    }

    /// Look up a cached decision. Expired entries count as misses and are
    /// dropped on the spot.
    pub fn get(&self, agent_id: &str, action: ActionType) -> Option<GovernanceDecision> {
        let key = (agent_id.to_string(), action);
        let mut inner = self.inner.lock();

        let stamp = inner.next_stamp;
        let decision = match inner.entries.get_mut(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                entry.stamp = stamp;
                Some(entry.decision.clone())
            }
            Some(_) => {
                inner.entries.remove(&key);
                None
            }
            None => None,
        };

        match decision {
            Some(decision) => {
                inner.next_stamp += 1;
                inner.access_order.push_back((key, stamp));
                Self::maybe_compact(&mut inner);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(decision)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a freshly computed decision, evicting the least-recently-used
    /// entry when over capacity.
    pub fn insert(&self, agent_id: &str, action: ActionType, decision: GovernanceDecision) {
        let key = (agent_id.to_string(), action);
        let mut inner = self.inner.lock();

        let stamp = inner.next_stamp;
        inner.next_stamp += 1;
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                decision,
                inserted_at: Instant::now(),
                stamp,
            },
        );
        inner.access_order.push_back((key, stamp));

        while inner.entries.len() > self.capacity {
            match inner.access_order.pop_front() {
                Some((old_key, old_stamp)) => {
                    // Only evict if this queue entry is the key's live stamp;
                    // otherwise the key was touched again later.
                    if inner.entries.get(&old_key).is_some_and(|e| e.stamp == old_stamp) {
                        inner.entries.remove(&old_key);
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }
        Self::maybe_compact(&mut inner);
    }

    /// Drop every cached decision for an agent (all action types).
    /// Best-effort: callers invoke this on explicit maturity changes.
    pub fn invalidate_agent(&self, agent_id: &str) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|(id, _), _| id != agent_id);
        let live: std::collections::HashSet<CacheKey> = inner.entries.keys().cloned().collect();
        inner.access_order.retain(|(k, _)| live.contains(k));
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.access_order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.inner.lock().entries.len(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Keep the lazy queue proportional to the live set.
    fn maybe_compact(inner: &mut CacheInner) {
        if inner.access_order.len() > inner.entries.len() * 4 + 16 {
            let CacheInner {
                entries,
                access_order,
                ..
            } = inner;
            access_order.retain(|(k, s)| entries.get(k).is_some_and(|e| e.stamp == *s));
        }
    }
}
