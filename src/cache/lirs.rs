//! LIRS cache
//!
//! Entries live in a [`Slab`] arena and are threaded onto two intrusive
//! doubly linked lists by index: the recency stack and the cold queue.
//! The front of each list is its oldest end (stack bottom, queue front).

use super::stats::{CacheStats, Counters};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use slab::Slab;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tracing::trace;

/// Share of capacity reserved for hot entries
pub const DEFAULT_HOT_RATIO: f64 = 0.99;

type ReleaseHook<K, V> = Box<dyn Fn(K, V) + Send + Sync>;

/// State of a tracked key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Resident with low inter-reference recency
    Hot,
    /// Resident, first in line for eviction
    Cold,
    /// Evicted; kept in the stack as recency history only
    NonResident,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Default)]
struct Ring {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

#[derive(Debug, Clone, Copy)]
enum Which {
    Stack,
    Queue,
}

struct Entry<K, V> {
    key: K,
    value: Option<V>,
    status: EntryStatus,
    stack: Option<Link>,
    queue: Option<Link>,
}

struct State<K, V> {
    entries: Slab<Entry<K, V>>,
    index: HashMap<K, usize>,
    stack: Ring,
    queue: Ring,
    capacity: usize,
    hot_capacity: usize,
    hot_len: usize,
    resident_len: usize,
    non_resident_len: usize,
    counters: Counters,
}

/// Bounded, thread-safe key-value cache with LIRS replacement.
///
/// Values are handed out by clone, so `V` is typically an `Arc`. A value
/// that leaves the cache (eviction, removal, replacement or [`clear`])
/// is passed to the release hook after the cache lock is dropped.
///
/// [`clear`]: LirsCache::clear
pub struct LirsCache<K, V> {
    state: Mutex<State<K, V>>,
    release: ReleaseHook<K, V>,
}

impl<K, V> fmt::Debug for LirsCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LirsCache")
            .field("capacity", &state.capacity)
            .field("hot_capacity", &state.hot_capacity)
            .field("resident", &state.resident_len)
            .field("hot", &state.hot_len)
            .finish()
    }
}

/// Hot budget for a cache: `floor(capacity * ratio)`, leaving at least one cold slot
fn hot_capacity(capacity: usize, ratio: f64) -> usize {
    let ratio = if ratio.is_nan() {
        DEFAULT_HOT_RATIO
    } else {
        ratio.clamp(0.0, 1.0)
    };
    ((capacity as f64 * ratio).floor() as usize).min(capacity - 1)
}

impl<K, V> LirsCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` values (minimum 1)
    pub fn new(capacity: usize, hot_ratio: f64) -> Self {
        Self::with_release(capacity, hot_ratio, |_, _| {})
    }

    /// Create a cache that passes every released value to `release`
    pub fn with_release<F>(capacity: usize, hot_ratio: f64, release: F) -> Self
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                entries: Slab::with_capacity(capacity),
                index: HashMap::with_capacity(capacity),
                stack: Ring::default(),
                queue: Ring::default(),
                capacity,
                hot_capacity: hot_capacity(capacity, hot_ratio),
                hot_len: 0,
                resident_len: 0,
                non_resident_len: 0,
                counters: Counters::default(),
            }),
            release: Box::new(release),
        }
    }

    /// Value for a resident key.
    ///
    /// A miss is an error: callers that can build the value use
    /// [`get_or_load`](Self::get_or_load).
    pub fn get(&self, key: &K) -> Result<V> {
        let mut state = self.state.lock();
        match state.lookup(key) {
            Some(value) => {
                state.counters.hits += 1;
                Ok(value)
            }
            None => {
                state.counters.misses += 1;
                Err(Error::Internal("Cache miss without a factory".to_string()))
            }
        }
    }

    /// Value for `key`, building it with `factory` on a miss.
    ///
    /// The factory runs without the cache lock held. If it fails nothing is
    /// inserted and its error is returned unchanged. Two threads missing the
    /// same key may both run the factory; the first value inserted wins and
    /// the other is released.
    pub fn get_or_load<E, F>(&self, key: K, factory: F) -> std::result::Result<V, E>
    where
        F: FnOnce(&K) -> std::result::Result<V, E>,
    {
        {
            let mut state = self.state.lock();
            if let Some(value) = state.lookup(&key) {
                state.counters.hits += 1;
                return Ok(value);
            }
            state.counters.misses += 1;
        }

        let value = factory(&key)?;

        let mut released = Vec::new();
        let result = {
            let mut state = self.state.lock();
            match state.lookup(&key) {
                Some(resident) => {
                    trace!("concurrent load lost the race, releasing duplicate");
                    released.push((key, value));
                    resident
                }
                None => {
                    state.admit(key, value.clone(), &mut released);
                    value
                }
            }
        };
        self.release_all(released);
        Ok(result)
    }

    /// Insert or replace the value for `key`
    pub fn set(&self, key: K, value: V) {
        let mut released = Vec::new();
        {
            let mut state = self.state.lock();
            match state.resident_index(&key) {
                Some(idx) => {
                    state.counters.hits += 1;
                    state.touch(idx);
                    if let Some(old) = state.entries[idx].value.replace(value) {
                        released.push((key, old));
                    }
                }
                None => {
                    state.counters.misses += 1;
                    state.admit(key, value, &mut released);
                }
            }
        }
        self.release_all(released);
    }

    /// Drop `key` from the cache; returns whether a value was resident
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.state.lock().remove(key);
        match removed {
            Some(value) => {
                (self.release)(key.clone(), value);
                true
            }
            None => false,
        }
    }

    /// Resident value for `key` without recording an access
    pub fn peek(&self, key: &K) -> Option<V> {
        let state = self.state.lock();
        let idx = state.resident_index(key)?;
        state.entries[idx].value.clone()
    }

    /// Whether `key` currently has a resident value
    pub fn contains_key(&self, key: &K) -> bool {
        self.state.lock().resident_index(key).is_some()
    }

    /// State of `key`, if tracked at all
    pub fn status(&self, key: &K) -> Option<EntryStatus> {
        let state = self.state.lock();
        state.index.get(key).map(|&idx| state.entries[idx].status)
    }

    /// Number of resident values
    pub fn len(&self) -> usize {
        self.state.lock().resident_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    pub fn hot_capacity(&self) -> usize {
        self.state.lock().hot_capacity
    }

    pub fn hot_len(&self) -> usize {
        self.state.lock().hot_len
    }

    /// Clones of every resident value
    pub fn values(&self) -> Vec<V> {
        self.state
            .lock()
            .entries
            .iter()
            .filter_map(|(_, entry)| entry.value.clone())
            .collect()
    }

    /// Keys of every resident value
    pub fn keys(&self) -> Vec<K> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.value.is_some())
            .map(|(_, entry)| entry.key.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats::new(
            state.counters,
            state.capacity,
            state.hot_len,
            state.resident_len - state.hot_len,
            state.non_resident_len,
        )
    }

    /// Release every resident value and forget all history
    pub fn clear(&self) {
        let released = self.state.lock().clear();
        self.release_all(released);
    }

    fn release_all(&self, released: Vec<(K, V)>) {
        for (key, value) in released {
            (self.release)(key, value);
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        self.state.lock().check_invariants();
    }
}

impl<K, V> State<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn link_mut(&mut self, which: Which, idx: usize) -> &mut Option<Link> {
        let entry = &mut self.entries[idx];
        match which {
            Which::Stack => &mut entry.stack,
            Which::Queue => &mut entry.queue,
        }
    }

    fn ring_mut(&mut self, which: Which) -> &mut Ring {
        match which {
            Which::Stack => &mut self.stack,
            Which::Queue => &mut self.queue,
        }
    }

    fn push_back(&mut self, which: Which, idx: usize) {
        let tail = self.ring_mut(which).tail;
        *self.link_mut(which, idx) = Some(Link {
            prev: tail,
            next: None,
        });
        match tail {
            Some(tail) => {
                if let Some(link) = self.link_mut(which, tail) {
                    link.next = Some(idx);
                }
            }
            None => self.ring_mut(which).head = Some(idx),
        }
        let ring = self.ring_mut(which);
        ring.tail = Some(idx);
        ring.len += 1;
    }

    fn unlink(&mut self, which: Which, idx: usize) -> bool {
        let link = match self.link_mut(which, idx).take() {
            Some(link) => link,
            None => return false,
        };
        match link.prev {
            Some(prev) => {
                if let Some(prev_link) = self.link_mut(which, prev) {
                    prev_link.next = link.next;
                }
            }
            None => self.ring_mut(which).head = link.next,
        }
        match link.next {
            Some(next) => {
                if let Some(next_link) = self.link_mut(which, next) {
                    next_link.prev = link.prev;
                }
            }
            None => self.ring_mut(which).tail = link.prev,
        }
        self.ring_mut(which).len -= 1;
        true
    }

    fn move_to_back(&mut self, which: Which, idx: usize) {
        self.unlink(which, idx);
        self.push_back(which, idx);
    }

    fn resident_index(&self, key: &K) -> Option<usize> {
        let idx = *self.index.get(key)?;
        match self.entries[idx].status {
            EntryStatus::NonResident => None,
            _ => Some(idx),
        }
    }

    /// Hit path: record the access and clone the value
    fn lookup(&mut self, key: &K) -> Option<V> {
        let idx = self.resident_index(key)?;
        self.touch(idx);
        self.entries[idx].value.clone()
    }

    fn touch(&mut self, idx: usize) {
        match self.entries[idx].status {
            EntryStatus::Hot => {
                let was_bottom = self.stack.head == Some(idx);
                self.move_to_back(Which::Stack, idx);
                if was_bottom {
                    self.prune();
                }
            }
            EntryStatus::Cold if self.entries[idx].stack.is_some() => {
                self.unlink(Which::Queue, idx);
                self.move_to_back(Which::Stack, idx);
                self.promote(idx);
            }
            EntryStatus::Cold => self.move_to_back(Which::Queue, idx),
            EntryStatus::NonResident => {}
        }
    }

    /// Mark a stack-tracked entry hot, demoting the stack bottom when over budget
    fn promote(&mut self, idx: usize) {
        self.entries[idx].status = EntryStatus::Hot;
        self.hot_len += 1;
        trace!(hot = self.hot_len, "Promoted entry to hot");
        if self.hot_len > self.hot_capacity {
            self.demote_bottom();
        }
    }

    fn demote_bottom(&mut self) {
        self.prune();
        if let Some(bottom) = self.stack.head {
            self.unlink(Which::Stack, bottom);
            self.entries[bottom].status = EntryStatus::Cold;
            self.hot_len -= 1;
            self.push_back(Which::Queue, bottom);
            trace!(hot = self.hot_len, "Demoted stack bottom to cold");
            self.prune();
        }
    }

    /// Pop non-hot entries off the stack bottom until a hot entry is there
    fn prune(&mut self) {
        while let Some(bottom) = self.stack.head {
            match self.entries[bottom].status {
                EntryStatus::Hot => break,
                EntryStatus::Cold => {
                    self.unlink(Which::Stack, bottom);
                }
                EntryStatus::NonResident => {
                    self.unlink(Which::Stack, bottom);
                    self.forget(bottom);
                }
            }
        }
    }

    /// Drop an unlinked non-resident entry
    fn forget(&mut self, idx: usize) {
        let entry = self.entries.remove(idx);
        self.index.remove(&entry.key);
        self.non_resident_len -= 1;
    }

    fn insert(&mut self, key: K, value: V, status: EntryStatus) -> usize {
        let idx = self.entries.insert(Entry {
            key: key.clone(),
            value: Some(value),
            status,
            stack: None,
            queue: None,
        });
        self.index.insert(key, idx);
        idx
    }

    /// Miss path: make room if full, then insert `value` as hot or cold
    fn admit(&mut self, key: K, value: V, released: &mut Vec<(K, V)>) {
        if self.resident_len >= self.capacity {
            if let Some(evicted) = self.evict() {
                released.push(evicted);
            }
        }

        match self.index.get(&key).copied() {
            Some(idx) => {
                trace!("Miss on non-resident history entry");
                self.entries[idx].value = Some(value);
                self.entries[idx].status = EntryStatus::Cold;
                self.non_resident_len -= 1;
                self.move_to_back(Which::Stack, idx);
                self.promote(idx);
            }
            None if self.hot_len < self.hot_capacity => {
                let idx = self.insert(key, value, EntryStatus::Hot);
                self.push_back(Which::Stack, idx);
                self.hot_len += 1;
            }
            None => {
                let idx = self.insert(key, value, EntryStatus::Cold);
                self.push_back(Which::Stack, idx);
                self.push_back(Which::Queue, idx);
            }
        }
        self.resident_len += 1;
        self.trim_history();
    }

    /// Evict the front of the queue, keeping a history entry if it is still stacked
    fn evict(&mut self) -> Option<(K, V)> {
        if self.queue.head.is_none() {
            // every resident is hot
            self.demote_bottom();
        }
        let victim = self.queue.head?;
        self.unlink(Which::Queue, victim);
        self.resident_len -= 1;
        self.counters.evictions += 1;

        let in_stack = self.entries[victim].stack.is_some();
        let key = self.entries[victim].key.clone();
        let value = self.entries[victim].value.take();
        if in_stack {
            self.entries[victim].status = EntryStatus::NonResident;
            self.non_resident_len += 1;
        } else {
            self.entries.remove(victim);
            self.index.remove(&key);
        }
        trace!(in_stack, "Evicted cold entry");
        value.map(|value| (key, value))
    }

    /// Forget the oldest history entries beyond twice the capacity
    fn trim_history(&mut self) {
        let limit = self.capacity.saturating_mul(2);
        let mut cursor = self.stack.head;
        while self.non_resident_len > limit {
            let idx = match cursor {
                Some(idx) => idx,
                None => break,
            };
            cursor = self.entries[idx].stack.and_then(|link| link.next);
            if self.entries[idx].status == EntryStatus::NonResident {
                self.unlink(Which::Stack, idx);
                self.forget(idx);
            }
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        let was_bottom = self.stack.head == Some(idx);
        self.unlink(Which::Stack, idx);
        self.unlink(Which::Queue, idx);
        let entry = self.entries.remove(idx);
        match entry.status {
            EntryStatus::Hot => {
                self.hot_len -= 1;
                self.resident_len -= 1;
            }
            EntryStatus::Cold => self.resident_len -= 1,
            EntryStatus::NonResident => self.non_resident_len -= 1,
        }
        if was_bottom {
            self.prune();
        }
        entry.value
    }

    fn clear(&mut self) -> Vec<(K, V)> {
        let released = self
            .entries
            .drain()
            .filter_map(|entry| entry.value.map(|value| (entry.key, value)))
            .collect();
        self.index.clear();
        self.stack = Ring::default();
        self.queue = Ring::default();
        self.hot_len = 0;
        self.resident_len = 0;
        self.non_resident_len = 0;
        released
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        assert!(self.resident_len <= self.capacity, "over capacity");
        assert!(self.hot_len <= self.hot_capacity, "over hot budget");
        assert_eq!(self.index.len(), self.entries.len());

        let (mut hot, mut cold, mut history) = (0, 0, 0);
        for (idx, entry) in self.entries.iter() {
            assert_eq!(self.index.get(&entry.key), Some(&idx));
            match entry.status {
                EntryStatus::Hot => {
                    hot += 1;
                    assert!(entry.stack.is_some(), "hot entry off the stack");
                    assert!(entry.queue.is_none(), "hot entry in the queue");
                    assert!(entry.value.is_some());
                }
                EntryStatus::Cold => {
                    cold += 1;
                    assert!(entry.queue.is_some(), "cold entry off the queue");
                    assert!(entry.value.is_some());
                }
                EntryStatus::NonResident => {
                    history += 1;
                    assert!(entry.stack.is_some(), "history entry off the stack");
                    assert!(entry.queue.is_none(), "history entry in the queue");
                    assert!(entry.value.is_none());
                }
            }
        }
        assert_eq!(hot, self.hot_len);
        assert_eq!(hot + cold, self.resident_len);
        assert_eq!(history, self.non_resident_len);
        assert_eq!(cold, self.queue.len);
        assert!(history <= self.capacity * 2);

        for (which, ring) in [(Which::Stack, &self.stack), (Which::Queue, &self.queue)] {
            let mut walked = 0;
            let mut prev = None;
            let mut cursor = ring.head;
            while let Some(idx) = cursor {
                let entry = &self.entries[idx];
                let link = match which {
                    Which::Stack => entry.stack,
                    Which::Queue => entry.queue,
                };
                let link = link.expect("linked entry without a link");
                assert_eq!(link.prev, prev);
                prev = Some(idx);
                cursor = link.next;
                walked += 1;
            }
            assert_eq!(prev, ring.tail);
            assert_eq!(walked, ring.len);
        }
    }
}
