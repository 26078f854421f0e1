//! Entry arena: a growable, structure-of-arrays pool of numeric slot ids.
//!
//! Every column is a flat `Vec` indexed by slot id. Liveness is defined
//! solely by the `key` column: a slot is live iff its key is `Some`.
//! Growth doubles capacity (clamped to `max_entries`) and copies every
//! column's prefix, leaving the suffix in the neutral state so freshly
//! grown slots look exactly like freshly constructed ones.

use crate::errors::CacheError;

/// Sentinel meaning "no slot" wherever a slot id is expected.
pub const NIL: i32 = -1;
/// `wheel_bucket` value meaning "not linked into the wheel at all".
pub const BUCKET_NONE: i32 = -1;
/// `wheel_bucket` value meaning "linked into the overflow list".
pub const BUCKET_OVERFLOW: i32 = -2;

/// A single numeric slot id into [`EntryArena`]'s columns.
pub type SlotId = i32;

/// Structure-of-arrays storage for cache entries plus the intrusive link
/// columns shared by the LRU list and the timer wheel.
#[derive(Debug)]
pub struct EntryArena<K, V> {
    key: Vec<Option<K>>,
    value: Vec<Option<V>>,
    expires_tick: Vec<u64>,
    ttl_ms: Vec<u64>,
    pub(crate) wheel_next: Vec<i32>,
    pub(crate) wheel_prev: Vec<i32>,
    pub(crate) wheel_bucket: Vec<i32>,
    pub(crate) lru_next: Vec<i32>,
    pub(crate) lru_prev: Vec<i32>,

    max_entries: usize,
    cap: usize,
    size_allocated: usize,
    free_list: Vec<SlotId>,
}

impl<K, V> EntryArena<K, V> {
    /// Creates an arena with the given hard cap and initial column length.
    ///
    /// `initial_cap` defaults to `min(1024, max_entries)` when `None`.
    pub fn new(max_entries: usize, initial_cap: Option<usize>) -> Result<Self, CacheError> {
        if max_entries == 0 {
            return Err(CacheError::invalid_argument(
                "max_entries must be positive",
            ));
        }
        let initial_cap = initial_cap.unwrap_or_else(|| max_entries.min(1024));
        if initial_cap == 0 || initial_cap > max_entries {
            return Err(CacheError::invalid_argument(
                "initial_cap must be positive and at most max_entries",
            ));
        }

        log::debug!(
            "EntryArena created: max_entries={max_entries}, initial_cap={initial_cap}"
        );

        Ok(Self {
            key: (0..initial_cap).map(|_| None).collect(),
            value: (0..initial_cap).map(|_| None).collect(),
            expires_tick: vec![0; initial_cap],
            ttl_ms: vec![0; initial_cap],
            wheel_next: vec![NIL; initial_cap],
            wheel_prev: vec![NIL; initial_cap],
            wheel_bucket: vec![BUCKET_NONE; initial_cap],
            lru_next: vec![NIL; initial_cap],
            lru_prev: vec![NIL; initial_cap],
            max_entries,
            cap: initial_cap,
            size_allocated: 0,
            free_list: Vec::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    #[inline]
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    #[inline]
    #[must_use]
    pub fn size_allocated(&self) -> usize {
        self.size_allocated
    }

    /// Returns whether `id` currently holds a key (the sole liveness test).
    #[inline]
    #[must_use]
    pub fn is_live(&self, id: SlotId) -> bool {
        id >= 0 && (id as usize) < self.cap && self.key[id as usize].is_some()
    }

    fn check_id(&self, id: SlotId) -> Result<usize, CacheError> {
        if id < 0 || (id as usize) >= self.cap {
            return Err(CacheError::invalid_id(
                id,
                format!("must be in [0, {})", self.cap),
            ));
        }
        Ok(id as usize)
    }

    /// Allocates a slot id, reusing the free list (LIFO) before growing.
    ///
    /// Returns `Ok(NIL)` when `max_entries` is reached with an empty free
    /// list. Returns `Err(CapacityExhausted)` only if doubling the column
    /// length could not make progress, which indicates a bug since
    /// `max_entries` headroom is checked before growing.
    pub fn alloc_id(&mut self) -> Result<SlotId, CacheError> {
        if let Some(id) = self.free_list.pop() {
            self.reset_slot(id);
            return Ok(id);
        }

        if self.size_allocated >= self.max_entries {
            return Ok(NIL);
        }

        let id = self.size_allocated as SlotId;
        self.size_allocated += 1;
        if (id as usize) >= self.cap {
            self.grow(id as usize + 1)?;
        }
        self.reset_slot(id);
        Ok(id)
    }

    /// Writes the key/value columns for a live (or about-to-be-live) slot.
    pub fn set_entry(&mut self, id: SlotId, key: K, value: V) -> Result<(), CacheError> {
        let idx = self.check_id(id)?;
        self.key[idx] = Some(key);
        self.value[idx] = Some(value);
        Ok(())
    }

    #[inline]
    pub fn key(&self, id: SlotId) -> Option<&K> {
        self.key.get(id as usize).and_then(|k| k.as_ref())
    }

    #[inline]
    pub fn value(&self, id: SlotId) -> Option<&V> {
        self.value.get(id as usize).and_then(|v| v.as_ref())
    }

    #[inline]
    pub fn value_mut(&mut self, id: SlotId) -> Option<&mut V> {
        self.value.get_mut(id as usize).and_then(|v| v.as_mut())
    }

    #[inline]
    pub fn set_value(&mut self, id: SlotId, value: V) {
        if let Some(slot) = self.value.get_mut(id as usize) {
            *slot = Some(value);
        }
    }

    #[inline]
    #[must_use]
    pub fn expires_tick(&self, id: SlotId) -> u64 {
        self.expires_tick.get(id as usize).copied().unwrap_or(0)
    }

    #[inline]
    pub(crate) fn set_expires_tick(&mut self, id: SlotId, tick: u64) {
        if let Some(slot) = self.expires_tick.get_mut(id as usize) {
            *slot = tick;
        }
    }

    #[inline]
    #[must_use]
    pub fn ttl_ms(&self, id: SlotId) -> u64 {
        self.ttl_ms.get(id as usize).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set_ttl_ms(&mut self, id: SlotId, ttl_ms: u64) {
        if let Some(slot) = self.ttl_ms.get_mut(id as usize) {
            *slot = ttl_ms;
        }
    }

    #[inline]
    #[must_use]
    pub fn wheel_bucket(&self, id: SlotId) -> i32 {
        self.wheel_bucket
            .get(id as usize)
            .copied()
            .unwrap_or(BUCKET_NONE)
    }

    /// Resets a slot's seven column families to the neutral state: absent
    /// key/value, zeroed ttl columns, `NIL` links, `BUCKET_NONE` bucket.
    fn reset_slot(&mut self, id: SlotId) {
        let idx = id as usize;
        self.key[idx] = None;
        self.value[idx] = None;
        self.expires_tick[idx] = 0;
        self.ttl_ms[idx] = 0;
        self.wheel_next[idx] = NIL;
        self.wheel_prev[idx] = NIL;
        self.wheel_bucket[idx] = BUCKET_NONE;
        self.lru_next[idx] = NIL;
        self.lru_prev[idx] = NIL;
    }

    /// Frees a live slot, returning its key/value, and pushes the id onto
    /// the free list.
    ///
    /// Callers must already have unlinked `id` from the LRU list and the
    /// timer wheel; this only tears down the key/value/ttl columns.
    pub fn free_id(&mut self, id: SlotId) -> Result<(K, V), CacheError> {
        let idx = self.check_id(id)?;
        let key = self.key[idx].take().ok_or(CacheError::DoubleFree { id })?;
        let value = self
            .value[idx]
            .take()
            .expect("invariant: value column present whenever key column is present");

        self.expires_tick[idx] = 0;
        self.ttl_ms[idx] = 0;
        self.wheel_next[idx] = NIL;
        self.wheel_prev[idx] = NIL;
        self.wheel_bucket[idx] = BUCKET_NONE;
        self.lru_next[idx] = NIL;
        self.lru_prev[idx] = NIL;
        self.free_list.push(id);
        Ok((key, value))
    }

    /// Doubles column length until it reaches `required`, clamped to
    /// `max_entries`. Preserves every live slot's id and column contents.
    fn grow(&mut self, required: usize) -> Result<(), CacheError> {
        let mut new_cap = self.cap;
        while new_cap < required {
            let doubled = new_cap.saturating_mul(2).min(self.max_entries);
            if doubled <= new_cap {
                return Err(CacheError::capacity_exhausted(required, self.max_entries));
            }
            new_cap = doubled;
        }

        log::debug!("EntryArena growing from {} to {new_cap}", self.cap);

        self.key.resize_with(new_cap, || None);
        self.value.resize_with(new_cap, || None);
        self.expires_tick.resize(new_cap, 0);
        self.ttl_ms.resize(new_cap, 0);
        self.wheel_next.resize(new_cap, NIL);
        self.wheel_prev.resize(new_cap, NIL);
        self.wheel_bucket.resize(new_cap, BUCKET_NONE);
        self.lru_next.resize(new_cap, NIL);
        self.lru_prev.resize(new_cap, NIL);
        self.cap = new_cap;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_reuses_free_list_lifo() {
        let mut arena: EntryArena<u64, u64> = EntryArena::new(16, Some(4)).unwrap();
        let a = arena.alloc_id().unwrap();
        let b = arena.alloc_id().unwrap();
        let c = arena.alloc_id().unwrap();
        arena.set_entry(a, 1, 10).unwrap();
        arena.set_entry(b, 2, 20).unwrap();
        arena.set_entry(c, 3, 30).unwrap();

        arena.free_id(b).unwrap();
        let reused = arena.alloc_id().unwrap();
        assert_eq!(reused, b, "arena did not reuse the freed slot");
        assert!(!arena.is_live(reused));
    }

    #[test]
    fn test_double_free_errors() {
        let mut arena: EntryArena<u64, u64> = EntryArena::new(4, None).unwrap();
        let a = arena.alloc_id().unwrap();
        arena.set_entry(a, 1, 1).unwrap();
        arena.free_id(a).unwrap();
        assert!(matches!(
            arena.free_id(a),
            Err(CacheError::DoubleFree { id }) if id == a
        ));
    }

    #[test]
    fn test_invalid_id_out_of_range() {
        let mut arena: EntryArena<u64, u64> = EntryArena::new(4, None).unwrap();
        assert!(matches!(
            arena.set_entry(99, 1, 1),
            Err(CacheError::InvalidId { .. })
        ));
        assert!(matches!(
            arena.free_id(-1),
            Err(CacheError::InvalidId { .. })
        ));
    }

    #[test]
    fn test_growth_preserves_live_slots() {
        let mut arena: EntryArena<u64, u64> = EntryArena::new(64, Some(2)).unwrap();
        let mut ids = Vec::new();
        for i in 0..10u64 {
            let id = arena.alloc_id().unwrap();
            arena.set_entry(id, i, i * 10).unwrap();
            ids.push(id);
        }
        assert!(arena.cap() >= 10);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(arena.key(*id), Some(&(i as u64)));
            assert_eq!(arena.value(*id), Some(&(i as u64 * 10)));
        }
    }

    #[test]
    fn test_alloc_exhausted_returns_nil() {
        let mut arena: EntryArena<u64, u64> = EntryArena::new(2, None).unwrap();
        let a = arena.alloc_id().unwrap();
        let b = arena.alloc_id().unwrap();
        arena.set_entry(a, 1, 1).unwrap();
        arena.set_entry(b, 2, 2).unwrap();
        assert_eq!(arena.alloc_id().unwrap(), NIL);
    }

    #[test]
    fn test_free_list_no_duplicates_after_lifecycle() {
        let mut arena: EntryArena<u64, u64> = EntryArena::new(8, None).unwrap();
        let ids: Vec<_> = (0..8)
            .map(|i| {
                let id = arena.alloc_id().unwrap();
                arena.set_entry(id, i, i).unwrap();
                id
            })
            .collect();
        for id in &ids[..4] {
            arena.free_id(*id).unwrap();
        }
        assert_eq!(arena.free_count(), 4);
        for i in 4..8 {
            let reused = arena.alloc_id().unwrap();
            assert!(ids[..4].contains(&reused) || i >= 8);
        }
        assert_eq!(arena.free_count(), 0);
    }
}
