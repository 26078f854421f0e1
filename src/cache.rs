//! Cache coordinator: maps user keys to arena slot ids and orchestrates the
//! arena, LRU list, and timer wheel across `set`/`get`/`has`/`delete`/`clear`.
//!
//! `Cache` is not thread-safe. Users must wrap it in a `Mutex` or `RwLock`
//! when sharing across threads, see the crate's concurrency notes.

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, RandomState};

use crate::arena::{EntryArena, SlotId, NIL};
use crate::clock::Clock;
use crate::errors::CacheError;
use crate::lru::LruList;
use crate::wheel::TimerWheel;

/// Why an entry was removed from the cache, reported to the disposal
/// callback exactly once per removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// The entry's TTL elapsed, discovered either by the periodic advancer
    /// or by a defensive check on `get`/`has`.
    Ttl,
    /// The entry was the LRU list's tail when capacity forced an eviction.
    Lru,
    /// `delete` was called explicitly.
    Delete,
    /// `clear` removed every live entry.
    Clear,
}

/// Point-in-time counters exposed via [`Cache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub ttl_expirations: u64,
    pub lru_evictions: u64,
    pub explicit_deletes: u64,
}

/// Constructor options for [`Cache::with_options`].
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    pub max_entries: usize,
    pub tick_ms: u64,
    pub wheel_size: usize,
    pub budget_per_tick: usize,
    pub update_ttl_on_get: bool,
    pub passive_expiration: bool,
    pub initial_cap: Option<usize>,
}

impl CacheOptions {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            tick_ms: 50,
            wheel_size: 4096,
            budget_per_tick: 200_000,
            update_ttl_on_get: false,
            passive_expiration: true,
            initial_cap: None,
        }
    }
}

/// A bounded in-process key/value cache combining TTL expiration (timer
/// wheel) with LRU capacity eviction, sharing one entry arena.
///
/// Not `Sync`: every public method takes `&mut self`, and the type holds no
/// internal synchronization. Share across threads behind a `Mutex`.
pub struct Cache<K, V, C, S = RandomState> {
    arena: EntryArena<K, V>,
    lru: LruList,
    wheel: TimerWheel,
    index: HashMap<K, SlotId, S>,
    clock: C,
    tick_ms: u64,
    update_ttl_on_get: bool,
    passive_expiration: bool,
    disposer: Option<Box<dyn FnMut(K, V, RemovalReason) + Send>>,
    stats: CacheStats,
}

impl<K, V, C> Cache<K, V, C, RandomState>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    /// Creates a cache with default options (`tick_ms=50`, `wheel_size=4096`,
    /// `budget_per_tick=200_000`, sliding expiration off, passive expiration
    /// on) and the given time source.
    pub fn new(max_entries: usize, clock: C) -> Result<Self, CacheError> {
        Self::with_options(CacheOptions::new(max_entries), clock)
    }
}

impl<K, V, C, S> Cache<K, V, C, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
    S: BuildHasher + Default,
{
    /// Creates a cache from explicit [`CacheOptions`] and a hasher.
    pub fn with_options(opts: CacheOptions, clock: C) -> Result<Self, CacheError> {
        if opts.tick_ms == 0 {
            return Err(CacheError::invalid_argument("tick_ms must be positive"));
        }
        let now_tick = clock.now_ms() / opts.tick_ms;

        log::debug!(
            "Cache created: max_entries={}, tick_ms={}, wheel_size={}",
            opts.max_entries,
            opts.tick_ms,
            opts.wheel_size
        );

        Ok(Self {
            arena: EntryArena::new(opts.max_entries, opts.initial_cap)?,
            lru: LruList::new(),
            wheel: TimerWheel::new(opts.wheel_size, opts.budget_per_tick, now_tick)?,
            index: HashMap::with_hasher(S::default()),
            clock,
            tick_ms: opts.tick_ms,
            update_ttl_on_get: opts.update_ttl_on_get,
            passive_expiration: opts.passive_expiration,
            disposer: None,
            stats: CacheStats::default(),
        })
    }

    /// Installs a disposal callback, invoked synchronously exactly once per
    /// removal with `(key, value, reason)`, before the slot returns to the
    /// free list.
    pub fn set_disposer(&mut self, disposer: impl FnMut(K, V, RemovalReason) + Send + 'static) {
        self.disposer = Some(Box::new(disposer));
    }

    #[inline]
    fn now_tick(&self) -> u64 {
        self.clock.now_ms() / self.tick_ms
    }

    /// Converts a millisecond TTL into a tick delta, clamped to at least one
    /// tick: a delta that rounds to zero still schedules at `now_tick + 1`
    /// instead of being rejected.
    #[inline]
    fn ttl_to_tick(&self, ttl_ms: u64, now_tick: u64) -> u64 {
        now_tick + (ttl_ms / self.tick_ms).max(1)
    }

    /// Drives the timer wheel to the current time if passive expiration is
    /// disabled (callers are then responsible for triggering advancement
    /// themselves on every operation).
    fn maybe_advance(&mut self) {
        if !self.passive_expiration {
            self.advance_to_now();
        }
    }

    /// Advances the timer wheel to `clock.now_ms()`, expiring entries whose
    /// TTL has elapsed along the way. Returns whether the wheel fully caught
    /// up (see [`TimerWheel::advance_to_tick`] for the budget-bounded
    /// contract).
    pub fn advance_to_now(&mut self) -> bool {
        let target = self.now_tick();
        self.advance_to_tick(target)
    }

    /// Advances the timer wheel to `target_tick`, expiring entries along the
    /// way. Exposed directly so tests and a custom advancer can drive the
    /// wheel without going through the clock.
    ///
    /// Each expiration emitted by the wheel is fully unwound here: reported
    /// to the disposer, dropped from the key index, unlinked from LRU, and
    /// freed, the same work `expire_and_remove` does for the other removal
    /// paths, inlined because the wheel's callback only has arena access.
    pub fn advance_to_tick(&mut self, target_tick: u64) -> bool {
        let Self {
            arena,
            wheel,
            lru,
            index,
            disposer,
            stats,
            ..
        } = self;

        wheel.advance_to_tick(arena, target_tick, &mut |arena, id| {
            if let (Some(key), Some(value)) = (arena.key(id).cloned(), arena.value(id).cloned()) {
                if let Some(disposer) = disposer.as_mut() {
                    disposer(key.clone(), value, RemovalReason::Ttl);
                }
                index.remove(&key);
            }
            stats.ttl_expirations += 1;
            lru.unlink(arena, id);
            arena.free_id(id).expect("invariant: wheel-expired slot must still be live");
        })
    }

    /// Returns the current number of live entries.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// Returns a snapshot of the cache's counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.size(),
            ..self.stats
        }
    }

    /// Inserts or overwrites `key` with `value` and a TTL in milliseconds.
    /// A zero `ttl_ms` silently no-ops, leaving the cache unmodified.
    pub fn set(&mut self, key: K, value: V, ttl_ms: u64) -> Result<(), CacheError> {
        if ttl_ms == 0 {
            return Ok(());
        }
        self.maybe_advance();
        let now_tick = self.now_tick();
        let expire_at = self.ttl_to_tick(ttl_ms, now_tick);

        if let Some(&id) = self.index.get(&key) {
            self.arena.set_value(id, value);
            self.arena.set_ttl_ms(id, ttl_ms);
            self.wheel
                .schedule(&mut self.arena, id, expire_at)
                .expect("invariant: coordinator always schedules strictly in the future");
            self.lru.touch(&mut self.arena, id);
            self.stats.inserts += 1;
            return Ok(());
        }

        while self.index.len() >= self.arena.max_entries() {
            self.evict_lru_tail()
                .expect("invariant: LRU list must have a tail when index is at capacity");
        }

        let id = self.arena.alloc_id()?;
        if id == NIL {
            return Err(CacheError::capacity_exhausted(
                self.arena.max_entries() + 1,
                self.arena.max_entries(),
            ));
        }

        self.arena.set_entry(id, key.clone(), value)?;
        self.arena.set_ttl_ms(id, ttl_ms);
        self.index.insert(key, id);
        self.wheel
            .schedule(&mut self.arena, id, expire_at)
            .expect("invariant: coordinator always schedules strictly in the future");
        self.lru.link_head(&mut self.arena, id);
        self.stats.inserts += 1;
        Ok(())
    }

    /// Looks up `key`. Performs a defensive expiration check first: an entry
    /// whose `expires_tick` has already passed is removed and reported
    /// absent even if the wheel has not yet advanced past it. Touches the
    /// LRU list on a hit, and under `update_ttl_on_get` reschedules the
    /// entry's expiry from now.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.maybe_advance();
        let id = match self.index.get(key) {
            Some(&id) => id,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        let now_tick = self.now_tick();

        if self.arena.expires_tick(id) <= now_tick {
            self.expire_and_remove(id, RemovalReason::Ttl);
            self.stats.misses += 1;
            return None;
        }

        self.lru.touch(&mut self.arena, id);

        if self.update_ttl_on_get {
            let ttl_ms = self.arena.ttl_ms(id);
            if ttl_ms > 0 {
                let expire_at = self.ttl_to_tick(ttl_ms, now_tick);
                self.wheel
                    .schedule(&mut self.arena, id, expire_at)
                    .expect("invariant: coordinator always schedules strictly in the future");
            }
        }

        self.stats.hits += 1;
        self.arena.value(id).cloned()
    }

    /// Reports whether `key` is present, applying the same defensive
    /// expiration check as `get` but never touching LRU order or TTL.
    pub fn has(&mut self, key: &K) -> bool {
        self.maybe_advance();
        let Some(&id) = self.index.get(key) else {
            return false;
        };
        let now_tick = self.now_tick();
        if self.arena.expires_tick(id) <= now_tick {
            self.expire_and_remove(id, RemovalReason::Ttl);
            return false;
        }
        true
    }

    /// Removes `key` if present, returning whether it was found.
    pub fn delete(&mut self, key: &K) -> bool {
        let Some(&id) = self.index.get(key) else {
            return false;
        };
        self.expire_and_remove(id, RemovalReason::Delete);
        true
    }

    /// Removes every live entry, reporting each one to the disposal
    /// callback with reason `Clear`. Idempotent: a second call finds
    /// nothing live and reports nothing.
    pub fn clear(&mut self) {
        let ids: Vec<SlotId> = self.index.values().copied().collect();
        for id in ids {
            let key = self.arena.key(id).cloned();
            let value = self.arena.value(id).cloned();
            if let (Some(key), Some(value)) = (key, value) {
                if let Some(disposer) = self.disposer.as_mut() {
                    disposer(key, value, RemovalReason::Clear);
                }
            }
            self.wheel.unlink(&mut self.arena, id);
            self.arena
                .free_id(id)
                .expect("invariant: cleared slot must still be live");
        }
        self.lru.reset();
        self.wheel.reset();
        self.index.clear();
        log::debug!("Cache cleared");
    }

    /// Evicts the LRU list's tail entry with reason `Lru`. Returns `Err` if
    /// the list was empty, which would indicate a corrupted invariant given
    /// the caller already checked `index.len() >= max_entries`.
    fn evict_lru_tail(&mut self) -> Result<(), CacheError> {
        let tail = self.lru.tail();
        if tail == NIL {
            return Err(CacheError::invalid_id(tail, "LRU list has no tail to evict"));
        }
        self.stats.lru_evictions += 1;
        self.expire_and_remove(tail, RemovalReason::Lru);
        Ok(())
    }

    /// The removal path shared by `delete`, defensive TTL expiry on
    /// `get`/`has`, and LRU eviction: reads key/value, reports to the
    /// disposer, drops the key from the index, unlinks from the wheel and
    /// LRU, frees the slot. (The wheel-driven path in `advance_to_tick`
    /// inlines the same steps since the wheel's callback only has arena
    /// access, not the coordinator's other fields.)
    fn expire_and_remove(&mut self, id: SlotId, reason: RemovalReason) {
        let key = self.arena.key(id).cloned();
        let value = self.arena.value(id).cloned();

        if let (Some(key), Some(value)) = (key, value) {
            if let Some(disposer) = self.disposer.as_mut() {
                disposer(key.clone(), value, reason);
            }
            self.index.remove(&key);
        }

        match reason {
            RemovalReason::Delete => self.stats.explicit_deletes += 1,
            RemovalReason::Ttl => self.stats.ttl_expirations += 1,
            RemovalReason::Lru | RemovalReason::Clear => {}
        }

        self.wheel.unlink(&mut self.arena, id);
        self.lru.unlink(&mut self.arena, id);
        self.arena
            .free_id(id)
            .expect("invariant: removed slot must still be live");
    }
}
