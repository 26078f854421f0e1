//! Single-level hashed timer wheel with an overflow list for TTL
//! expiration, advanced in discrete ticks under a per-advance work budget.
//!
//! Buckets and the overflow list are singly-headed, doubly-linked lists
//! threaded through the arena's `wheel_next`/`wheel_prev`/`wheel_bucket`
//! columns, no list owns storage of its own, only a head pointer.

use crate::arena::{EntryArena, SlotId, BUCKET_NONE, BUCKET_OVERFLOW, NIL};
use crate::errors::CacheError;

/// A bucketed timer wheel over `wheel_size` buckets plus one overflow list.
#[derive(Debug)]
pub struct TimerWheel {
    wheel_size: usize,
    wheel_mask: u64,
    horizon_ticks: u64,
    now_tick: u64,
    budget_per_tick: usize,
    bucket_heads: Vec<SlotId>,
    overflow_head: SlotId,
    overflow_count_approx: u64,
    pending_target_tick: Option<u64>,
}

impl TimerWheel {
    /// Creates a wheel with `wheel_size` buckets (must be a power of two
    /// `>= 2`) and a positive per-advance work budget.
    pub fn new(
        wheel_size: usize,
        budget_per_tick: usize,
        now_tick: u64,
    ) -> Result<Self, CacheError> {
        if wheel_size < 2 || !wheel_size.is_power_of_two() {
            return Err(CacheError::invalid_argument(
                "wheel_size must be a power of two >= 2",
            ));
        }
        if budget_per_tick == 0 {
            return Err(CacheError::invalid_argument(
                "budget_per_tick must be positive",
            ));
        }

        log::debug!("TimerWheel created: wheel_size={wheel_size}, budget_per_tick={budget_per_tick}");

        Ok(Self {
            wheel_size,
            wheel_mask: (wheel_size - 1) as u64,
            horizon_ticks: wheel_size as u64,
            now_tick,
            budget_per_tick,
            bucket_heads: vec![NIL; wheel_size],
            overflow_head: NIL,
            overflow_count_approx: 0,
            pending_target_tick: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn now_tick(&self) -> u64 {
        self.now_tick
    }

    #[inline]
    #[must_use]
    pub fn horizon_ticks(&self) -> u64 {
        self.horizon_ticks
    }

    #[inline]
    #[must_use]
    pub fn pending_target_tick(&self) -> Option<u64> {
        self.pending_target_tick
    }

    #[inline]
    #[must_use]
    pub fn overflow_count_approx(&self) -> u64 {
        self.overflow_count_approx
    }

    /// Schedules `id` to expire at `expire_tick`. Implicitly unlinks `id`
    /// from wherever it currently lives first.
    pub fn schedule<K, V>(
        &mut self,
        arena: &mut EntryArena<K, V>,
        id: SlotId,
        expire_tick: u64,
    ) -> Result<(), CacheError> {
        if expire_tick <= self.now_tick {
            return Err(CacheError::schedule_in_past(id, expire_tick, self.now_tick));
        }
        self.unlink(arena, id);
        arena.set_expires_tick(id, expire_tick);
        if expire_tick - self.now_tick > self.horizon_ticks {
            self.link_overflow(arena, id);
        } else {
            self.link_bucket(arena, id, expire_tick);
        }
        Ok(())
    }

    /// Unlinks `id` from whichever state it is in. No-op if unscheduled.
    pub fn unlink<K, V>(&mut self, arena: &mut EntryArena<K, V>, id: SlotId) {
        match arena.wheel_bucket(id) {
            BUCKET_NONE => return,
            BUCKET_OVERFLOW => {
                self.splice(arena, id, None);
                self.overflow_count_approx = self.overflow_count_approx.saturating_sub(1);
            }
            b => self.splice(arena, id, Some(b as usize)),
        }
        let idx = id as usize;
        arena.wheel_bucket[idx] = BUCKET_NONE;
        arena.wheel_next[idx] = NIL;
        arena.wheel_prev[idx] = NIL;
    }

    /// Advances `now_tick` toward `target_tick` one tick at a time,
    /// draining overflow then processing the current bucket each step,
    /// sharing one work budget across the whole call. Returns `true` once
    /// caught up, `false` if a tick's walk was cut short by the budget
    /// (storing the effective target so a later call can finish it). Note
    /// this can happen even on the step that reaches `target_tick`, since
    /// "caught up" means the bucket at that tick was fully walked, not
    /// merely that `now_tick` arrived.
    pub fn advance_to_tick<K, V>(
        &mut self,
        arena: &mut EntryArena<K, V>,
        target_tick: u64,
        on_expire: &mut dyn FnMut(&mut EntryArena<K, V>, SlotId),
    ) -> bool {
        let effective_target = self
            .pending_target_tick
            .map_or(target_tick, |pending| target_tick.max(pending));
        let mut budget: i64 = self.budget_per_tick as i64;

        while self.now_tick < effective_target {
            self.now_tick += 1;
            let (b, overflow_incomplete) = self.drain_overflow(arena, budget, on_expire);
            budget = b;
            let (b, bucket_incomplete) = self.process_bucket(arena, budget, on_expire);
            budget = b;

            if overflow_incomplete || bucket_incomplete {
                self.pending_target_tick = Some(effective_target);
                return false;
            }
        }

        self.pending_target_tick = None;
        true
    }

    /// Walks the overflow list, bounded by `budget`, re-homing slots that
    /// entered the horizon and expiring those already due. Every examined
    /// slot costs one unit regardless of outcome. Returns the remaining
    /// budget and whether the walk was cut short with entries left.
    fn drain_overflow<K, V>(
        &mut self,
        arena: &mut EntryArena<K, V>,
        mut budget: i64,
        on_expire: &mut dyn FnMut(&mut EntryArena<K, V>, SlotId),
    ) -> (i64, bool) {
        let mut cur = self.overflow_head;
        while cur != NIL && budget > 0 {
            let next = arena.wheel_next[cur as usize];
            budget -= 1;

            let expires = arena.expires_tick(cur);
            let delta = expires.saturating_sub(self.now_tick);
            if delta <= self.horizon_ticks {
                self.unlink(arena, cur);
                if expires <= self.now_tick {
                    on_expire(arena, cur);
                } else {
                    self.link_bucket(arena, cur, expires);
                }
            }

            cur = next;
        }
        (budget, cur != NIL)
    }

    /// Walks the bucket for the current tick, bounded by `budget`,
    /// expiring due slots and relocating (guardrail) slots that wrapped
    /// around into this bucket but are not yet due. Returns the remaining
    /// budget and whether the walk was cut short with entries left.
    fn process_bucket<K, V>(
        &mut self,
        arena: &mut EntryArena<K, V>,
        mut budget: i64,
        on_expire: &mut dyn FnMut(&mut EntryArena<K, V>, SlotId),
    ) -> (i64, bool) {
        let bucket_idx = (self.now_tick & self.wheel_mask) as usize;
        let mut cur = self.bucket_heads[bucket_idx];
        while cur != NIL && budget > 0 {
            let next = arena.wheel_next[cur as usize];
            budget -= 1;

            let expires = arena.expires_tick(cur);
            if expires <= self.now_tick {
                self.unlink(arena, cur);
                on_expire(arena, cur);
            } else {
                let correct_bucket = (expires & self.wheel_mask) as usize;
                if correct_bucket != bucket_idx {
                    self.unlink(arena, cur);
                    self.link_bucket(arena, cur, expires);
                }
            }

            cur = next;
        }
        (budget, cur != NIL)
    }

    fn link_bucket<K, V>(&mut self, arena: &mut EntryArena<K, V>, id: SlotId, expire_tick: u64) {
        let bucket = (expire_tick & self.wheel_mask) as usize;
        let old_head = self.bucket_heads[bucket];
        let idx = id as usize;
        arena.wheel_prev[idx] = NIL;
        arena.wheel_next[idx] = old_head;
        if old_head != NIL {
            arena.wheel_prev[old_head as usize] = id;
        }
        self.bucket_heads[bucket] = id;
        arena.wheel_bucket[idx] = bucket as i32;
    }

    fn link_overflow<K, V>(&mut self, arena: &mut EntryArena<K, V>, id: SlotId) {
        let old_head = self.overflow_head;
        let idx = id as usize;
        arena.wheel_prev[idx] = NIL;
        arena.wheel_next[idx] = old_head;
        if old_head != NIL {
            arena.wheel_prev[old_head as usize] = id;
        }
        self.overflow_head = id;
        arena.wheel_bucket[idx] = BUCKET_OVERFLOW;
        self.overflow_count_approx += 1;
    }

    fn splice<K, V>(&mut self, arena: &mut EntryArena<K, V>, id: SlotId, bucket: Option<usize>) {
        let idx = id as usize;
        let prev = arena.wheel_prev[idx];
        let next = arena.wheel_next[idx];

        if prev != NIL {
            arena.wheel_next[prev as usize] = next;
        } else {
            match bucket {
                Some(b) => self.bucket_heads[b] = next,
                None => self.overflow_head = next,
            }
        }

        if next != NIL {
            arena.wheel_prev[next as usize] = prev;
        }
    }

    /// Clears all bucket and overflow heads and any pending partial
    /// advance. Used by [`crate::Cache::clear`] as a defensive sweep after
    /// every live slot has already been unlinked individually.
    pub fn reset(&mut self) {
        for head in &mut self.bucket_heads {
            *head = NIL;
        }
        self.overflow_head = NIL;
        self.overflow_count_approx = 0;
        self.pending_target_tick = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn arena_with_keys(max: usize, n: u64) -> (EntryArena<u64, u64>, Vec<SlotId>) {
        let mut arena = EntryArena::new(max, None).unwrap();
        let mut ids = Vec::new();
        for k in 0..n {
            let id = arena.alloc_id().unwrap();
            arena.set_entry(id, k, k).unwrap();
            ids.push(id);
        }
        (arena, ids)
    }

    #[test]
    fn test_schedule_rejects_past() {
        let mut wheel = TimerWheel::new(8, 10, 5).unwrap();
        let (mut arena, ids) = arena_with_keys(4, 1);
        assert!(matches!(
            wheel.schedule(&mut arena, ids[0], 5),
            Err(CacheError::ScheduleInPast { .. })
        ));
        assert!(matches!(
            wheel.schedule(&mut arena, ids[0], 4),
            Err(CacheError::ScheduleInPast { .. })
        ));
    }

    #[test]
    fn test_schedule_within_horizon_lands_in_bucket() {
        let mut wheel = TimerWheel::new(8, 10, 0).unwrap();
        let (mut arena, ids) = arena_with_keys(4, 1);
        wheel.schedule(&mut arena, ids[0], 3).unwrap();
        assert_eq!(arena.wheel_bucket(ids[0]), 3);
    }

    #[test]
    fn test_schedule_beyond_horizon_lands_in_overflow() {
        let mut wheel = TimerWheel::new(8, 10, 0).unwrap();
        let (mut arena, ids) = arena_with_keys(4, 1);
        wheel.schedule(&mut arena, ids[0], 9).unwrap();
        assert_eq!(arena.wheel_bucket(ids[0]), BUCKET_OVERFLOW);
        assert_eq!(wheel.overflow_count_approx(), 1);
    }

    #[test]
    fn test_overflow_wraparound_expires_eventually() {
        // wheel_size=8, schedule 100 ticks out (far beyond horizon).
        let mut wheel = TimerWheel::new(8, 1000, 0).unwrap();
        let (mut arena, ids) = arena_with_keys(4, 1);
        wheel.schedule(&mut arena, ids[0], 100).unwrap();

        let mut expired = Vec::new();
        let done = wheel.advance_to_tick(&mut arena, 99, &mut |_arena, id| expired.push(id));
        assert!(done);
        assert!(expired.is_empty(), "must not expire before its tick");

        let done = wheel.advance_to_tick(&mut arena, 100, &mut |_arena, id| expired.push(id));
        assert!(done);
        assert_eq!(expired, vec![ids[0]]);
    }

    #[test]
    fn test_budget_partitions_advance_across_calls() {
        // 10 entries all expiring at tick 5, budget 5 per call -> needs two
        // calls to finish draining that bucket, then a third call carries
        // the guardrail relocation after one full wrap (tick 5 + wheel_size).
        let mut wheel = TimerWheel::new(8, 5, 0).unwrap();
        let (mut arena, ids) = arena_with_keys(16, 10);
        for &id in &ids {
            wheel.schedule(&mut arena, id, 5).unwrap();
        }

        let mut expired = Vec::new();
        let done = wheel.advance_to_tick(&mut arena, 5, &mut |_arena, id| expired.push(id));
        assert!(!done, "budget of 5 should not drain all 10 in one call");
        assert_eq!(expired.len(), 5);

        expired.clear();
        let done = wheel.advance_to_tick(&mut arena, 5, &mut |_arena, id| expired.push(id));
        assert!(done, "second call to the same target must report done");
        assert!(expired.is_empty(), "bucket is still holding the other 5");

        expired.clear();
        let done = wheel.advance_to_tick(&mut arena, 13, &mut |_arena, id| expired.push(id));
        assert!(done);
        assert_eq!(expired.len(), 5, "remaining 5 expire via the guardrail pass");
    }

    #[test]
    fn test_unlink_is_idempotent_noop_when_unscheduled() {
        let mut wheel = TimerWheel::new(8, 10, 0).unwrap();
        let (mut arena, ids) = arena_with_keys(4, 1);
        wheel.unlink(&mut arena, ids[0]);
        assert_eq!(arena.wheel_bucket(ids[0]), BUCKET_NONE);
    }

    #[test]
    fn test_reschedule_moves_between_bucket_and_overflow() {
        let mut wheel = TimerWheel::new(8, 10, 0).unwrap();
        let (mut arena, ids) = arena_with_keys(4, 1);
        wheel.schedule(&mut arena, ids[0], 20).unwrap();
        assert_eq!(arena.wheel_bucket(ids[0]), BUCKET_OVERFLOW);
        wheel.schedule(&mut arena, ids[0], 2).unwrap();
        assert_eq!(arena.wheel_bucket(ids[0]), 2);
        assert_eq!(wheel.overflow_count_approx(), 0);
    }

    #[test]
    fn test_large_random_schedule_and_advance_soak() {
        let mut rng = rand::rng();
        let n = 5_000u64;
        let mut wheel = TimerWheel::new(64, 10_000, 0).unwrap();
        let (mut arena, ids) = arena_with_keys(n as usize, n);
        for &id in &ids {
            let expire = rng.random_range(1..2_000u64);
            wheel.schedule(&mut arena, id, expire).unwrap();
        }

        let mut total_expired = 0usize;
        let mut target = 0u64;
        while total_expired < ids.len() {
            target += 50;
            loop {
                let mut expired = Vec::new();
                let done = wheel.advance_to_tick(&mut arena, target, &mut |_a, id| {
                    expired.push(id)
                });
                total_expired += expired.len();
                if done {
                    break;
                }
            }
            if target > 10_000 {
                break;
            }
        }
        assert_eq!(total_expired, ids.len());
    }
}
