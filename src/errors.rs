use std::fmt;

/// Errors raised at the boundary between the cache coordinator and its
/// three data-structure collaborators (arena, LRU list, timer wheel).
///
/// Most variants are contract violations: the coordinator is responsible
/// for never letting user input trigger them. `CapacityExhausted` is the
/// single exception: it can surface from [`crate::Cache::set`] when the
/// arena cannot grow far enough even after an LRU eviction.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CacheError {
    /// A constructor argument violated its positivity / power-of-two / range
    /// constraint (`max_entries`, `initial_cap`, `wheel_size`,
    /// `budget_per_tick`, `tick_ms`).
    InvalidArgument(String),

    /// A slot id fell outside `[0, cap)`.
    InvalidId { id: i32, message: String },

    /// `free_id` was called on a slot whose key column was already absent.
    DoubleFree { id: i32 },

    /// Arena growth could not reach the requested capacity despite
    /// `max_entries` headroom.
    CapacityExhausted { requested: usize, max_entries: usize },

    /// `schedule` was called with `expire_tick <= now_tick`.
    ScheduleInPast { id: i32, expire_tick: u64, now_tick: u64 },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidId { id, message } => {
                write!(f, "invalid slot id {id}: {message}")
            }
            Self::DoubleFree { id } => write!(f, "double free of slot id {id}"),
            Self::CapacityExhausted {
                requested,
                max_entries,
            } => write!(
                f,
                "capacity exhausted: requested {requested} slots but max_entries is {max_entries}"
            ),
            Self::ScheduleInPast {
                id,
                expire_tick,
                now_tick,
            } => write!(
                f,
                "schedule in past for slot {id}: expire_tick {expire_tick} <= now_tick {now_tick}"
            ),
        }
    }
}

impl std::error::Error for CacheError {}

/// Constructor methods for creating errors with minimal boilerplate.
impl CacheError {
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    #[must_use]
    pub fn invalid_id(id: i32, message: impl Into<String>) -> Self {
        Self::InvalidId {
            id,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn double_free(id: i32) -> Self {
        Self::DoubleFree { id }
    }

    #[must_use]
    pub fn capacity_exhausted(requested: usize, max_entries: usize) -> Self {
        Self::CapacityExhausted {
            requested,
            max_entries,
        }
    }

    #[must_use]
    pub fn schedule_in_past(id: i32, expire_tick: u64, now_tick: u64) -> Self {
        Self::ScheduleInPast {
            id,
            expire_tick,
            now_tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_id() {
        let err = CacheError::invalid_id(7, "out of range");
        assert_eq!(err.to_string(), "invalid slot id 7: out of range");
    }

    #[test]
    fn test_display_capacity_exhausted() {
        let err = CacheError::capacity_exhausted(2048, 1024);
        assert_eq!(
            err.to_string(),
            "capacity exhausted: requested 2048 slots but max_entries is 1024"
        );
    }

    #[test]
    fn test_builder_methods() {
        assert!(matches!(
            CacheError::double_free(3),
            CacheError::DoubleFree { id: 3 }
        ));
        assert!(matches!(
            CacheError::invalid_argument("bad"),
            CacheError::InvalidArgument(_)
        ));
    }
}
