//! A bounded in-process key/value cache combining a single-level hashed
//! timer wheel (TTL expiration, with an overflow list for far-future
//! entries) with a doubly-linked LRU list (capacity-bound eviction), both
//! woven through one arena-allocated, structure-of-arrays entry pool.
//!
//! # Thread safety
//!
//! [`Cache`] is not thread-safe. Users must wrap it in a `Mutex` or
//! `RwLock` when sharing across threads; see [`advancer::PassiveAdvancer`]
//! for the pattern this crate uses to drive background expiration without
//! the core itself doing any internal locking.
//!
//! # Example
//!
//! ```
//! use wheelru_cache::{Cache, clock::MonotonicClock};
//!
//! let mut cache: Cache<&str, i32, MonotonicClock> =
//!     Cache::new(1024, MonotonicClock::new()).unwrap();
//! cache.set("a", 1, 10_000).unwrap();
//! assert_eq!(cache.get(&"a"), Some(1));
//! ```

pub mod advancer;
pub mod arena;
pub mod cache;
pub mod clock;
pub mod errors;
pub mod lru;
pub mod wheel;

pub use advancer::PassiveAdvancer;
pub use cache::{Cache, CacheOptions, CacheStats, RemovalReason};
pub use clock::Clock;
pub use errors::CacheError;
