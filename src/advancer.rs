//! Background collaborator that drives periodic tick advancement.
//!
//! The cache core deliberately does not own a timer thread; it only
//! exposes `advance_to_now`/`advance_to_tick` and expects a façade to call
//! them (see the crate's concurrency notes). `PassiveAdvancer` is that
//! façade: a thin wrapper spawning one `std::thread` that sleeps `tick_ms`
//! between calls, stoppable and joined on `close`/`drop`.

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cache::Cache;
use crate::clock::Clock;

/// Spawns a background thread that calls `cache.advance_to_now()` every
/// `tick_ms` milliseconds until stopped.
///
/// Holds no lock of its own beyond the `Mutex` wrapping the shared cache;
/// per the crate's concurrency model, the lock lives at this façade, not
/// inside the core.
pub struct PassiveAdvancer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PassiveAdvancer {
    /// Starts the background loop. `tick_ms` should match the cache's own
    /// `tick_ms` so advancement keeps pace with scheduling.
    pub fn spawn<K, V, C, S>(cache: Arc<Mutex<Cache<K, V, C, S>>>, tick_ms: u64) -> Self
    where
        K: Eq + Hash + Clone + Send + 'static,
        V: Clone + Send + 'static,
        C: Clock + 'static,
        S: BuildHasher + Default + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let period = Duration::from_millis(tick_ms.max(1));

        let handle = thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                thread::sleep(period);
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                let mut guard = match cache.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.advance_to_now();
            }
            log::trace!("PassiveAdvancer thread stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signals the background thread to stop and joins it. Idempotent:
    /// calling `close` (or dropping) more than once is a no-op after the
    /// first join.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("PassiveAdvancer thread panicked while joining on close");
            }
        }
    }
}

impl Drop for PassiveAdvancer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::clock::FakeClock;

    #[test]
    fn test_advancer_drives_expiration_in_background() {
        let clock = Arc::new(FakeClock::new());
        let opts = CacheOptions {
            tick_ms: 5,
            ..CacheOptions::new(16)
        };
        let cache = Arc::new(Mutex::new(
            Cache::with_options(opts, clock.clone()).unwrap(),
        ));
        {
            let mut guard = cache.lock().unwrap();
            guard.set("k", 1, 20).unwrap();
        }

        let mut advancer = PassiveAdvancer::spawn(cache.clone(), 5);
        clock.advance(100);
        // Give the background thread a few sleep cycles to observe the
        // advanced clock and drain the entry.
        thread::sleep(Duration::from_millis(80));
        advancer.close();

        let mut guard = cache.lock().unwrap();
        assert_eq!(guard.get(&"k"), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let clock = Arc::new(FakeClock::new());
        let cache = Arc::new(Mutex::new(
            Cache::new(4, clock).unwrap(),
        ));
        let mut advancer = PassiveAdvancer::spawn(cache, 5);
        advancer.close();
        advancer.close();
    }
}
