//! In-memory snapshot of the priority levels.
//!
//! Priority levels are ten rows that almost never change, but every todo view
//! and the UI legend read them. The snapshot is swapped atomically so readers
//! never take the database lock on a hit.

use crate::types::PriorityLevel;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_PRIORITY_TTL: Duration = Duration::from_secs(300);

struct Snapshot {
    levels: Arc<Vec<PriorityLevel>>,
    loaded_at: Instant,
}

pub struct PriorityCache {
    snapshot: ArcSwapOption<Snapshot>,
    ttl: Duration,
}

impl PriorityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            snapshot: ArcSwapOption::empty(),
            ttl,
        }
    }

    /// Cached levels if present and not expired.
    pub fn get(&self) -> Option<Arc<Vec<PriorityLevel>>> {
        let guard = self.snapshot.load();
        guard
            .as_ref()
            .filter(|s| s.loaded_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.levels))
    }

    pub fn store(&self, levels: Vec<PriorityLevel>) -> Arc<Vec<PriorityLevel>> {
        let levels = Arc::new(levels);
        self.snapshot.store(Some(Arc::new(Snapshot {
            levels: Arc::clone(&levels),
            loaded_at: Instant::now(),
        })));
        levels
    }

    pub fn invalidate(&self) {
        self.snapshot.store(None);
    }

    /// Return cached levels or load them with `fetch` and cache the result.
    pub fn get_or_fetch<F, E>(&self, fetch: F) -> Result<Arc<Vec<PriorityLevel>>, E>
    where
        F: FnOnce() -> Result<Vec<PriorityLevel>, E>,
    {
        if let Some(levels) = self.get() {
            return Ok(levels);
        }
        Ok(self.store(fetch()?))
    }
}

impl Default for PriorityCache {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(n: i32) -> PriorityLevel {
        PriorityLevel {
            level: n,
            name: format!("L{}", n),
            color: None,
        }
    }

    #[test]
    fn fetches_once_until_invalidated() {
        let cache = PriorityCache::default();
        let mut calls = 0;

        for _ in 0..3 {
            let levels = cache
                .get_or_fetch(|| {
                    calls += 1;
                    Ok::<_, ()>(vec![level(1)])
                })
                .unwrap();
            assert_eq!(levels.len(), 1);
        }
        assert_eq!(calls, 1);

        cache.invalidate();
        assert!(cache.get().is_none());
        cache
            .get_or_fetch(|| {
                calls += 1;
                Ok::<_, ()>(vec![level(1), level(2)])
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(cache.get().unwrap().len(), 2);
    }

    #[test]
    fn zero_ttl_never_serves_stale_data() {
        let cache = PriorityCache::new(Duration::ZERO);
        cache.store(vec![level(1)]);
        assert!(cache.get().is_none());
    }

    #[test]
    fn fetch_errors_are_not_cached() {
        let cache = PriorityCache::default();
        let result = cache.get_or_fetch(|| Err::<Vec<PriorityLevel>, _>("boom"));
        assert_eq!(result.unwrap_err(), "boom");
        assert!(cache.get().is_none());
    }
}
