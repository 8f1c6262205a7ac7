//! At-most-once memoization of map distances.
//!
//! Entries are keyed by the strategy key and the unordered pair of object
//! ids, normalised so that the smaller id comes first. Each entry is a
//! once-cell behind an `Arc`: the map's shard lock is held only long enough to
//! fetch or insert the cell, and the strategy runs under the cell's own
//! initialisation lock. A second thread asking for the same pair blocks on
//! that cell until the first publishes, then reads the same value.
//!
//! A failed computation leaves the cell empty and returns the error to the
//! thread that ran it; the next request recomputes.
//!
//! `d(a, a) = 0` is answered without touching the map. Entries are never
//! evicted.

use super::{MapDistanceStrategy, StrategyKey};
use crate::error::{Error, Result};
use crate::object::{ClusterObject, ObjectId};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type PairKey = (StrategyKey, ObjectId, ObjectId);

/// Thread-safe memoized `distance(strategy, a, b)`.
#[derive(Debug, Default)]
pub struct DistanceCache {
    entries: DashMap<PairKey, Arc<OnceCell<f64>>>,
    computed: AtomicUsize,
}

fn pair_key(strategy: StrategyKey, a: ObjectId, b: ObjectId) -> PairKey {
    if a <= b {
        (strategy, a, b)
    } else {
        (strategy, b, a)
    }
}

impl DistanceCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Distance between `a` and `b` under `strategy`, computing it on first
    /// request.
    ///
    /// The strategy always sees the pair in id order, so the cached value is
    /// symmetric even if the strategy's arithmetic is not.
    pub fn distance<S>(&self, strategy: &S, a: &ClusterObject, b: &ClusterObject) -> Result<f64>
    where
        S: MapDistanceStrategy + ?Sized,
    {
        if a.id() == b.id() {
            return Ok(0.0);
        }
        let (lo, hi) = if a.id() < b.id() { (a, b) } else { (b, a) };
        let key = pair_key(strategy.key(), lo.id(), hi.id());
        let cell = self.entries.entry(key).or_default().clone();

        cell.get_or_try_init(|| {
            let d = strategy.distance(lo, hi)?;
            if !(d.is_finite() && d >= 0.0) {
                return Err(Error::Other(format!(
                    "{} distance between maps {} and {} is {d}",
                    strategy.key().name(),
                    lo.id(),
                    hi.id()
                )));
            }
            self.computed.fetch_add(1, Ordering::Relaxed);
            Ok(d)
        })
        .copied()
    }

    /// Cached distance, without computing.
    pub fn get(&self, strategy: StrategyKey, a: ObjectId, b: ObjectId) -> Option<f64> {
        if a == b {
            return Some(0.0);
        }
        self.entries
            .get(&pair_key(strategy, a, b))
            .and_then(|cell| cell.get().copied())
    }

    /// Number of entries (including any currently being computed).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pair has been requested yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times a strategy has successfully been invoked.
    pub fn computed(&self) -> usize {
        self.computed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectId;
    use proptest::prelude::*;
    use std::sync::Barrier;

    /// |mean(a) - mean(b)|, counting invocations per ordered pair.
    struct Counting {
        calls: AtomicUsize,
        fail_on: Option<(u64, u64)>,
    }

    impl Counting {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }
    }

    impl MapDistanceStrategy for Counting {
        fn key(&self) -> StrategyKey {
            StrategyKey::new("counting", 0)
        }

        fn distance(&self, a: &ClusterObject, b: &ClusterObject) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Widen the race window.
            std::thread::sleep(std::time::Duration::from_millis(1));
            if self.fail_on == Some((a.id().0, b.id().0)) {
                return Err(Error::Surface {
                    message: "malformed surface".into(),
                });
            }
            let mean =
                |o: &ClusterObject| o.densities().iter().sum::<f64>() / o.densities().len() as f64;
            Ok((mean(a) - mean(b)).abs())
        }
    }

    fn objects(n: u64) -> Vec<ClusterObject> {
        (0..n)
            .map(|i| ClusterObject::from_densities(ObjectId(i), vec![i as f64, (i * i) as f64]))
            .collect()
    }

    #[test]
    fn test_at_most_once_under_contention() {
        let strategy = Counting::new();
        let cache = DistanceCache::new();
        let objs = objects(10);
        let threads = 12;
        let barrier = Barrier::new(threads);

        std::thread::scope(|s| {
            for t in 0..threads {
                let (cache, objs, strategy, barrier) = (&cache, &objs, &strategy, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    for i in 0..objs.len() {
                        for j in 0..objs.len() {
                            // Half the threads ask in reverse order.
                            let (x, y) = if t % 2 == 0 { (i, j) } else { (j, i) };
                            cache.distance(strategy, &objs[x], &objs[y]).unwrap();
                        }
                    }
                });
            }
        });

        assert_eq!(strategy.calls.load(Ordering::SeqCst), 45);
        assert_eq!(cache.computed(), 45);
        assert_eq!(cache.len(), 45);
    }

    #[test]
    fn test_self_distance_is_not_stored() {
        let strategy = Counting::new();
        let cache = DistanceCache::new();
        let objs = objects(1);
        assert_eq!(cache.distance(&strategy, &objs[0], &objs[0]).unwrap(), 0.0);
        assert!(cache.is_empty());
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_propagates_and_is_not_cached() {
        let mut strategy = Counting::new();
        strategy.fail_on = Some((1, 2));
        let cache = DistanceCache::new();
        let objs = objects(3);
        let err = cache.distance(&strategy, &objs[2], &objs[1]).unwrap_err();
        assert!(matches!(err, Error::Surface { .. }));
        assert_eq!(cache.get(strategy.key(), ObjectId(1), ObjectId(2)), None);
        assert_eq!(cache.computed(), 0);
    }

    #[test]
    fn test_strategies_do_not_share_entries() {
        use crate::distance::OverlapDistance;
        let counting = Counting::new();
        let overlap = OverlapDistance::new();
        let cache = DistanceCache::new();
        let objs = objects(3);
        let a = cache.distance(&counting, &objs[1], &objs[2]).unwrap();
        let b = cache.distance(&overlap, &objs[1], &objs[2]).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(counting.key(), ObjectId(2), ObjectId(1)), Some(a));
        assert_eq!(cache.get(overlap.key(), ObjectId(1), ObjectId(2)), Some(b));
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(
            a in proptest::collection::vec(0.0f64..10.0, 6),
            b in proptest::collection::vec(0.0f64..10.0, 6),
        ) {
            prop_assume!(a.iter().any(|v| *v > 0.0) && b.iter().any(|v| *v > 0.0));
            let strategy = crate::distance::OverlapDistance::new();
            let oa = ClusterObject::from_densities(ObjectId(1), a);
            let ob = ClusterObject::from_densities(ObjectId(2), b);
            let forward = DistanceCache::new().distance(&strategy, &oa, &ob).unwrap();
            let backward = DistanceCache::new().distance(&strategy, &ob, &oa).unwrap();
            prop_assert_eq!(forward, backward);
            prop_assert!((0.0..=1.0).contains(&forward));
        }
    }
}
