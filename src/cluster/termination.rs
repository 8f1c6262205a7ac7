//! Stopping rules for agglomerative merging.
//!
//! The analysis asks the criterion before applying each candidate merge,
//! passing the current cluster count and the candidate's linkage distance.
//! Stopping therefore never applies the merge that triggered it.

use crate::error::{Error, Result};
use std::collections::VecDeque;

/// Default number of recent merges the distance-jump rule averages over.
pub const DEFAULT_JUMP_WINDOW: usize = 3;

/// Runtime state of a stopping rule.
pub trait TerminationCriterion: Send {
    /// Whether to stop instead of applying a merge at `next_distance` while
    /// `clusters` clusters remain.
    fn should_stop(&mut self, clusters: usize, next_distance: f64) -> bool;

    /// Record an applied merge.
    fn record_merge(&mut self, _distance: f64) {}
}

/// Termination configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Termination {
    /// Stop once exactly `target` clusters remain.
    ClusterCount {
        /// Target cluster count, `1..=n`.
        target: usize,
    },
    /// Stop at a knee in the merge distances: when the next merge distance
    /// exceeds the previous one by more than `multiplier` times the mean of
    /// the last `window` merge distances.
    DistanceJump {
        /// Jump-to-average ratio that counts as a knee.
        multiplier: f64,
        /// Number of recent merges averaged.
        window: usize,
    },
}

impl Termination {
    /// Fixed target cluster count.
    pub fn cluster_count(target: usize) -> Self {
        Termination::ClusterCount { target }
    }

    /// Distance-variability threshold with the default window.
    pub fn distance_jump(multiplier: f64) -> Self {
        Termination::DistanceJump {
            multiplier,
            window: DEFAULT_JUMP_WINDOW,
        }
    }

    /// Change the averaging window of a distance-jump rule.
    pub fn with_window(self, window: usize) -> Self {
        match self {
            Termination::DistanceJump { multiplier, .. } => {
                Termination::DistanceJump { multiplier, window }
            }
            other => other,
        }
    }

    /// Check parameters against the number of objects.
    pub fn validate(&self, n_items: usize) -> Result<()> {
        match *self {
            Termination::ClusterCount { target } => {
                if target == 0 || target > n_items {
                    return Err(Error::InvalidClusterCount {
                        requested: target,
                        n_items,
                    });
                }
            }
            Termination::DistanceJump { multiplier, window } => {
                if !(multiplier.is_finite() && multiplier > 0.0) {
                    let reason = format!("must be finite and > 0, got {multiplier}");
                    return Err(Error::invalid("multiplier", reason));
                }
                if window == 0 {
                    return Err(Error::invalid("window", "must be >= 1"));
                }
            }
        }
        Ok(())
    }

    /// Fresh runtime state for one analysis.
    pub fn criterion(&self) -> Box<dyn TerminationCriterion> {
        match *self {
            Termination::ClusterCount { target } => Box::new(TargetCount { target }),
            Termination::DistanceJump { multiplier, window } => {
                Box::new(DistanceJump::new(multiplier, window))
            }
        }
    }
}

/// Stops once `target` clusters remain.
#[derive(Debug, Clone, Copy)]
pub struct TargetCount {
    target: usize,
}

impl TerminationCriterion for TargetCount {
    fn should_stop(&mut self, clusters: usize, _next_distance: f64) -> bool {
        clusters <= self.target
    }
}

/// Stops when the next merge distance jumps relative to the recent average.
#[derive(Debug, Clone)]
pub struct DistanceJump {
    multiplier: f64,
    window: usize,
    recent: VecDeque<f64>,
}

impl DistanceJump {
    /// New rule.
    pub fn new(multiplier: f64, window: usize) -> Self {
        Self {
            multiplier,
            window: window.max(1),
            recent: VecDeque::with_capacity(window.max(1)),
        }
    }
}

impl TerminationCriterion for DistanceJump {
    fn should_stop(&mut self, _clusters: usize, next_distance: f64) -> bool {
        let Some(&last) = self.recent.back() else {
            return false;
        };
        let mean = self.recent.iter().sum::<f64>() / self.recent.len() as f64;
        // All recent merges at distance 0 give no scale to compare against.
        if mean <= 0.0 {
            return false;
        }
        next_distance - last > self.multiplier * mean
    }

    fn record_merge(&mut self, distance: f64) {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(distance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_count() {
        let mut c = Termination::cluster_count(2).criterion();
        assert!(!c.should_stop(3, 1.0));
        assert!(c.should_stop(2, 1.0));
    }

    #[test]
    fn test_distance_jump_detects_knee() {
        let mut c = Termination::distance_jump(3.0).criterion();
        assert!(!c.should_stop(6, 0.10));
        for d in [0.10, 0.12, 0.11, 0.13] {
            assert!(!c.should_stop(5, d));
            c.record_merge(d);
        }
        // mean of last three = 0.12; jump 0.20 < 0.36
        assert!(!c.should_stop(2, 0.33));
        // jump 4.87 > 0.36
        assert!(c.should_stop(2, 5.0));
    }

    #[test]
    fn test_distance_jump_window_slides() {
        let mut c = DistanceJump::new(1.0, 2);
        for d in [10.0, 0.1, 0.1] {
            c.record_merge(d);
        }
        // 10.0 has left the window: mean 0.1, jump 0.5 > 0.1
        assert!(c.should_stop(3, 0.6));
    }

    #[test]
    fn test_zero_scale_never_stops() {
        let mut c = DistanceJump::new(1.0, 3);
        c.record_merge(0.0);
        assert!(!c.should_stop(3, 100.0));
    }

    #[test]
    fn test_validation() {
        assert!(Termination::cluster_count(0).validate(5).is_err());
        assert!(Termination::cluster_count(6).validate(5).is_err());
        assert!(Termination::cluster_count(5).validate(5).is_ok());
        let err = Termination::distance_jump(f64::NAN).validate(5).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "multiplier", .. }));
        assert!(Termination::distance_jump(-1.0).validate(5).is_err());
        assert!(Termination::distance_jump(2.0).with_window(0).validate(5).is_err());
    }
}
