//! Iteration records and the strength decay schedule.

use serde::{Deserialize, Serialize};

/// Default decay constant of the strength schedule.
pub const DEFAULT_DECAY: f64 = 0.7;

/// One pass of synthesize, reconstruct, archive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Zero-based pass index
    pub index: u32,
    /// Blend weight handed to the synthesizer, in [0, 1]
    pub strength: f64,
}

impl IterationRecord {
    /// Build the record for `index` out of `max_iterations` passes.
    pub fn new(index: u32, max_iterations: u32, decay: f64) -> Self {
        Self {
            index,
            strength: strength(index, max_iterations, decay),
        }
    }
}

/// Exponential schedule `exp(-k * i / (n - 1))`, clamped to [0, 1].
///
/// Starts at 1.0 and decays to `exp(-k)` on the last pass. A single-pass run
/// stays at 1.0.
pub fn strength(index: u32, max_iterations: u32, decay: f64) -> f64 {
    if max_iterations <= 1 {
        return 1.0;
    }
    let progress = f64::from(index) / f64::from(max_iterations - 1);
    (-decay * progress).exp().clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_starts_at_one() {
        assert_eq!(strength(0, 10, DEFAULT_DECAY), 1.0);
    }

    #[test]
    fn test_strength_is_non_increasing() {
        let values: Vec<f64> = (0..10).map(|i| strength(i, 10, DEFAULT_DECAY)).collect();
        for pair in values.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn test_strength_last_pass_hits_decay_bound() {
        let last = strength(9, 10, DEFAULT_DECAY);
        assert!((last - (-DEFAULT_DECAY).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_strength_single_iteration() {
        assert_eq!(strength(0, 1, DEFAULT_DECAY), 1.0);
        assert_eq!(strength(0, 0, DEFAULT_DECAY), 1.0);
    }

    #[test]
    fn test_strength_stays_in_unit_interval() {
        for i in 0..50 {
            let s = strength(i, 50, 12.0);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_iteration_record_new() {
        let record = IterationRecord::new(0, 2, DEFAULT_DECAY);
        assert_eq!(record.index, 0);
        assert_eq!(record.strength, 1.0);
    }
}
