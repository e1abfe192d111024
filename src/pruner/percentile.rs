//! Percentile pruner: prune trials outside the top `q`% at each step.
//!
//! A generalization of [`MedianPruner`](super::MedianPruner) that lets you
//! control how aggressively to prune. The current trial's best intermediate
//! value so far is compared against the given percentile of all completed
//! trials' values at the current step.
//!
//! # When to use
//!
//! - When you want finer control over pruning aggressiveness than median pruning
//! - Lower percentiles (e.g., 25%) are more aggressive
//! - Higher percentiles (e.g., 75%) are more lenient
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `percentile` | *(required)* | Keep trials in the top `q`%, range `(0, 100)` |
//! | `n_startup_trials` | 5 | Require at least N completed trials before pruning |
//! | `n_warmup_steps` | 0 | Never prune at steps `<= N` |
//!
//! # Example
//!
//! ```
//! use hypertune::pruner::PercentilePruner;
//!
//! let pruner = PercentilePruner::new(25.0)
//!     .unwrap()
//!     .n_startup_trials(3)
//!     .n_warmup_steps(5);
//! ```

use super::Pruner;
use crate::error::{Error, Result};
use crate::storage::tolerate_eviction;
use crate::study::Study;
use crate::trial::FrozenTrial;
use crate::types::{Direction, TrialState};

/// Prune trials whose best intermediate value is worse than the
/// `percentile`-th value of completed trials at the same step.
///
/// For maximization the percentile is flipped to `100 - percentile`.
#[derive(Clone, Debug)]
pub struct PercentilePruner {
    pub(super) percentile: f64,
    pub(super) n_startup_trials: usize,
    pub(super) n_warmup_steps: u64,
}

impl PercentilePruner {
    /// Create a pruner keeping the top `percentile`% of trials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `percentile` is not in `(0, 100)`.
    pub fn new(percentile: f64) -> Result<Self> {
        if !(percentile > 0.0 && percentile < 100.0) {
            return Err(Error::InvalidConfig(format!(
                "percentile must be in (0, 100), got {percentile}"
            )));
        }
        Ok(Self {
            percentile,
            n_startup_trials: 5,
            n_warmup_steps: 0,
        })
    }

    /// Set the minimum number of completed trials required before pruning.
    #[must_use]
    pub fn n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set the number of warmup steps. No pruning occurs at or before this step.
    #[must_use]
    pub fn n_warmup_steps(mut self, n: u64) -> Self {
        self.n_warmup_steps = n;
        self
    }

    /// The configured percentile.
    #[must_use]
    pub fn percentile(&self) -> f64 {
        self.percentile
    }
}

impl Pruner for PercentilePruner {
    fn should_prune(&self, study: &Study, trial: &FrozenTrial) -> Result<bool> {
        let Some(step) = trial.latest_step() else {
            return Ok(false);
        };
        if step <= self.n_warmup_steps {
            return Ok(false);
        }

        let trials = tolerate_eviction(study.storage().get_all_trials(study.id()))?;
        let completed: Vec<&FrozenTrial> = trials
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .collect();
        if completed.is_empty() || completed.len() < self.n_startup_trials {
            return Ok(false);
        }

        let direction = study.direction();
        let best = best_intermediate_value(trial, direction);
        if best.is_nan() {
            return Ok(true);
        }

        let q = match direction {
            Direction::Minimize => self.percentile,
            Direction::Maximize => 100.0 - self.percentile,
        };
        let mut at_step: Vec<f64> = completed
            .iter()
            .filter_map(|t| t.intermediate_values.get(&step).copied())
            .collect();
        if at_step.is_empty() {
            return Ok(false);
        }
        let threshold = compute_percentile(&mut at_step, q);

        Ok(match direction {
            Direction::Minimize => best > threshold,
            Direction::Maximize => best < threshold,
        })
    }
}

/// The best intermediate value over all steps, or NaN if there is none or
/// any reported value is NaN.
fn best_intermediate_value(trial: &FrozenTrial, direction: Direction) -> f64 {
    let mut values = trial.intermediate_values.values().copied();
    let Some(first) = values.next() else {
        return f64::NAN;
    };
    values.fold(first, |best, v| {
        if best.is_nan() || v.is_nan() {
            f64::NAN
        } else {
            match direction {
                Direction::Minimize => best.min(v),
                Direction::Maximize => best.max(v),
            }
        }
    })
}

/// Compute the given percentile of a non-empty slice. Sorts the slice in place.
///
/// Uses linear interpolation between the two nearest ranks.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn compute_percentile(values: &mut [f64], percentile: f64) -> f64 {
    values.sort_unstable_by(f64::total_cmp);
    let len = values.len();
    if len <= 1 {
        return values.first().copied().unwrap_or(f64::NAN);
    }
    let rank = percentile / 100.0 * (len - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        values[lower]
    } else {
        let frac = rank - lower as f64;
        values[lower] * (1.0 - frac) + values[upper] * frac
    }
}
