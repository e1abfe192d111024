//! Successive Halving (SHA) pruner: budget-aware pruning at exponential rungs.
//!
//! Rung `k` sits at step `min_resource * reduction_factor^(min_early_stopping_rate + k)`.
//! When a trial reaches a rung, its latest value is recorded in the system
//! attribute `completed_rung_<k>` and compared with every other trial that
//! recorded the same rung. Only the top `1/eta` fraction is promoted; the
//! first `eta - 1` trials to reach a rung are always promoted.
//!
//! For example, with `min_resource=1`, `reduction_factor=3`, rate 0:
//!
//! | Rung | Step | Survivors |
//! |------|------|-----------|
//! | 0 | 1 | top 1/3 |
//! | 1 | 3 | top 1/3 |
//! | 2 | 9 | top 1/3 |
//! | 3 | 27 | top 1/3 |
//!
//! The decision never waits for other trials, which makes it suitable for
//! parallel workers.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `min_resource` | 1 | Step of the first rung |
//! | `reduction_factor` | 4 | At each rung, keep the top 1/eta trials |
//! | `min_early_stopping_rate` | 0 | Skip the first N rungs |
//!
//! # Example
//!
//! ```
//! use hypertune::pruner::SuccessiveHalvingPruner;
//!
//! let pruner = SuccessiveHalvingPruner::new()
//!     .min_resource(1)
//!     .reduction_factor(3)
//!     .build()
//!     .unwrap();
//! ```

use super::Pruner;
use crate::error::{Error, Result};
use crate::storage::tolerate_eviction;
use crate::study::Study;
use crate::trial::FrozenTrial;
use crate::types::Direction;

/// Prefix of the system attribute recording the value a trial had when it
/// reached a rung.
pub const COMPLETED_RUNG_PREFIX: &str = "completed_rung_";

/// Asynchronous Successive Halving pruner.
#[derive(Clone, Debug)]
pub struct SuccessiveHalvingPruner {
    min_resource: u64,
    reduction_factor: u64,
    min_early_stopping_rate: u32,
}

impl SuccessiveHalvingPruner {
    /// Create a pruner with `min_resource=1`, `reduction_factor=4` and
    /// `min_early_stopping_rate=0`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_resource: 1,
            reduction_factor: 4,
            min_early_stopping_rate: 0,
        }
    }

    /// Set the step of the first rung.
    #[must_use]
    pub fn min_resource(mut self, r: u64) -> Self {
        self.min_resource = r;
        self
    }

    /// Set the promotion ratio: the top `1/eta` trials of a rung survive.
    #[must_use]
    pub fn reduction_factor(mut self, eta: u64) -> Self {
        self.reduction_factor = eta;
        self
    }

    /// Set the number of rungs skipped before the first decision.
    #[must_use]
    pub fn min_early_stopping_rate(mut self, s: u32) -> Self {
        self.min_early_stopping_rate = s;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `min_resource` is 0 or
    /// `reduction_factor` is below 2.
    pub fn build(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.min_resource == 0 {
            return Err(Error::InvalidConfig("min_resource must be >= 1".into()));
        }
        if self.reduction_factor < 2 {
            return Err(Error::InvalidConfig(format!(
                "reduction_factor must be >= 2, got {}",
                self.reduction_factor
            )));
        }
        Ok(())
    }

    /// The step at which rung `rung` is decided, or `None` if it overflows.
    #[must_use]
    pub fn promotion_step(&self, rung: u32) -> Option<u64> {
        let exp = self.min_early_stopping_rate.checked_add(rung)?;
        self.reduction_factor
            .checked_pow(exp)?
            .checked_mul(self.min_resource)
    }

    /// Run the rung loop, comparing only against trials accepted by `competes`.
    pub(super) fn prune_among(
        &self,
        study: &Study,
        trial: &FrozenTrial,
        competes: impl Fn(&FrozenTrial) -> bool,
    ) -> Result<bool> {
        self.validate()?;
        let (Some(step), Some(value)) = (trial.latest_step(), trial.last_intermediate_value())
        else {
            return Ok(false);
        };

        let mut rung = current_rung(trial);
        let mut all_trials: Option<Vec<FrozenTrial>> = None;
        loop {
            match self.promotion_step(rung) {
                Some(promotion_step) if step >= promotion_step => {}
                _ => return Ok(false),
            }
            if value.is_nan() {
                return Ok(true);
            }

            if all_trials.is_none() {
                all_trials = Some(tolerate_eviction(
                    study.storage().get_all_trials(study.id()),
                )?);
            }
            let others = all_trials.as_deref().unwrap_or_default();

            study
                .storage()
                .set_trial_system_attr(trial.id, &completed_rung_key(rung), &value.to_string())?;

            let mut competing: Vec<f64> = others
                .iter()
                .filter(|t| t.id != trial.id && competes(t))
                .filter_map(|t| value_at_rung(t, rung))
                .collect();
            competing.push(value);

            if !is_promotable(&competing, value, self.reduction_factor, study.direction()) {
                return Ok(true);
            }
            rung += 1;
        }
    }
}

impl Default for SuccessiveHalvingPruner {
    fn default() -> Self {
        Self::new()
    }
}

impl Pruner for SuccessiveHalvingPruner {
    fn should_prune(&self, study: &Study, trial: &FrozenTrial) -> Result<bool> {
        self.prune_among(study, trial, |_| true)
    }
}

fn completed_rung_key(rung: u32) -> String {
    format!("{COMPLETED_RUNG_PREFIX}{rung}")
}

/// The first rung the trial has not recorded yet.
fn current_rung(trial: &FrozenTrial) -> u32 {
    let mut rung = 0;
    while trial.system_attrs.contains_key(&completed_rung_key(rung)) {
        rung += 1;
    }
    rung
}

fn value_at_rung(trial: &FrozenTrial, rung: u32) -> Option<f64> {
    trial
        .system_attrs
        .get(&completed_rung_key(rung))
        .and_then(|v| v.parse().ok())
}

#[allow(clippy::cast_possible_truncation)]
fn is_promotable(competing: &[f64], value: f64, eta: u64, direction: Direction) -> bool {
    let n_promoted = competing.len() / eta as usize;
    // fewer than eta trials at this rung: nothing to compare against yet
    if n_promoted == 0 {
        return true;
    }
    let mut sorted = competing.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let idx = n_promoted - 1;
    match direction {
        Direction::Minimize => value <= sorted[idx],
        Direction::Maximize => value >= sorted[sorted.len() - 1 - idx],
    }
}
