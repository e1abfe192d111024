//! Hyperband pruner: several Successive Halving brackets side by side.
//!
//! Hyperband hedges against a bad `min_early_stopping_rate` choice of
//! [`SuccessiveHalvingPruner`](super::SuccessiveHalvingPruner) by running one
//! bracket per rate in `low..=high`. Bracket `i` receives a resource budget
//!
//! ```text
//! B_i = eta^(n-1) + (n-1-i) * floor(eta^(n-1) / 2)      n = high - low + 1
//! ```
//!
//! and trials are dispatched by number: trial `N` goes to the first bracket
//! `i` for which `(N mod sum(B)) - sum(B_0..B_i) < 0`. Within a bracket the
//! SHA decision only compares trials of the same bracket.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `min_resource` | 1 | Step of the first rung of every bracket |
//! | `reduction_factor` | 4 | Promotion ratio eta |
//! | `min_early_stopping_rate_low` | 0 | Rate of the first bracket |
//! | `min_early_stopping_rate_high` | 4 | Rate of the last bracket |
//!
//! # Example
//!
//! ```
//! use hypertune::pruner::HyperbandPruner;
//!
//! let pruner = HyperbandPruner::builder()
//!     .reduction_factor(2)
//!     .min_early_stopping_rate_high(3)
//!     .build()
//!     .unwrap();
//! assert_eq!(pruner.bracket_budgets(), &[20, 16, 12, 8]);
//! assert_eq!(pruner.bracket_of(19), 0);
//! assert_eq!(pruner.bracket_of(20), 1);
//! ```

use super::{Pruner, SuccessiveHalvingPruner};
use crate::error::{Error, Result};
use crate::study::Study;
use crate::trial::FrozenTrial;

/// Hyperband pruner dispatching trials to Successive Halving brackets.
#[derive(Clone, Debug)]
pub struct HyperbandPruner {
    brackets: Vec<SuccessiveHalvingPruner>,
    budgets: Vec<u64>,
    total_budget: u64,
}

/// Builder for [`HyperbandPruner`].
#[derive(Clone, Debug)]
pub struct HyperbandPrunerBuilder {
    min_resource: u64,
    reduction_factor: u64,
    rate_low: u32,
    rate_high: u32,
}

impl HyperbandPrunerBuilder {
    /// Set the step of the first rung of every bracket.
    #[must_use]
    pub fn min_resource(mut self, r: u64) -> Self {
        self.min_resource = r;
        self
    }

    /// Set the promotion ratio shared by every bracket.
    #[must_use]
    pub fn reduction_factor(mut self, eta: u64) -> Self {
        self.reduction_factor = eta;
        self
    }

    /// Set the early-stopping rate of the first bracket.
    #[must_use]
    pub fn min_early_stopping_rate_low(mut self, s: u32) -> Self {
        self.rate_low = s;
        self
    }

    /// Set the early-stopping rate of the last bracket.
    #[must_use]
    pub fn min_early_stopping_rate_high(mut self, s: u32) -> Self {
        self.rate_high = s;
        self
    }

    /// Build the brackets and their budgets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the rate range is empty, the SHA
    /// options are invalid, or the budgets overflow.
    pub fn build(self) -> Result<HyperbandPruner> {
        if self.rate_low > self.rate_high {
            return Err(Error::InvalidConfig(format!(
                "min_early_stopping_rate_low ({}) exceeds high ({})",
                self.rate_low, self.rate_high
            )));
        }
        let n = self.rate_high - self.rate_low + 1;
        let full = self
            .reduction_factor
            .checked_pow(n - 1)
            .ok_or_else(|| Error::InvalidConfig("bracket budget overflows".into()))?;

        let mut brackets = Vec::with_capacity(n as usize);
        let mut budgets = Vec::with_capacity(n as usize);
        for i in 0..n {
            brackets.push(
                SuccessiveHalvingPruner::new()
                    .min_resource(self.min_resource)
                    .reduction_factor(self.reduction_factor)
                    .min_early_stopping_rate(self.rate_low + i)
                    .build()?,
            );
            let budget = u64::from(n - 1 - i)
                .checked_mul(full / 2)
                .and_then(|extra| extra.checked_add(full))
                .ok_or_else(|| Error::InvalidConfig("bracket budget overflows".into()))?;
            budgets.push(budget);
        }
        let total_budget = budgets
            .iter()
            .try_fold(0_u64, |acc, b| acc.checked_add(*b))
            .ok_or_else(|| Error::InvalidConfig("bracket budget overflows".into()))?;

        Ok(HyperbandPruner {
            brackets,
            budgets,
            total_budget,
        })
    }
}

impl Default for HyperbandPrunerBuilder {
    fn default() -> Self {
        Self {
            min_resource: 1,
            reduction_factor: 4,
            rate_low: 0,
            rate_high: 4,
        }
    }
}

impl HyperbandPruner {
    /// Start configuring a pruner from the defaults.
    #[must_use]
    pub fn builder() -> HyperbandPrunerBuilder {
        HyperbandPrunerBuilder::default()
    }

    /// A pruner with `min_resource=1`, `reduction_factor=4` and rates `0..=4`.
    ///
    /// # Errors
    ///
    /// Never fails with the defaults; the `Result` mirrors [`HyperbandPrunerBuilder::build`].
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Resource budget of each bracket.
    #[must_use]
    pub fn bracket_budgets(&self) -> &[u64] {
        &self.budgets
    }

    /// Number of brackets.
    #[must_use]
    pub fn n_brackets(&self) -> usize {
        self.brackets.len()
    }

    /// The bracket a trial number is dispatched to.
    #[must_use]
    pub fn bracket_of(&self, number: u64) -> usize {
        let mut n = number % self.total_budget.max(1);
        for (i, budget) in self.budgets.iter().enumerate() {
            if n < *budget {
                return i;
            }
            n -= budget;
        }
        self.budgets.len().saturating_sub(1)
    }
}

impl Pruner for HyperbandPruner {
    fn should_prune(&self, study: &Study, trial: &FrozenTrial) -> Result<bool> {
        let bracket = self.bracket_of(trial.number);
        let sha = self
            .brackets
            .get(bracket)
            .ok_or(Error::Internal("hyperband bracket out of range"))?;
        trace_debug!(trial = trial.number, bracket, "hyperband dispatch");
        sha.prune_among(study, trial, |other| self.bracket_of(other.number) == bracket)
    }
}
