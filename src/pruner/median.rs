use super::{PercentilePruner, Pruner};
use crate::error::Result;
use crate::study::Study;
use crate::trial::FrozenTrial;

/// Prune trials whose best intermediate value is worse than the median of
/// completed trials at the same step.
///
/// This is the most commonly used pruner and a thin wrapper around
/// [`PercentilePruner`] with `percentile = 50`.
///
/// # Examples
///
/// ```
/// use hypertune::pruner::MedianPruner;
///
/// let pruner = MedianPruner::new().n_startup_trials(5).n_warmup_steps(10);
/// ```
#[derive(Clone, Debug)]
pub struct MedianPruner {
    inner: PercentilePruner,
}

impl MedianPruner {
    /// Create a median pruner with 5 startup trials and no warmup.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: PercentilePruner {
                percentile: 50.0,
                n_startup_trials: 5,
                n_warmup_steps: 0,
            },
        }
    }

    /// Set the minimum number of completed trials required before pruning.
    #[must_use]
    pub fn n_startup_trials(mut self, n: usize) -> Self {
        self.inner = self.inner.n_startup_trials(n);
        self
    }

    /// Set the number of warmup steps. No pruning occurs at or before this step.
    #[must_use]
    pub fn n_warmup_steps(mut self, n: u64) -> Self {
        self.inner = self.inner.n_warmup_steps(n);
        self
    }
}

impl Default for MedianPruner {
    fn default() -> Self {
        Self::new()
    }
}

impl Pruner for MedianPruner {
    fn should_prune(&self, study: &Study, trial: &FrozenTrial) -> Result<bool> {
        self.inner.should_prune(study, trial)
    }
}
