//! Pruner trait and implementations for trial pruning.
//!
//! Pruners decide whether to stop (prune) a trial early based on its
//! intermediate values compared to other trials of the same study. A study
//! without a pruner never prunes; there is no separate no-op pruner.
//!
//! # Available pruners
//!
//! | Pruner | Description |
//! |--------|-------------|
//! | [`PercentilePruner`] | Prune when the best value so far is outside the top `q`% at the same step |
//! | [`MedianPruner`] | [`PercentilePruner`] with `q = 50` |
//! | [`SuccessiveHalvingPruner`] | Asynchronous successive halving at rungs `r0 * eta^(s0 + k)` |
//! | [`HyperbandPruner`] | Several successive-halving brackets, trials dispatched by number |

mod hyperband;
mod median;
mod percentile;
mod successive_halving;

pub use hyperband::{HyperbandPruner, HyperbandPrunerBuilder};
pub use median::MedianPruner;
pub use percentile::PercentilePruner;
pub use successive_halving::{COMPLETED_RUNG_PREFIX, SuccessiveHalvingPruner};

use crate::error::Result;
use crate::study::Study;
use crate::trial::FrozenTrial;

/// Trait for pluggable trial pruning strategies.
///
/// Pruners are consulted through [`Trial::should_prune`](crate::Trial::should_prune)
/// after the objective reported at least one intermediate value. The trait
/// requires `Send + Sync` because one pruner serves every worker of a study.
///
/// # Implementing a custom pruner
///
/// ```
/// use hypertune::pruner::Pruner;
/// use hypertune::{FrozenTrial, Result, Study};
///
/// struct ThresholdPruner {
///     threshold: f64,
/// }
///
/// impl Pruner for ThresholdPruner {
///     fn should_prune(&self, _study: &Study, trial: &FrozenTrial) -> Result<bool> {
///         Ok(trial
///             .last_intermediate_value()
///             .is_some_and(|v| v > self.threshold))
///     }
/// }
/// ```
pub trait Pruner: Send + Sync {
    /// Decide whether to prune `trial` at its latest reported step.
    ///
    /// # Errors
    ///
    /// Storage errors while reading other trials or recording attributes.
    fn should_prune(&self, study: &Study, trial: &FrozenTrial) -> Result<bool>;
}
