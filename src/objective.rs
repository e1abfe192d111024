//! The [`Objective`] trait defines what gets optimized.
//!
//! For simple closures, pass them directly to
//! [`Study::optimize`](crate::Study::optimize):
//!
//! ```
//! use hypertune::prelude::*;
//!
//! let study = Study::builder().build().unwrap();
//! study
//!     .optimize(20, |trial: &Trial| {
//!         let x = trial.suggest_uniform("x", -10.0, 10.0)?;
//!         Ok::<_, Error>((x - 3.0).powi(2))
//!     })
//!     .unwrap();
//! ```
//!
//! For early stopping, implement [`Objective`] on a struct:
//!
//! ```
//! use std::ops::ControlFlow;
//!
//! use hypertune::prelude::*;
//!
//! struct StopBelow(f64);
//!
//! impl Objective for StopBelow {
//!     fn evaluate(&self, trial: &Trial) -> Result<f64> {
//!         let x = trial.suggest_uniform("x", -10.0, 10.0)?;
//!         Ok((x - 3.0).powi(2))
//!     }
//!
//!     fn after_trial(&self, _study: &Study, trial: &FrozenTrial) -> ControlFlow<()> {
//!         if trial.value.is_some_and(|v| v < self.0) {
//!             ControlFlow::Break(())
//!         } else {
//!             ControlFlow::Continue(())
//!         }
//!     }
//! }
//!
//! let study = Study::builder().build().unwrap();
//! study.optimize(500, StopBelow(1.0)).unwrap();
//! assert!(study.get_best_value().unwrap() < 1.0);
//! ```

use core::ops::ControlFlow;

use crate::error::Result;
use crate::study::Study;
use crate::trial::{FrozenTrial, Trial};

/// An objective function with lifecycle hooks.
///
/// The only required method is [`evaluate`](Objective::evaluate). Returning
/// [`Error::TrialPruned`](crate::Error::TrialPruned) marks the trial as
/// pruned; any other error marks it as failed.
///
/// Closures `Fn(&Trial) -> Result<f64>` implement this trait through a
/// blanket impl. [`Study::optimize_parallel`](crate::Study::optimize_parallel)
/// additionally requires `Sync`.
pub trait Objective {
    /// Evaluate the objective for one trial.
    ///
    /// # Errors
    ///
    /// Any error; see the trait documentation for how it is recorded.
    fn evaluate(&self, trial: &Trial) -> Result<f64>;

    /// Called before each trial is created.
    ///
    /// Return `ControlFlow::Break(())` to stop this worker before the next
    /// trial starts. Default: always continues.
    fn before_trial(&self, _study: &Study) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Called with the final snapshot of each trial that completed or was
    /// pruned. Failed trials skip this hook.
    ///
    /// Return `ControlFlow::Break(())` to stop this worker. Default: always
    /// continues.
    fn after_trial(&self, _study: &Study, _trial: &FrozenTrial) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<F> Objective for F
where
    F: Fn(&Trial) -> Result<f64>,
{
    fn evaluate(&self, trial: &Trial) -> Result<f64> {
        self(trial)
    }
}
