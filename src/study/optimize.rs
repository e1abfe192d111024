use core::ops::ControlFlow;

use crate::error::{Error, Result};
use crate::objective::Objective;
use crate::sampler::intersection_search_space;
use crate::trial::{FrozenTrial, Trial};
use crate::types::TrialState;

use super::Study;

impl Study {
    /// Run `n_trials` trials of `objective` on the calling thread.
    ///
    /// Each trial ends `Complete` when the objective returns a value,
    /// `Pruned` when it returns [`Error::TrialPruned`], and `Fail` on any
    /// other error. A failure stops the loop and is returned unless the
    /// study was built with `ignore_error(true)`.
    ///
    /// The loop also stops early, returning `Ok`, when the study context is
    /// cancelled or a hook of the objective breaks. Several threads may call
    /// `optimize` on clones of the same study concurrently.
    ///
    /// # Errors
    ///
    /// The first objective or storage error, unless errors are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use hypertune::prelude::*;
    ///
    /// let study = Study::builder()
    ///     .sampler(RandomSampler::with_seed(42))
    ///     .build()
    ///     .unwrap();
    ///
    /// study
    ///     .optimize(10, |trial: &Trial| {
    ///         let x = trial.suggest_uniform("x", -10.0, 10.0)?;
    ///         Ok::<_, Error>(x * x)
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(study.n_trials().unwrap(), 10);
    /// assert!(study.get_best_value().unwrap() >= 0.0);
    /// ```
    #[allow(clippy::needless_pass_by_value)]
    pub fn optimize(&self, n_trials: usize, objective: impl Objective) -> Result<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("optimize", study = %self.name, n_trials).entered();

        self.run_worker(n_trials, &objective)
    }

    /// Run `n_trials` trials in total, spread over `n_jobs` worker threads.
    ///
    /// Every worker runs the same loop as [`optimize`](Self::optimize) on a
    /// clone of this study; the first `n_trials % n_jobs` workers take one
    /// extra trial. Workers only coordinate through the storage.
    ///
    /// # Errors
    ///
    /// The first error returned by any worker, or [`Error::Internal`] if a
    /// worker panicked.
    ///
    /// # Examples
    ///
    /// ```
    /// use hypertune::prelude::*;
    ///
    /// let study = Study::builder().build().unwrap();
    /// study
    ///     .optimize_parallel(4, 20, |trial: &Trial| {
    ///         let x = trial.suggest_uniform("x", 0.0, 1.0)?;
    ///         Ok::<_, Error>(x)
    ///     })
    ///     .unwrap();
    /// assert_eq!(study.n_trials().unwrap(), 20);
    /// ```
    #[allow(clippy::needless_pass_by_value)]
    pub fn optimize_parallel<O>(&self, n_jobs: usize, n_trials: usize, objective: O) -> Result<()>
    where
        O: Objective + Sync,
    {
        let n_jobs = n_jobs.max(1);

        #[cfg(feature = "tracing")]
        let _span =
            tracing::info_span!("optimize", study = %self.name, n_trials, n_jobs).entered();

        let objective = &objective;
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..n_jobs)
                .map(|job| {
                    let share = n_trials / n_jobs + usize::from(job < n_trials % n_jobs);
                    let study = self.clone();
                    scope.spawn(move || study.run_worker(share, objective))
                })
                .collect();

            let mut first_error = None;
            for handle in handles {
                let result = handle
                    .join()
                    .unwrap_or(Err(Error::Internal("optimize worker panicked")));
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }

    /// The loop shared by every `optimize` flavour.
    pub(super) fn run_worker<O>(&self, n_trials: usize, objective: &O) -> Result<()>
    where
        O: Objective + ?Sized,
    {
        for _ in 0..n_trials {
            if self.context.is_cancelled() {
                trace_info!("context cancelled; stopping worker");
                break;
            }
            if let ControlFlow::Break(()) = objective.before_trial(self) {
                break;
            }

            match self.run_trial(objective) {
                Ok(snapshot) => {
                    if let ControlFlow::Break(()) = objective.after_trial(self, &snapshot) {
                        break;
                    }
                }
                Err(_err) if self.ignore_error => {
                    trace_warn!(error = %_err, "ignoring trial error");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn run_trial<O>(&self, objective: &O) -> Result<FrozenTrial>
    where
        O: Objective + ?Sized,
    {
        let trial_id = self.storage.create_new_trial(self.id)?;
        // from here on every error must land in the trial's final state
        let outcome = match self.prepare_trial(trial_id) {
            Ok(trial) => objective.evaluate(&trial),
            Err(err) => {
                trace_warn!(trial_id, error = %err, "trial setup failed");
                Err(err)
            }
        };

        let failure = self.commit(trial_id, outcome)?;
        let snapshot = self.storage.get_trial(trial_id)?;
        self.notify(&snapshot);
        match failure {
            Some(err) => Err(err),
            None => Ok(snapshot),
        }
    }

    fn prepare_trial(&self, trial_id: u64) -> Result<Trial> {
        let snapshot = self.storage.get_trial(trial_id)?;
        let mut trial = Trial::new(self.clone(), trial_id, snapshot.number);

        if let Some(relative) = &self.relative_sampler {
            let space = match &self.defined_search_space {
                Some(space) => space.as_ref().clone(),
                None => intersection_search_space(&self.get_trials()?),
            };
            if !space.is_empty() {
                match relative.sample_relative(self, &snapshot, &space) {
                    Ok(params) => trial.set_relative(space, params),
                    Err(Error::UnsupportedSearchSpace(_reason)) => {
                        trace_debug!(trial_id, reason = %_reason, "falling back to independent sampling");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if let Some(params) = self.enqueued.lock().pop_front() {
            trial.set_fixed_params(params);
        }
        Ok(trial)
    }

    /// Move the trial to its terminal state. Returns the objective error
    /// that failed the trial, if any.
    fn commit(&self, trial_id: u64, outcome: Result<f64>) -> Result<Option<Error>> {
        match outcome {
            Ok(value) => {
                self.storage.set_trial_value(trial_id, value)?;
                self.storage.set_trial_state(trial_id, TrialState::Complete)?;
                trace_info!(trial_id, value, "trial completed");

                #[cfg(feature = "tracing")]
                if self
                    .storage
                    .get_best_trial(self.id)
                    .is_ok_and(|best| best.id == trial_id)
                {
                    tracing::info!(trial_id, value, "new best value found");
                }
                Ok(None)
            }
            Err(Error::TrialPruned) => {
                self.storage.set_trial_state(trial_id, TrialState::Pruned)?;
                trace_info!(trial_id, "trial pruned");
                Ok(None)
            }
            Err(err) => {
                self.storage.set_trial_state(trial_id, TrialState::Fail)?;
                trace_debug!(trial_id, error = %err, "trial failed");
                Ok(Some(err))
            }
        }
    }

    fn notify(&self, snapshot: &FrozenTrial) {
        if let Some(sender) = &self.trial_notify
            && sender.send(snapshot.clone()).is_err()
        {
            trace_warn!(trial = snapshot.number, "trial notify receiver is gone");
        }
    }
}
