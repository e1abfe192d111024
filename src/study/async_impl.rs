use std::sync::Arc;

use crate::error::{Error, Result};
use crate::objective::Objective;

use super::Study;

impl Study {
    /// Run optimization from async code.
    ///
    /// Like [`optimize_parallel`](Self::optimize_parallel), but each of the
    /// `n_jobs` workers runs on tokio's blocking pool via
    /// [`spawn_blocking`](tokio::task::spawn_blocking), keeping the async
    /// runtime responsive for CPU-bound objectives. Results are collected
    /// through a [`JoinSet`](tokio::task::JoinSet).
    ///
    /// # Errors
    ///
    /// The first error returned by any worker. Returns
    /// [`Error::TaskError`] if a blocking task panics or is cancelled.
    ///
    /// # Examples
    ///
    /// ```
    /// use hypertune::prelude::*;
    ///
    /// # #[cfg(feature = "async")]
    /// # async fn example() -> hypertune::Result<()> {
    /// let study = Study::builder().build()?;
    /// study
    ///     .optimize_async(2, 10, |trial: &Trial| {
    ///         let x = trial.suggest_uniform("x", -10.0, 10.0)?;
    ///         Ok::<_, Error>(x * x)
    ///     })
    ///     .await?;
    /// assert_eq!(study.n_trials()?, 10);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn optimize_async<O>(
        &self,
        n_jobs: usize,
        n_trials: usize,
        objective: O,
    ) -> Result<()>
    where
        O: Objective + Send + Sync + 'static,
    {
        use tokio::task::JoinSet;

        let n_jobs = n_jobs.max(1);

        trace_info!(study = %self.name, n_trials, n_jobs, "starting async optimization");

        let objective = Arc::new(objective);
        let mut join_set = JoinSet::new();
        for job in 0..n_jobs {
            let share = n_trials / n_jobs + usize::from(job < n_trials % n_jobs);
            let study = self.clone();
            let objective = Arc::clone(&objective);
            join_set.spawn_blocking(move || study.run_worker(share, objective.as_ref()));
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            let result = joined.map_err(|e| Error::TaskError(e.to_string()))?;
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
