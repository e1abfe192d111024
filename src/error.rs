use crate::trial::FrozenTrial;

/// Errors returned by studies, storages, samplers and pruners.
///
/// Every variant is matchable. Storage lookups, distribution validation and
/// sampler refusals each have their own variant so callers can recover
/// selectively (for instance by downgrading [`Error::TrialsPartiallyDeleted`]
/// to a warning).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a storage lookup does not know the study id.
    #[error("invalid study id")]
    InvalidStudyId,

    /// Returned when a storage lookup does not know the trial id.
    #[error("invalid trial id")]
    InvalidTrialId,

    /// Returned when a finished trial is mutated.
    #[error("trial cannot be updated")]
    TrialNotUpdatable,

    /// Returned when requesting the best trial but no trials have completed.
    #[error("no trials are completed yet")]
    NoCompletedTrials,

    /// Returned when a distribution cannot be decoded or dispatched.
    #[error("unknown distribution: {0}")]
    UnknownDistribution(String),

    /// Returned when a relative sampler cannot handle the search space.
    #[error("unsupported search space: {0}")]
    UnsupportedSearchSpace(String),

    /// Returned by bounded storages when older trials were evicted.
    ///
    /// The surviving trials are carried along so the caller can keep working
    /// with them.
    #[error("trials are partially deleted ({} remain)", .0.len())]
    TrialsPartiallyDeleted(Vec<FrozenTrial>),

    /// Returned by bounded storages when the requested trial was evicted.
    #[error("trial is already deleted")]
    TrialsAlreadyDeleted,

    /// Returned when a study with the same name already exists.
    #[error("study '{0}' already exists")]
    DuplicatedStudy(String),

    /// Returned when a study name is not found in the storage.
    #[error("study '{0}' not found")]
    StudyNotFound(String),

    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds: low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when log scale is used with non-positive bounds.
    #[error("invalid log bounds: low must be positive for log scale")]
    InvalidLogBounds,

    /// Returned when step size is not positive.
    #[error("invalid step: step must be positive")]
    InvalidStep,

    /// Returned when categorical choices are empty.
    #[error("categorical choices cannot be empty")]
    EmptyChoices,

    /// Returned when an external value does not belong to a distribution.
    #[error("invalid parameter value: {0}")]
    InvalidParamValue(String),

    /// Returned when a parameter is suggested with a different distribution.
    #[error("parameter conflict for '{name}': {reason}")]
    ParameterConflict {
        /// The name of the conflicting parameter.
        name: String,
        /// The reason for the conflict.
        reason: String,
    },

    /// Returned by `should_prune` before any intermediate value was reported.
    #[error("no intermediate values have been reported")]
    NoIntermediateValues,

    /// Returned when a sampler or pruner option is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when a vector does not match the optimizer dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// The expected number of dimensions.
        expected: usize,
        /// The actual number of dimensions.
        got: usize,
    },

    /// Returned when a step size is not strictly positive.
    #[error("invalid sigma: {0} must be positive")]
    InvalidSigma(f64),

    /// Returned when `tell` receives a batch that is not one population.
    #[error("tell expects {expected} solutions, got {got}")]
    TellSizeMismatch {
        /// The population size.
        expected: usize,
        /// The number of solutions passed.
        got: usize,
    },

    /// Returned when a trial is pruned (stopped early by the objective function).
    #[error("trial was pruned")]
    TrialPruned,

    /// Returned by objectives for any user-level failure.
    #[error("objective failed: {0}")]
    Objective(#[source] Box<dyn core::error::Error + Send + Sync>),

    /// Returned when a storage backend fails for a reason outside the taxonomy.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned when JSON encoding fails.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),

    /// Returned when an async task fails.
    #[cfg(feature = "async")]
    #[error("async task error: {0}")]
    TaskError(String),
}

impl Error {
    /// Wrap any user error so it can be returned from an objective.
    ///
    /// ```
    /// use hypertune::Error;
    ///
    /// let err = Error::objective(std::io::Error::other("disk full"));
    /// assert!(matches!(err, Error::Objective(_)));
    /// ```
    pub fn objective(err: impl Into<Box<dyn core::error::Error + Send + Sync>>) -> Self {
        Error::Objective(err.into())
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Convenience type for signalling a pruned trial from an objective function.
///
/// Implements `Into<Error>` so it can be used with `?` in objectives that
/// return `Result<f64, Error>`.
///
/// # Examples
///
/// ```
/// use hypertune::{Error, TrialPruned};
///
/// fn objective_that_prunes() -> Result<f64, Error> {
///     // ... some computation ...
///     Err(TrialPruned)?
/// }
/// ```
#[derive(Debug)]
pub struct TrialPruned;

impl core::fmt::Display for TrialPruned {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "trial was pruned")
    }
}

impl From<TrialPruned> for Error {
    fn from(_: TrialPruned) -> Self {
        Error::TrialPruned
    }
}
