//! Trial storage backends.
//!
//! The [`Storage`] trait is the only channel through which studies, samplers
//! and pruners share trial history. Every [`Study`](crate::Study) owns an
//! `Arc<dyn Storage>`, so a storage is transparently shared across worker
//! threads.
//!
//! # Available backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`InMemoryStorage`] | One study, dense trial vector behind a read-write lock (the default) |
//! | [`BlackHoleStorage`] | Keeps the latest `N` finished trials plus running ones, for very long runs |
//!
//! # Guarantees
//!
//! - Mutating a finished trial fails with [`Error::TrialNotUpdatable`].
//! - Setting a parameter again with a different distribution fails with
//!   [`Error::ParameterConflict`].
//! - Moving a trial to a finished state stamps `datetime_complete`.
//! - [`Storage::get_best_trial`] breaks ties by the earliest trial number.
//!
//! # Implementing a custom backend
//!
//! Implement [`Storage`] and inject it through
//! [`StudyBuilder::storage`](crate::StudyBuilder::storage). The
//! `pub` helpers [`apply_param`], [`apply_state`] and [`best_trial_of`] carry
//! the shared validation logic so backends only deal with locking and layout.

use std::collections::HashMap;
use std::time::SystemTime;

mod blackhole;
mod memory;

pub use blackhole::BlackHoleStorage;
pub use memory::InMemoryStorage;

use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::study::StudySummary;
use crate::trial::FrozenTrial;
use crate::types::{Direction, TrialState};

/// Prefix of auto-generated study names.
pub const DEFAULT_STUDY_NAME_PREFIX: &str = "no-name-";

/// Mutation and query primitives over studies and trials.
///
/// Implementations must be `Send + Sync` and serialize concurrent mutations
/// of the same trial. Each returned [`FrozenTrial`] must be internally
/// consistent; a bulk read may mix snapshots taken at different instants.
pub trait Storage: Send + Sync {
    // ----- Study -----

    /// Create a study and return its id. A blank name is replaced by an
    /// auto-generated one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatedStudy`] if the name is taken.
    fn create_new_study(&self, name: &str) -> Result<u64>;

    /// Delete a study and all its trials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn delete_study(&self, study_id: u64) -> Result<()>;

    /// Look up a study id by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] if no study has that name.
    fn get_study_id_from_name(&self, name: &str) -> Result<u64>;

    /// Look up the study owning a trial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrialId`] if the trial does not exist.
    fn get_study_id_from_trial_id(&self, trial_id: u64) -> Result<u64>;

    /// Look up a study name by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn get_study_name_from_id(&self, study_id: u64) -> Result<String>;

    /// Set the optimization direction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn set_study_direction(&self, study_id: u64, direction: Direction) -> Result<()>;

    /// Get the optimization direction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn get_study_direction(&self, study_id: u64) -> Result<Direction>;

    /// Set a study-level user attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn set_study_user_attr(&self, study_id: u64, key: &str, value: &str) -> Result<()>;

    /// Set a study-level system attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn set_study_system_attr(&self, study_id: u64, key: &str, value: &str) -> Result<()>;

    /// All study-level user attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn get_study_user_attrs(&self, study_id: u64) -> Result<HashMap<String, String>>;

    /// All study-level system attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn get_study_system_attrs(&self, study_id: u64) -> Result<HashMap<String, String>>;

    /// Summaries of every stored study.
    ///
    /// # Errors
    ///
    /// Backend-specific failures only.
    fn get_all_study_summaries(&self) -> Result<Vec<StudySummary>>;

    // ----- Trial -----

    /// Create a `Running` trial numbered after the existing trials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn create_new_trial(&self, study_id: u64) -> Result<u64>;

    /// Create a trial copying everything but identity from `template`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] if the study does not exist.
    fn clone_trial(&self, study_id: u64, template: &FrozenTrial) -> Result<u64>;

    /// Set the trial value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] on finished trials.
    fn set_trial_value(&self, trial_id: u64, value: f64) -> Result<()>;

    /// Record an intermediate value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] on finished trials.
    fn set_trial_intermediate_value(&self, trial_id: u64, step: u64, value: f64) -> Result<()>;

    /// Record a parameter in its internal encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] on finished trials and
    /// [`Error::ParameterConflict`] if `name` already has another distribution.
    fn set_trial_param(
        &self,
        trial_id: u64,
        name: &str,
        internal: f64,
        distribution: &Distribution,
    ) -> Result<()>;

    /// Move a trial to `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] on finished trials.
    fn set_trial_state(&self, trial_id: u64, state: TrialState) -> Result<()>;

    /// Set a trial user attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] on finished trials.
    fn set_trial_user_attr(&self, trial_id: u64, key: &str, value: &str) -> Result<()>;

    /// Set a trial system attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] on finished trials.
    fn set_trial_system_attr(&self, trial_id: u64, key: &str, value: &str) -> Result<()>;

    /// Snapshot of one trial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrialId`] for unknown ids.
    fn get_trial(&self, trial_id: u64) -> Result<FrozenTrial>;

    /// Snapshots of every stored trial of a study, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudyId`] for unknown studies. Bounded
    /// backends return [`Error::TrialsPartiallyDeleted`] carrying the
    /// surviving trials.
    fn get_all_trials(&self, study_id: u64) -> Result<Vec<FrozenTrial>>;

    /// The best complete trial under the study direction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompletedTrials`] if none completed.
    fn get_best_trial(&self, study_id: u64) -> Result<FrozenTrial> {
        let direction = self.get_study_direction(study_id)?;
        let trials = tolerate_eviction(self.get_all_trials(study_id))?;
        best_trial_of(&trials, direction)
    }
}

/// Accept [`Error::TrialsPartiallyDeleted`] as success, returning the
/// surviving trials.
///
/// # Errors
///
/// Propagates every other error unchanged.
pub fn tolerate_eviction(result: Result<Vec<FrozenTrial>>) -> Result<Vec<FrozenTrial>> {
    match result {
        Err(Error::TrialsPartiallyDeleted(trials)) => {
            trace_warn!(remaining = trials.len(), "older trials were evicted from storage");
            Ok(trials)
        }
        other => other,
    }
}

/// The best `Complete` trial; ties go to the smallest `number`.
///
/// # Errors
///
/// Returns [`Error::NoCompletedTrials`] if no trial is complete.
pub fn best_trial_of(trials: &[FrozenTrial], direction: Direction) -> Result<FrozenTrial> {
    let mut best: Option<&FrozenTrial> = None;
    for trial in trials.iter().filter(|t| t.state == TrialState::Complete) {
        let Some(value) = trial.value else { continue };
        best = match best {
            None => Some(trial),
            Some(b) => {
                let b_value = b.value.unwrap_or(f64::NAN);
                if direction.is_better(value, b_value)
                    || (value == b_value && trial.number < b.number)
                {
                    Some(trial)
                } else {
                    Some(b)
                }
            }
        };
    }
    best.cloned().ok_or(Error::NoCompletedTrials)
}

/// Fail with [`Error::TrialNotUpdatable`] if `trial` is finished.
///
/// # Errors
///
/// See above.
pub fn check_updatable(trial: &FrozenTrial) -> Result<()> {
    if trial.state.is_finished() {
        return Err(Error::TrialNotUpdatable);
    }
    Ok(())
}

/// Validate and record a parameter on an unfinished trial.
///
/// # Errors
///
/// Returns [`Error::TrialNotUpdatable`] or [`Error::ParameterConflict`].
pub fn apply_param(
    trial: &mut FrozenTrial,
    name: &str,
    internal: f64,
    distribution: &Distribution,
) -> Result<()> {
    check_updatable(trial)?;
    if let Some(existing) = trial.distributions.get(name)
        && existing != distribution
    {
        return Err(Error::ParameterConflict {
            name: name.to_string(),
            reason: format!("stored with {}, requested {}", existing.name(), distribution.name()),
        });
    }
    trial
        .distributions
        .insert(name.to_string(), distribution.clone());
    trial.params_internal.insert(name.to_string(), internal);
    Ok(())
}

/// Validate and apply a state transition on an unfinished trial.
///
/// Finished states stamp `datetime_complete`; `Complete` needs a value.
///
/// # Errors
///
/// Returns [`Error::TrialNotUpdatable`], or [`Error::Storage`] when
/// completing a trial without a value.
pub fn apply_state(trial: &mut FrozenTrial, state: TrialState) -> Result<()> {
    check_updatable(trial)?;
    if state == TrialState::Complete && trial.value.is_none() {
        return Err(Error::Storage(format!(
            "trial {} cannot complete without a value",
            trial.id
        )));
    }
    trial.state = state;
    if state.is_finished() {
        trial.datetime_complete = Some(SystemTime::now());
    }
    Ok(())
}

/// Study-level record shared by the bundled backends.
#[derive(Clone, Debug)]
pub(crate) struct StudyRecord {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) direction: Direction,
    pub(crate) user_attrs: HashMap<String, String>,
    pub(crate) system_attrs: HashMap<String, String>,
}

impl StudyRecord {
    pub(crate) fn new(id: u64, name: &str) -> Self {
        let name = if name.trim().is_empty() {
            format!("{DEFAULT_STUDY_NAME_PREFIX}{:016x}", fastrand::u64(..))
        } else {
            name.to_string()
        };
        Self {
            id,
            name,
            direction: Direction::Minimize,
            user_attrs: HashMap::new(),
            system_attrs: HashMap::new(),
        }
    }

    pub(crate) fn summary(
        &self,
        best_trial: Option<FrozenTrial>,
        trials: &[FrozenTrial],
    ) -> StudySummary {
        StudySummary {
            id: self.id,
            name: self.name.clone(),
            direction: self.direction,
            best_trial,
            user_attrs: self.user_attrs.clone(),
            system_attrs: self.system_attrs.clone(),
            datetime_start: trials.iter().map(|t| t.datetime_start).min(),
        }
    }
}
