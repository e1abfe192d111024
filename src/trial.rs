//! Trial snapshots and the live trial handle passed to objectives.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::distribution::{
    CategoricalDistribution, DiscreteUniformDistribution, Distribution, IntUniformDistribution,
    LogUniformDistribution, StepIntUniformDistribution, UniformDistribution,
};
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::sampler::SearchSpace;
use crate::study::Study;
use crate::types::TrialState;

/// An immutable snapshot of a trial as stored in a [`Storage`](crate::storage::Storage).
///
/// Samplers and pruners only ever see trials through this type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrozenTrial {
    /// Unique identifier within the storage.
    pub id: u64,
    /// The study this trial belongs to.
    pub study_id: u64,
    /// 0-based position within the study.
    pub number: u64,
    /// Lifecycle state.
    pub state: TrialState,
    /// Objective value. Set on completion, and updated by every `report`.
    pub value: Option<f64>,
    /// Reported intermediate values keyed by step.
    pub intermediate_values: BTreeMap<u64, f64>,
    /// Parameter values in their internal encoding.
    pub params_internal: BTreeMap<String, f64>,
    /// Parameter distributions.
    pub distributions: BTreeMap<String, Distribution>,
    /// Free-form attributes set by users.
    pub user_attrs: HashMap<String, String>,
    /// Attributes set by samplers, pruners and helpers.
    pub system_attrs: HashMap<String, String>,
    /// When the trial was created.
    pub datetime_start: SystemTime,
    /// When the trial reached a finished state.
    pub datetime_complete: Option<SystemTime>,
}

impl FrozenTrial {
    /// A fresh `Running` trial stamped with the current time.
    #[must_use]
    pub fn new(id: u64, study_id: u64, number: u64) -> Self {
        Self {
            id,
            study_id,
            number,
            state: TrialState::Running,
            value: None,
            intermediate_values: BTreeMap::new(),
            params_internal: BTreeMap::new(),
            distributions: BTreeMap::new(),
            user_attrs: HashMap::new(),
            system_attrs: HashMap::new(),
            datetime_start: SystemTime::now(),
            datetime_complete: None,
        }
    }

    /// Parameters in their external representation.
    #[must_use]
    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        self.params_internal
            .iter()
            .filter_map(|(name, &v)| {
                self.distributions
                    .get(name)
                    .map(|d| (name.clone(), d.to_external(v)))
            })
            .collect()
    }

    /// A single parameter in its external representation.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<ParamValue> {
        let v = self.params_internal.get(name)?;
        Some(self.distributions.get(name)?.to_external(*v))
    }

    /// The largest reported step.
    #[must_use]
    pub fn latest_step(&self) -> Option<u64> {
        self.intermediate_values.keys().next_back().copied()
    }

    /// The value reported at [`latest_step`](Self::latest_step).
    #[must_use]
    pub fn last_intermediate_value(&self) -> Option<f64> {
        self.intermediate_values.values().next_back().copied()
    }

    /// Whether the trial is in a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }
}

/// The live handle an objective uses to request parameters and report progress.
///
/// Every mutation goes through the study's storage, so the handle itself is
/// cheap and holds no trial data beyond the cached joint sample of the
/// relative sampler and any enqueued parameter overrides.
pub struct Trial {
    study: Study,
    id: u64,
    number: u64,
    relative_search_space: SearchSpace,
    relative_params: HashMap<String, f64>,
    fixed_params: HashMap<String, ParamValue>,
}

impl core::fmt::Debug for Trial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Trial")
            .field("id", &self.id)
            .field("number", &self.number)
            .field("relative_params", &self.relative_params)
            .field("fixed_params", &self.fixed_params)
            .finish_non_exhaustive()
    }
}

impl Trial {
    pub(crate) fn new(study: Study, id: u64, number: u64) -> Self {
        Self {
            study,
            id,
            number,
            relative_search_space: SearchSpace::new(),
            relative_params: HashMap::new(),
            fixed_params: HashMap::new(),
        }
    }

    pub(crate) fn set_relative(&mut self, space: SearchSpace, params: HashMap<String, f64>) {
        self.relative_search_space = space;
        self.relative_params = params;
    }

    pub(crate) fn set_fixed_params(&mut self, params: HashMap<String, ParamValue>) {
        self.fixed_params = params;
    }

    /// The storage id of this trial.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The 0-based position of this trial within its study.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// The study this trial belongs to.
    #[must_use]
    pub fn study(&self) -> &Study {
        &self.study
    }

    /// The cancellation signal of the running study.
    #[must_use]
    pub fn context(&self) -> &Context {
        self.study.context()
    }

    /// A fresh snapshot of this trial from storage.
    ///
    /// # Errors
    ///
    /// Propagates storage lookup errors.
    pub fn snapshot(&self) -> Result<FrozenTrial> {
        self.study.storage().get_trial(self.id)
    }

    /// The parameters suggested so far, in their external representation.
    ///
    /// # Errors
    ///
    /// Propagates storage lookup errors.
    pub fn params(&self) -> Result<BTreeMap<String, ParamValue>> {
        Ok(self.snapshot()?.params())
    }

    fn suggest(&self, name: &str, distribution: Distribution) -> Result<f64> {
        let snapshot = self.snapshot()?;
        if let Some(existing) = snapshot.distributions.get(name) {
            if *existing != distribution {
                return Err(Error::ParameterConflict {
                    name: name.to_string(),
                    reason: format!("already suggested from {existing:?}"),
                });
            }
            if let Some(&v) = snapshot.params_internal.get(name) {
                return Ok(v);
            }
        }

        let v = if let Some(v) = self.fixed_value(name, &distribution) {
            v
        } else if let Some(v) = self.relative_value(name, &distribution) {
            v
        } else {
            self.study
                .sampler()
                .sample(&self.study, &snapshot, name, &distribution)?
        };

        self.study
            .storage()
            .set_trial_param(self.id, name, v, &distribution)?;
        Ok(v)
    }

    fn relative_value(&self, name: &str, distribution: &Distribution) -> Option<f64> {
        if self.relative_search_space.get(name) != Some(distribution) {
            return None;
        }
        self.relative_params.get(name).copied()
    }

    fn fixed_value(&self, name: &str, distribution: &Distribution) -> Option<f64> {
        let value = self.fixed_params.get(name)?;
        match distribution.to_internal(value) {
            Ok(v) if distribution.contains(v) => Some(v),
            Ok(v) => {
                trace_warn!(
                    param = name,
                    value = v,
                    "enqueued value lies outside the distribution; using it anyway"
                );
                Some(v)
            }
            Err(_err) => {
                trace_warn!(param = name, error = %_err, "ignoring enqueued value");
                None
            }
        }
    }

    /// Suggest a value from `[low, high)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if `low > high`, a
    /// [`Error::ParameterConflict`] if `name` was suggested from a different
    /// distribution, and any sampler or storage error.
    pub fn suggest_uniform(&self, name: &str, low: f64, high: f64) -> Result<f64> {
        let d = Distribution::Uniform(UniformDistribution::new(low, high)?);
        self.suggest(name, d)
    }

    /// Alias for [`suggest_uniform`](Self::suggest_uniform).
    ///
    /// # Errors
    ///
    /// Same as [`suggest_uniform`](Self::suggest_uniform).
    pub fn suggest_float(&self, name: &str, low: f64, high: f64) -> Result<f64> {
        self.suggest_uniform(name, low, high)
    }

    /// Suggest a value from `[low, high)` sampled in log space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLogBounds`] if `low <= 0`, plus the errors of
    /// [`suggest_uniform`](Self::suggest_uniform).
    pub fn suggest_loguniform(&self, name: &str, low: f64, high: f64) -> Result<f64> {
        let d = Distribution::LogUniform(LogUniformDistribution::new(low, high)?);
        self.suggest(name, d)
    }

    /// Alias for [`suggest_loguniform`](Self::suggest_loguniform).
    ///
    /// # Errors
    ///
    /// Same as [`suggest_loguniform`](Self::suggest_loguniform).
    pub fn suggest_log_float(&self, name: &str, low: f64, high: f64) -> Result<f64> {
        self.suggest_loguniform(name, low, high)
    }

    /// Suggest a value from the grid `{low, low + q, ...}` capped at `high`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStep`] if `q <= 0`, plus the errors of
    /// [`suggest_uniform`](Self::suggest_uniform).
    pub fn suggest_discrete_uniform(&self, name: &str, low: f64, high: f64, q: f64) -> Result<f64> {
        let distribution = DiscreteUniformDistribution::new(low, high, q)?;
        let v = self.suggest(name, Distribution::DiscreteUniform(distribution.clone()))?;
        Ok(Distribution::DiscreteUniform(distribution)
            .to_external(v)
            .as_f64()
            .unwrap_or(v))
    }

    /// Suggest an integer from `[low, high]`.
    ///
    /// # Errors
    ///
    /// Same as [`suggest_uniform`](Self::suggest_uniform).
    pub fn suggest_int(&self, name: &str, low: i64, high: i64) -> Result<i64> {
        let d = Distribution::IntUniform(IntUniformDistribution::new(low, high)?);
        self.suggest_integer(name, d)
    }

    /// Suggest an integer from `{low, low + step, ...}` capped at `high`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStep`] if `step <= 0`, plus the errors of
    /// [`suggest_uniform`](Self::suggest_uniform).
    pub fn suggest_step_int(&self, name: &str, low: i64, high: i64, step: i64) -> Result<i64> {
        let d = Distribution::StepIntUniform(StepIntUniformDistribution::new(low, high, step)?);
        self.suggest_integer(name, d)
    }

    fn suggest_integer(&self, name: &str, distribution: Distribution) -> Result<i64> {
        let v = self.suggest(name, distribution.clone())?;
        distribution
            .to_external(v)
            .as_i64()
            .ok_or(Error::Internal("integer distribution produced a non-integer"))
    }

    /// Suggest one of `choices`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyChoices`] if `choices` is empty, plus the errors
    /// of [`suggest_uniform`](Self::suggest_uniform).
    pub fn suggest_categorical<S: Into<String>>(
        &self,
        name: &str,
        choices: impl IntoIterator<Item = S>,
    ) -> Result<String> {
        let d = Distribution::Categorical(CategoricalDistribution::new(choices)?);
        let v = self.suggest(name, d.clone())?;
        match d.to_external(v) {
            ParamValue::Categorical(label) => Ok(label),
            _ => Err(Error::Internal("categorical distribution produced a number")),
        }
    }

    /// Record an intermediate value at `step` and make it the trial's current value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] if the trial already finished.
    pub fn report(&self, step: u64, value: f64) -> Result<()> {
        let storage = self.study.storage();
        storage.set_trial_intermediate_value(self.id, step, value)?;
        storage.set_trial_value(self.id, value)
    }

    /// Ask the study's pruner whether this trial should stop.
    ///
    /// Returns `Ok(false)` when the study has no pruner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoIntermediateValues`] if nothing was reported yet,
    /// and any pruner or storage error.
    pub fn should_prune(&self) -> Result<bool> {
        let snapshot = self.snapshot()?;
        if snapshot.latest_step().is_none() {
            return Err(Error::NoIntermediateValues);
        }
        match self.study.pruner() {
            Some(pruner) => pruner.should_prune(&self.study, &snapshot),
            None => Ok(false),
        }
    }

    /// Set a user attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] if the trial already finished.
    pub fn set_user_attr(&self, key: &str, value: &str) -> Result<()> {
        self.study
            .storage()
            .set_trial_user_attr(self.id, key, value)
    }

    /// All user attributes.
    ///
    /// # Errors
    ///
    /// Propagates storage lookup errors.
    pub fn user_attrs(&self) -> Result<HashMap<String, String>> {
        Ok(self.snapshot()?.user_attrs)
    }

    /// Set a system attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotUpdatable`] if the trial already finished.
    pub fn set_system_attr(&self, key: &str, value: &str) -> Result<()> {
        self.study
            .storage()
            .set_trial_system_attr(self.id, key, value)
    }

    /// All system attributes.
    ///
    /// # Errors
    ///
    /// Propagates storage lookup errors.
    pub fn system_attrs(&self) -> Result<HashMap<String, String>> {
        Ok(self.snapshot()?.system_attrs)
    }
}
