//! Study implementation for managing optimization trials.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::mpsc::SyncSender;

use parking_lot::Mutex;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::pruner::Pruner;
use crate::sampler::{RelativeSampler, Sampler, SearchSpace};
use crate::storage::{Storage, tolerate_eviction};
use crate::trial::FrozenTrial;
use crate::types::Direction;

#[cfg(feature = "async")]
mod async_impl;
mod builder;
mod optimize;
mod summary;

pub use builder::StudyBuilder;
pub use summary::StudySummary;

/// A study drives the optimization process over a shared storage.
///
/// `Study` is a cheap handle: cloning it shares the storage, samplers,
/// pruner, enqueue queue and cancellation context. Several threads may run
/// [`optimize`](Self::optimize) on clones of one study at the same time;
/// they only contend through the storage.
///
/// # Examples
///
/// ```
/// use hypertune::{Direction, Study};
///
/// let study = Study::builder().maximize().build().unwrap();
/// assert_eq!(study.direction(), Direction::Maximize);
/// ```
#[derive(Clone)]
pub struct Study {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) direction: Direction,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) sampler: Arc<dyn Sampler>,
    pub(crate) relative_sampler: Option<Arc<dyn RelativeSampler>>,
    pub(crate) pruner: Option<Arc<dyn Pruner>>,
    pub(crate) context: Context,
    pub(crate) ignore_error: bool,
    pub(crate) trial_notify: Option<SyncSender<FrozenTrial>>,
    pub(crate) enqueued: Arc<Mutex<VecDeque<HashMap<String, ParamValue>>>>,
    pub(crate) defined_search_space: Option<Arc<SearchSpace>>,
}

impl core::fmt::Debug for Study {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Study")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("ignore_error", &self.ignore_error)
            .field("has_relative_sampler", &self.relative_sampler.is_some())
            .field("has_pruner", &self.pruner.is_some())
            .finish_non_exhaustive()
    }
}

impl Study {
    /// Return a [`StudyBuilder`] for constructing a study with a fluent API.
    #[must_use]
    pub fn builder() -> StudyBuilder {
        StudyBuilder::new()
    }

    /// Create a study named `name` with every other option at its default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatedStudy`] if the name is taken.
    pub fn create(name: &str) -> Result<Self> {
        Self::builder().name(name).build()
    }

    /// Attach a cancellation context.
    ///
    /// Workers stop before starting another trial once it fires; objectives
    /// may poll it through [`Trial::context`](crate::Trial::context).
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// The storage id of the study.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The study name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The optimization direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The storage backing this study.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The independent sampler.
    #[must_use]
    pub fn sampler(&self) -> &Arc<dyn Sampler> {
        &self.sampler
    }

    /// The relative sampler, if any.
    #[must_use]
    pub fn relative_sampler(&self) -> Option<&Arc<dyn RelativeSampler>> {
        self.relative_sampler.as_ref()
    }

    /// The pruner, if any.
    #[must_use]
    pub fn pruner(&self) -> Option<&Arc<dyn Pruner>> {
        self.pruner.as_ref()
    }

    /// The cancellation context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The search space declared at build time, if any.
    #[must_use]
    pub fn defined_search_space(&self) -> Option<&SearchSpace> {
        self.defined_search_space.as_deref()
    }

    /// Every trial of the study, ordered by number.
    ///
    /// Trials evicted by a bounded storage are silently missing.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn get_trials(&self) -> Result<Vec<FrozenTrial>> {
        let mut trials = tolerate_eviction(self.storage.get_all_trials(self.id))?;
        trials.sort_by_key(|t| t.number);
        Ok(trials)
    }

    /// Number of trials currently stored.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn n_trials(&self) -> Result<usize> {
        Ok(self.get_trials()?.len())
    }

    /// The best complete trial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompletedTrials`] if none completed.
    pub fn get_best_trial(&self) -> Result<FrozenTrial> {
        self.storage.get_best_trial(self.id)
    }

    /// The objective value of the best trial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompletedTrials`] if none completed.
    pub fn get_best_value(&self) -> Result<f64> {
        self.get_best_trial()?
            .value
            .ok_or(Error::Internal("complete trial without a value"))
    }

    /// The parameters of the best trial in their external representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompletedTrials`] if none completed.
    pub fn get_best_params(&self) -> Result<BTreeMap<String, ParamValue>> {
        Ok(self.get_best_trial()?.params())
    }

    /// Queue a parameter assignment for one of the next trials.
    ///
    /// The next trial to start pops the front of the queue; each listed
    /// parameter then takes the given value instead of a sampled one.
    /// Parameters not listed are sampled as usual.
    ///
    /// # Examples
    ///
    /// ```
    /// use hypertune::prelude::*;
    ///
    /// let study = Study::builder().build().unwrap();
    /// study.enqueue_trial([("x", ParamValue::Float(0.25))]);
    /// study
    ///     .optimize(1, |trial: &Trial| {
    ///         let x = trial.suggest_uniform("x", 0.0, 1.0)?;
    ///         Ok::<_, Error>(x)
    ///     })
    ///     .unwrap();
    /// assert_eq!(study.get_best_value().unwrap(), 0.25);
    /// ```
    pub fn enqueue_trial<K, V>(&self, params: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let params = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.enqueued.lock().push_back(params);
    }

    /// Number of queued parameter assignments not yet consumed.
    #[must_use]
    pub fn n_enqueued(&self) -> usize {
        self.enqueued.lock().len()
    }

    /// Set a study-level user attribute.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn set_user_attr(&self, key: &str, value: &str) -> Result<()> {
        self.storage.set_study_user_attr(self.id, key, value)
    }

    /// Set a study-level system attribute.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn set_system_attr(&self, key: &str, value: &str) -> Result<()> {
        self.storage.set_study_system_attr(self.id, key, value)
    }

    /// All study-level user attributes.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn get_user_attrs(&self) -> Result<HashMap<String, String>> {
        self.storage.get_study_user_attrs(self.id)
    }

    /// All study-level system attributes.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn get_system_attrs(&self) -> Result<HashMap<String, String>> {
        self.storage.get_study_system_attrs(self.id)
    }

    /// The storage summary of this study.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] if the storage no longer holds it.
    pub fn summary(&self) -> Result<StudySummary> {
        self.storage
            .get_all_study_summaries()?
            .into_iter()
            .find(|s| s.id == self.id)
            .ok_or_else(|| Error::StudyNotFound(self.name.clone()))
    }
}
