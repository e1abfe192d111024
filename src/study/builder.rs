use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::SyncSender;

use parking_lot::Mutex;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::pruner::Pruner;
use crate::sampler::{RandomSampler, RelativeSampler, Sampler, SearchSpace};
use crate::storage::{InMemoryStorage, Storage};
use crate::trial::FrozenTrial;
use crate::types::Direction;

use super::Study;

/// A builder for constructing [`Study`] instances with a fluent API.
///
/// Created via [`Study::builder()`]. Collects the storage, samplers, pruner
/// and driver options before creating (or loading) the study in storage.
///
/// # Defaults
///
/// - Name: blank, so the storage generates one
/// - Direction: [`Minimize`](Direction::Minimize)
/// - Storage: a fresh [`InMemoryStorage`]
/// - Sampler: [`RandomSampler`]
/// - Relative sampler and pruner: none
/// - `ignore_error`: `false`
///
/// # Examples
///
/// ```
/// use hypertune::prelude::*;
///
/// let study = Study::builder()
///     .name("tuning")
///     .maximize()
///     .sampler(TpeSampler::new())
///     .pruner(MedianPruner::new())
///     .build()
///     .unwrap();
///
/// assert_eq!(study.name(), "tuning");
/// assert_eq!(study.direction(), Direction::Maximize);
/// ```
pub struct StudyBuilder {
    name: String,
    direction: Direction,
    storage: Option<Arc<dyn Storage>>,
    sampler: Option<Arc<dyn Sampler>>,
    relative_sampler: Option<Arc<dyn RelativeSampler>>,
    pruner: Option<Arc<dyn Pruner>>,
    ignore_error: bool,
    trial_notify: Option<SyncSender<FrozenTrial>>,
    context: Context,
    load_if_exists: bool,
    search_space: Option<SearchSpace>,
}

impl StudyBuilder {
    pub(super) fn new() -> Self {
        Self {
            name: String::new(),
            direction: Direction::Minimize,
            storage: None,
            sampler: None,
            relative_sampler: None,
            pruner: None,
            ignore_error: false,
            trial_notify: None,
            context: Context::new(),
            load_if_exists: false,
            search_space: None,
        }
    }

    /// Set the study name. A blank name lets the storage pick one.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the optimization direction to minimize (the default).
    #[must_use]
    pub fn minimize(mut self) -> Self {
        self.direction = Direction::Minimize;
        self
    }

    /// Set the optimization direction to maximize.
    #[must_use]
    pub fn maximize(mut self) -> Self {
        self.direction = Direction::Maximize;
        self
    }

    /// Set the optimization direction explicitly.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the storage backend.
    #[must_use]
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    /// Share an existing storage, for instance with another study handle.
    #[must_use]
    pub fn shared_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the independent sampler used for every parameter the relative
    /// sampler does not cover.
    #[must_use]
    pub fn sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Set a relative sampler, asked once per trial for a joint sample.
    #[must_use]
    pub fn relative_sampler(mut self, sampler: impl RelativeSampler + 'static) -> Self {
        self.relative_sampler = Some(Arc::new(sampler));
        self
    }

    /// Set the pruner consulted by [`Trial::should_prune`](crate::Trial::should_prune).
    #[must_use]
    pub fn pruner(mut self, pruner: impl Pruner + 'static) -> Self {
        self.pruner = Some(Arc::new(pruner));
        self
    }

    /// Record failing objectives as `Fail` and keep going instead of
    /// returning the error.
    #[must_use]
    pub fn ignore_error(mut self, ignore: bool) -> Self {
        self.ignore_error = ignore;
        self
    }

    /// Send a snapshot of every finished trial on `sender`.
    ///
    /// A full channel blocks the worker until the receiver catches up. A
    /// dropped receiver is logged and otherwise ignored.
    #[must_use]
    pub fn trial_notify_channel(mut self, sender: SyncSender<FrozenTrial>) -> Self {
        self.trial_notify = Some(sender);
        self
    }

    /// Attach a cancellation context.
    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Reuse the study if one with the same name already exists.
    #[must_use]
    pub fn load_if_exists(mut self, load: bool) -> Self {
        self.load_if_exists = load;
        self
    }

    /// Declare the search space handed to the relative sampler instead of
    /// inferring it from completed trials.
    #[must_use]
    pub fn define_search_space(mut self, space: SearchSpace) -> Self {
        self.search_space = Some(space);
        self
    }

    /// Create the study in storage and return its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatedStudy`] if the name is taken and
    /// `load_if_exists` is off, or any storage error.
    pub fn build(mut self) -> Result<Study> {
        let storage = self.take_storage();
        let id = match storage.create_new_study(&self.name) {
            Ok(id) => {
                storage.set_study_direction(id, self.direction)?;
                id
            }
            Err(Error::DuplicatedStudy(name)) if self.load_if_exists => {
                trace_info!(study = %name, "loading existing study");
                let id = storage.get_study_id_from_name(&name)?;
                self.direction = storage.get_study_direction(id)?;
                id
            }
            Err(e) => return Err(e),
        };
        Ok(self.finish(storage, id))
    }

    /// Attach to an existing study by name. Its direction is read from storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] if the storage has no such study.
    pub fn load(mut self) -> Result<Study> {
        let storage = self.take_storage();
        let id = storage.get_study_id_from_name(&self.name)?;
        self.direction = storage.get_study_direction(id)?;
        Ok(self.finish(storage, id))
    }

    fn take_storage(&mut self) -> Arc<dyn Storage> {
        self.storage
            .take()
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()))
    }

    fn finish(self, storage: Arc<dyn Storage>, id: u64) -> Study {
        let name = storage.get_study_name_from_id(id).unwrap_or(self.name);
        Study {
            id,
            name,
            direction: self.direction,
            storage,
            sampler: self
                .sampler
                .unwrap_or_else(|| Arc::new(RandomSampler::new())),
            relative_sampler: self.relative_sampler,
            pruner: self.pruner,
            context: self.context,
            ignore_error: self.ignore_error,
            trial_notify: self.trial_notify,
            enqueued: Arc::new(Mutex::new(VecDeque::new())),
            defined_search_space: self.search_space.map(Arc::new),
        }
    }
}

impl Default for StudyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
