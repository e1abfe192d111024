use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::RwLock;

use super::{Storage, StudyRecord, apply_param, apply_state, check_updatable};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::study::StudySummary;
use crate::trial::FrozenTrial;
use crate::types::{Direction, TrialState};

const BLACK_HOLE_STUDY_ID: u64 = 0;

/// A bounded storage that forgets old finished trials.
///
/// Running trials are always kept. Finished trials go into a ring of
/// `capacity` entries; when it overflows the oldest finished trial is
/// evicted. Afterwards:
///
/// - [`get_trial`](Storage::get_trial) on an evicted id returns
///   [`Error::TrialsAlreadyDeleted`],
/// - [`get_all_trials`](Storage::get_all_trials) returns
///   [`Error::TrialsPartiallyDeleted`] carrying the surviving trials.
///
/// The best complete trial is remembered separately, so
/// [`get_best_trial`](Storage::get_best_trial) keeps working after its
/// record was evicted.
///
/// # Examples
///
/// ```
/// use hypertune::storage::{BlackHoleStorage, Storage};
/// use hypertune::{Error, TrialState};
///
/// let storage = BlackHoleStorage::new(1);
/// let study = storage.create_new_study("").unwrap();
/// for v in [3.0, 1.0] {
///     let id = storage.create_new_trial(study).unwrap();
///     storage.set_trial_value(id, v).unwrap();
///     storage.set_trial_state(id, TrialState::Complete).unwrap();
/// }
/// assert!(matches!(storage.get_trial(0), Err(Error::TrialsAlreadyDeleted)));
/// assert_eq!(storage.get_best_trial(study).unwrap().value, Some(1.0));
/// ```
#[derive(Debug)]
pub struct BlackHoleStorage {
    capacity: usize,
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    study: Option<StudyRecord>,
    running: BTreeMap<u64, FrozenTrial>,
    finished: VecDeque<FrozenTrial>,
    next_number: u64,
    n_evicted: u64,
    best: Option<FrozenTrial>,
}

impl Inner {
    fn study(&self, study_id: u64) -> Result<&StudyRecord> {
        self.study
            .as_ref()
            .filter(|s| s.id == study_id)
            .ok_or(Error::InvalidStudyId)
    }

    fn study_mut(&mut self, study_id: u64) -> Result<&mut StudyRecord> {
        self.study
            .as_mut()
            .filter(|s| s.id == study_id)
            .ok_or(Error::InvalidStudyId)
    }

    fn missing(&self, trial_id: u64) -> Error {
        if trial_id < self.next_number {
            Error::TrialsAlreadyDeleted
        } else {
            Error::InvalidTrialId
        }
    }

    fn find(&self, trial_id: u64) -> Result<&FrozenTrial> {
        if let Some(t) = self.running.get(&trial_id) {
            return Ok(t);
        }
        self.finished
            .iter()
            .find(|t| t.id == trial_id)
            .ok_or_else(|| self.missing(trial_id))
    }

    fn running_mut(&mut self, trial_id: u64) -> Result<&mut FrozenTrial> {
        if self.running.contains_key(&trial_id) {
            return self.running.get_mut(&trial_id).ok_or(Error::InvalidTrialId);
        }
        if self.finished.iter().any(|t| t.id == trial_id) {
            return Err(Error::TrialNotUpdatable);
        }
        Err(self.missing(trial_id))
    }

    fn insert(&mut self, mut trial: FrozenTrial, capacity: usize) -> u64 {
        let id = self.next_number;
        self.next_number += 1;
        trial.id = id;
        trial.number = id;
        trial.study_id = BLACK_HOLE_STUDY_ID;
        if trial.state.is_finished() {
            self.archive(trial, capacity);
        } else {
            self.running.insert(id, trial);
        }
        id
    }

    fn archive(&mut self, trial: FrozenTrial, capacity: usize) {
        let direction = self
            .study
            .as_ref()
            .map_or(Direction::Minimize, |s| s.direction);
        if trial.state == TrialState::Complete
            && let Some(value) = trial.value
        {
            let improves = self
                .best
                .as_ref()
                .and_then(|b| b.value)
                .is_none_or(|best| direction.is_better(value, best));
            if improves {
                self.best = Some(trial.clone());
            }
        }
        self.finished.push_back(trial);
        while self.finished.len() > capacity {
            self.finished.pop_front();
            self.n_evicted += 1;
        }
    }
}

impl BlackHoleStorage {
    /// A storage keeping at most `capacity` finished trials (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of finished trials evicted so far.
    #[must_use]
    pub fn n_evicted(&self) -> u64 {
        self.inner.read().n_evicted
    }

    fn update_running(
        &self,
        trial_id: u64,
        f: impl FnOnce(&mut FrozenTrial) -> Result<()>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        f(inner.running_mut(trial_id)?)
    }
}

impl Storage for BlackHoleStorage {
    fn create_new_study(&self, name: &str) -> Result<u64> {
        let mut inner = self.inner.write();
        if let Some(existing) = &inner.study {
            if existing.name == name {
                return Err(Error::DuplicatedStudy(name.to_string()));
            }
            return Err(Error::Storage(format!(
                "black-hole storage already holds study '{}'",
                existing.name
            )));
        }
        inner.study = Some(StudyRecord::new(BLACK_HOLE_STUDY_ID, name));
        Ok(BLACK_HOLE_STUDY_ID)
    }

    fn delete_study(&self, study_id: u64) -> Result<()> {
        let mut inner = self.inner.write();
        inner.study(study_id)?;
        *inner = Inner::default();
        Ok(())
    }

    fn get_study_id_from_name(&self, name: &str) -> Result<u64> {
        let inner = self.inner.read();
        inner
            .study
            .as_ref()
            .filter(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| Error::StudyNotFound(name.to_string()))
    }

    fn get_study_id_from_trial_id(&self, trial_id: u64) -> Result<u64> {
        Ok(self.inner.read().find(trial_id)?.study_id)
    }

    fn get_study_name_from_id(&self, study_id: u64) -> Result<String> {
        Ok(self.inner.read().study(study_id)?.name.clone())
    }

    fn set_study_direction(&self, study_id: u64, direction: Direction) -> Result<()> {
        self.inner.write().study_mut(study_id)?.direction = direction;
        Ok(())
    }

    fn get_study_direction(&self, study_id: u64) -> Result<Direction> {
        Ok(self.inner.read().study(study_id)?.direction)
    }

    fn set_study_user_attr(&self, study_id: u64, key: &str, value: &str) -> Result<()> {
        self.inner
            .write()
            .study_mut(study_id)?
            .user_attrs
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_study_system_attr(&self, study_id: u64, key: &str, value: &str) -> Result<()> {
        self.inner
            .write()
            .study_mut(study_id)?
            .system_attrs
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_study_user_attrs(&self, study_id: u64) -> Result<HashMap<String, String>> {
        Ok(self.inner.read().study(study_id)?.user_attrs.clone())
    }

    fn get_study_system_attrs(&self, study_id: u64) -> Result<HashMap<String, String>> {
        Ok(self.inner.read().study(study_id)?.system_attrs.clone())
    }

    fn get_all_study_summaries(&self) -> Result<Vec<StudySummary>> {
        let inner = self.inner.read();
        let Some(study) = &inner.study else {
            return Ok(Vec::new());
        };
        let trials: Vec<FrozenTrial> = inner
            .finished
            .iter()
            .chain(inner.running.values())
            .cloned()
            .collect();
        Ok(vec![study.summary(inner.best.clone(), &trials)])
    }

    fn create_new_trial(&self, study_id: u64) -> Result<u64> {
        let mut inner = self.inner.write();
        inner.study(study_id)?;
        Ok(inner.insert(FrozenTrial::new(0, study_id, 0), self.capacity))
    }

    fn clone_trial(&self, study_id: u64, template: &FrozenTrial) -> Result<u64> {
        let mut inner = self.inner.write();
        inner.study(study_id)?;
        Ok(inner.insert(template.clone(), self.capacity))
    }

    fn set_trial_value(&self, trial_id: u64, value: f64) -> Result<()> {
        self.update_running(trial_id, |t| {
            check_updatable(t)?;
            t.value = Some(value);
            Ok(())
        })
    }

    fn set_trial_intermediate_value(&self, trial_id: u64, step: u64, value: f64) -> Result<()> {
        self.update_running(trial_id, |t| {
            check_updatable(t)?;
            t.intermediate_values.insert(step, value);
            Ok(())
        })
    }

    fn set_trial_param(
        &self,
        trial_id: u64,
        name: &str,
        internal: f64,
        distribution: &Distribution,
    ) -> Result<()> {
        self.update_running(trial_id, |t| apply_param(t, name, internal, distribution))
    }

    fn set_trial_state(&self, trial_id: u64, state: TrialState) -> Result<()> {
        let mut inner = self.inner.write();
        apply_state(inner.running_mut(trial_id)?, state)?;
        if state.is_finished()
            && let Some(trial) = inner.running.remove(&trial_id)
        {
            inner.archive(trial, self.capacity);
        }
        Ok(())
    }

    fn set_trial_user_attr(&self, trial_id: u64, key: &str, value: &str) -> Result<()> {
        self.update_running(trial_id, |t| {
            t.user_attrs.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn set_trial_system_attr(&self, trial_id: u64, key: &str, value: &str) -> Result<()> {
        self.update_running(trial_id, |t| {
            t.system_attrs.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn get_trial(&self, trial_id: u64) -> Result<FrozenTrial> {
        self.inner.read().find(trial_id).cloned()
    }

    fn get_all_trials(&self, study_id: u64) -> Result<Vec<FrozenTrial>> {
        let inner = self.inner.read();
        inner.study(study_id)?;
        let mut trials: Vec<FrozenTrial> = inner
            .finished
            .iter()
            .chain(inner.running.values())
            .cloned()
            .collect();
        trials.sort_by_key(|t| t.number);
        if inner.n_evicted > 0 {
            return Err(Error::TrialsPartiallyDeleted(trials));
        }
        Ok(trials)
    }

    fn get_best_trial(&self, study_id: u64) -> Result<FrozenTrial> {
        let inner = self.inner.read();
        inner.study(study_id)?;
        inner.best.clone().ok_or(Error::NoCompletedTrials)
    }
}
