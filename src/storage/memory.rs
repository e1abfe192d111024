use std::collections::HashMap;

use parking_lot::RwLock;

use super::{Storage, StudyRecord, apply_param, apply_state, best_trial_of, check_updatable};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::study::StudySummary;
use crate::trial::FrozenTrial;
use crate::types::{Direction, TrialState};

/// The id of the single study held by an [`InMemoryStorage`].
pub(crate) const IN_MEMORY_STUDY_ID: u64 = 0;

/// In-memory storage for a single study (the default).
///
/// Trials live in a dense `Vec` where a trial's id equals its number.
/// Readers share a [`RwLock`]; writers exclude each other.
///
/// # Examples
///
/// ```
/// use hypertune::storage::{InMemoryStorage, Storage};
///
/// let storage = InMemoryStorage::new();
/// let study_id = storage.create_new_study("example").unwrap();
/// let trial_id = storage.create_new_trial(study_id).unwrap();
/// assert_eq!(storage.get_trial(trial_id).unwrap().number, 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    study: Option<StudyRecord>,
    trials: Vec<FrozenTrial>,
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

    fn trial_mut(&mut self, trial_id: u64) -> Result<&mut FrozenTrial> {
        usize::try_from(trial_id)
            .ok()
            .and_then(|i| self.trials.get_mut(i))
            .ok_or(Error::InvalidTrialId)
    }

    fn push_trial(&mut self, mut trial: FrozenTrial) -> u64 {
        let id = self.trials.len() as u64;
        trial.id = id;
        trial.number = id;
        trial.study_id = IN_MEMORY_STUDY_ID;
        self.trials.push(trial);
        id
    }
}

impl InMemoryStorage {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn update_trial(
        &self,
        trial_id: u64,
        f: impl FnOnce(&mut FrozenTrial) -> Result<()>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        f(inner.trial_mut(trial_id)?)
    }
}

impl Storage for InMemoryStorage {
    fn create_new_study(&self, name: &str) -> Result<u64> {
        let mut inner = self.inner.write();
        if let Some(existing) = &inner.study {
            if existing.name == name {
                return Err(Error::DuplicatedStudy(name.to_string()));
            }
            return Err(Error::Storage(format!(
                "in-memory storage already holds study '{}'",
                existing.name
            )));
        }
        inner.study = Some(StudyRecord::new(IN_MEMORY_STUDY_ID, name));
        Ok(IN_MEMORY_STUDY_ID)
    }

    fn delete_study(&self, study_id: u64) -> Result<()> {
        let mut inner = self.inner.write();
        inner.study(study_id)?;
        inner.study = None;
        inner.trials.clear();
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
        let inner = self.inner.read();
        usize::try_from(trial_id)
            .ok()
            .and_then(|i| inner.trials.get(i))
            .map(|t| t.study_id)
            .ok_or(Error::InvalidTrialId)
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
        let best = best_trial_of(&inner.trials, study.direction).ok();
        Ok(vec![study.summary(best, &inner.trials)])
    }

    fn create_new_trial(&self, study_id: u64) -> Result<u64> {
        let mut inner = self.inner.write();
        inner.study(study_id)?;
        Ok(inner.push_trial(FrozenTrial::new(0, study_id, 0)))
    }

    fn clone_trial(&self, study_id: u64, template: &FrozenTrial) -> Result<u64> {
        let mut inner = self.inner.write();
        inner.study(study_id)?;
        Ok(inner.push_trial(template.clone()))
    }

    fn set_trial_value(&self, trial_id: u64, value: f64) -> Result<()> {
        self.update_trial(trial_id, |t| {
            check_updatable(t)?;
            t.value = Some(value);
            Ok(())
        })
    }

    fn set_trial_intermediate_value(&self, trial_id: u64, step: u64, value: f64) -> Result<()> {
        self.update_trial(trial_id, |t| {
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
        self.update_trial(trial_id, |t| apply_param(t, name, internal, distribution))
    }

    fn set_trial_state(&self, trial_id: u64, state: TrialState) -> Result<()> {
        self.update_trial(trial_id, |t| apply_state(t, state))
    }

    fn set_trial_user_attr(&self, trial_id: u64, key: &str, value: &str) -> Result<()> {
        self.update_trial(trial_id, |t| {
            check_updatable(t)?;
            t.user_attrs.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn set_trial_system_attr(&self, trial_id: u64, key: &str, value: &str) -> Result<()> {
        self.update_trial(trial_id, |t| {
            check_updatable(t)?;
            t.system_attrs.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn get_trial(&self, trial_id: u64) -> Result<FrozenTrial> {
        let inner = self.inner.read();
        usize::try_from(trial_id)
            .ok()
            .and_then(|i| inner.trials.get(i))
            .cloned()
            .ok_or(Error::InvalidTrialId)
    }

    fn get_all_trials(&self, study_id: u64) -> Result<Vec<FrozenTrial>> {
        let inner = self.inner.read();
        inner.study(study_id)?;
        Ok(inner.trials.clone())
    }
}
