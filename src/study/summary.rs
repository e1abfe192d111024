use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::trial::FrozenTrial;
use crate::types::Direction;

/// An overview of one stored study.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudySummary {
    /// Storage id.
    pub id: u64,
    /// Study name.
    pub name: String,
    /// Optimization direction.
    pub direction: Direction,
    /// The best complete trial, if any.
    pub best_trial: Option<FrozenTrial>,
    /// Study-level user attributes.
    pub user_attrs: HashMap<String, String>,
    /// Study-level system attributes.
    pub system_attrs: HashMap<String, String>,
    /// Start time of the earliest stored trial.
    pub datetime_start: Option<SystemTime>,
}
