//! Sub-metrics and Pareto-optimal trials.
//!
//! A study optimizes one scalar value, but an objective can record any
//! number of secondary metrics next to it with [`report_sub_metrics`]. They
//! are stored as system attributes keyed `sub_metric_value_<name>`, so every
//! storage backend keeps them without schema changes. After the run,
//! [`get_pareto_optimal_trials`] picks the complete trials that no other
//! complete trial dominates.
//!
//! A trial **dominates** another if it is at least as good in every metric
//! and strictly better in at least one.
//!
//! # Examples
//!
//! ```
//! use std::collections::HashMap;
//!
//! use hypertune::multi_objective::{get_pareto_optimal_trials, report_sub_metrics};
//! use hypertune::prelude::*;
//!
//! let study = Study::builder().sampler(RandomSampler::with_seed(1)).build().unwrap();
//! study
//!     .optimize(20, |trial: &Trial| {
//!         let x = trial.suggest_uniform("x", 0.0, 1.0)?;
//!         let metrics = HashMap::from([("cost".to_string(), x), ("loss".to_string(), 1.0 - x)]);
//!         report_sub_metrics(trial, &metrics)?;
//!         Ok::<_, Error>(x)
//!     })
//!     .unwrap();
//!
//! let front = get_pareto_optimal_trials(
//!     &study.get_trials().unwrap(),
//!     &["cost", "loss"],
//!     &[Direction::Minimize, Direction::Minimize],
//! )
//! .unwrap();
//! // cost + loss is constant, so no trial dominates another
//! assert_eq!(front.len(), 20);
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::study::Study;
use crate::trial::{FrozenTrial, Trial};
use crate::types::{Direction, TrialState};

/// Prefix of the system attribute keys holding sub-metric values.
pub const SUB_METRIC_PREFIX: &str = "sub_metric_value_";

fn sub_metric_key(name: &str) -> String {
    format!("{SUB_METRIC_PREFIX}{name}")
}

/// Record `metrics` as system attributes of `trial`.
///
/// # Errors
///
/// Propagates storage errors, for instance
/// [`Error::TrialNotUpdatable`] once the trial has finished.
pub fn report_sub_metrics(trial: &Trial, metrics: &HashMap<String, f64>) -> Result<()> {
    for (name, value) in metrics {
        trial.set_system_attr(&sub_metric_key(name), &value.to_string())?;
    }
    Ok(())
}

/// Record `metrics` as system attributes of `study`.
///
/// # Errors
///
/// Propagates storage errors.
pub fn report_study_sub_metrics(study: &Study, metrics: &HashMap<String, f64>) -> Result<()> {
    for (name, value) in metrics {
        study.set_system_attr(&sub_metric_key(name), &value.to_string())?;
    }
    Ok(())
}

/// Parse every sub-metric out of a system attribute map.
///
/// Attributes without the [`SUB_METRIC_PREFIX`] are ignored.
///
/// # Errors
///
/// Returns [`Error::InvalidParamValue`] if a sub-metric value is not a
/// float.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
///
/// use hypertune::multi_objective::get_sub_metrics;
///
/// let attrs = HashMap::from([
///     ("sub_metric_value_latency".to_string(), "12.5".to_string()),
///     ("other".to_string(), "x".to_string()),
/// ]);
/// let metrics = get_sub_metrics(&attrs).unwrap();
/// assert_eq!(metrics.len(), 1);
/// assert_eq!(metrics["latency"], 12.5);
/// ```
pub fn get_sub_metrics(system_attrs: &HashMap<String, String>) -> Result<BTreeMap<String, f64>> {
    system_attrs
        .iter()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(SUB_METRIC_PREFIX)?;
            Some(
                value
                    .parse::<f64>()
                    .map(|v| (name.to_string(), v))
                    .map_err(|e| {
                        Error::InvalidParamValue(format!("sub-metric '{name}' = '{value}': {e}"))
                    }),
            )
        })
        .collect()
}

/// The complete trials whose sub-metrics no other complete trial
/// dominates, in input order.
///
/// `metric_names[i]` is optimized in `directions[i]`.
///
/// # Errors
///
/// - [`Error::InvalidConfig`] if the two slices differ in length or are
///   empty.
/// - [`Error::InvalidParamValue`] if a complete trial lacks one of the
///   metrics or stores an unparsable value.
pub fn get_pareto_optimal_trials(
    trials: &[FrozenTrial],
    metric_names: &[&str],
    directions: &[Direction],
) -> Result<Vec<FrozenTrial>> {
    if metric_names.is_empty() || metric_names.len() != directions.len() {
        return Err(Error::InvalidConfig(format!(
            "{} metric names for {} directions",
            metric_names.len(),
            directions.len()
        )));
    }

    let complete: Vec<&FrozenTrial> = trials
        .iter()
        .filter(|t| t.state == TrialState::Complete)
        .collect();
    let losses = complete
        .iter()
        .map(|t| {
            let metrics = get_sub_metrics(&t.system_attrs)?;
            metric_names
                .iter()
                .zip(directions)
                .map(|(&name, direction)| {
                    metrics
                        .get(name)
                        .map(|&v| direction.sign() * v)
                        .ok_or_else(|| {
                            Error::InvalidParamValue(format!(
                                "trial {} has no '{name}' sub-metric",
                                t.number
                            ))
                        })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    Ok(complete
        .iter()
        .enumerate()
        .filter(|&(i, _)| {
            !losses
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && dominates(other, &losses[i]))
        })
        .map(|(_, t)| (*t).clone())
        .collect())
}

/// Whether `a` dominates `b`, both expressed as losses.
fn dominates(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(x, y)| x <= y) && a.iter().zip(b).any(|(x, y)| x < y)
}
