//! Parameter distribution types.
//!
//! Each variant describes a parameter domain and how values move between the
//! external representation seen by the objective ([`ParamValue`]) and the
//! internal `f64` encoding used by samplers and storages.
//!
//! | Variant | Domain | Internal encoding |
//! |---------|--------|-------------------|
//! | [`Uniform`](Distribution::Uniform) | `[low, high)` real | identity |
//! | [`LogUniform`](Distribution::LogUniform) | `[low, high)` real, `low > 0` | identity |
//! | [`DiscreteUniform`](Distribution::DiscreteUniform) | `{low, low+q, ..} <= high` | identity, snapped to grid |
//! | [`IntUniform`](Distribution::IntUniform) | integers in `[low, high]` | real, rounded half away from zero |
//! | [`StepIntUniform`](Distribution::StepIntUniform) | `{low, low+step, ..} <= high` | real, rounded to the step grid |
//! | [`Categorical`](Distribution::Categorical) | ordered labels | index as real |
//!
//! # JSON format
//!
//! Distributions serialize as a name tag plus the variant's fields:
//!
//! ```
//! use hypertune::distribution::{Distribution, UniformDistribution};
//!
//! let d = Distribution::Uniform(UniformDistribution::new(-1.0, 1.0).unwrap());
//! let json = d.to_json().unwrap();
//! assert_eq!(
//!     json,
//!     r#"{"name":"UniformDistribution","attributes":{"low":-1.0,"high":1.0}}"#
//! );
//! assert_eq!(Distribution::from_json(&json).unwrap(), d);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::param::ParamValue;

/// A continuous distribution over `[low, high)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformDistribution {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (exclusive unless `low == high`).
    pub high: f64,
}

impl UniformDistribution {
    /// Create a validated uniform distribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if `low > high` or a bound is NaN.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        check_bounds(low, high)?;
        Ok(Self { low, high })
    }
}

/// A continuous distribution over `[low, high)` sampled in log space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogUniformDistribution {
    /// Lower bound (inclusive, positive).
    pub low: f64,
    /// Upper bound (exclusive unless `low == high`).
    pub high: f64,
}

impl LogUniformDistribution {
    /// Create a validated log-uniform distribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if `low > high` and
    /// [`Error::InvalidLogBounds`] if `low <= 0`.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        check_bounds(low, high)?;
        if low <= 0.0 {
            return Err(Error::InvalidLogBounds);
        }
        Ok(Self { low, high })
    }
}

/// A real-valued grid `{low, low + q, ...}` capped at `high`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscreteUniformDistribution {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (inclusive).
    pub high: f64,
    /// Grid spacing.
    pub q: f64,
}

impl DiscreteUniformDistribution {
    /// Create a validated discrete-uniform distribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if `low > high` and
    /// [`Error::InvalidStep`] if `q <= 0`.
    pub fn new(low: f64, high: f64, q: f64) -> Result<Self> {
        check_bounds(low, high)?;
        if q.is_nan() || q <= 0.0 {
            return Err(Error::InvalidStep);
        }
        Ok(Self { low, high, q })
    }

    fn snap(&self, x: f64) -> f64 {
        let v = ((x - self.low) / self.q).round() * self.q + self.low;
        v.clamp(self.low, self.high)
    }
}

/// Integers in `[low, high]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntUniformDistribution {
    /// Lower bound (inclusive).
    pub low: i64,
    /// Upper bound (inclusive).
    pub high: i64,
}

impl IntUniformDistribution {
    /// Create a validated integer distribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if `low > high`.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(low: i64, high: i64) -> Result<Self> {
        if low > high {
            return Err(Error::InvalidBounds {
                low: low as f64,
                high: high as f64,
            });
        }
        Ok(Self { low, high })
    }
}

/// Integers `{low, low + step, ...}` capped at `high`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepIntUniformDistribution {
    /// Lower bound (inclusive).
    pub low: i64,
    /// Upper bound (inclusive).
    pub high: i64,
    /// Grid spacing.
    pub step: i64,
}

impl StepIntUniformDistribution {
    /// Create a validated stepped integer distribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if `low > high` and
    /// [`Error::InvalidStep`] if `step <= 0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(low: i64, high: i64, step: i64) -> Result<Self> {
        if low > high {
            return Err(Error::InvalidBounds {
                low: low as f64,
                high: high as f64,
            });
        }
        if step <= 0 {
            return Err(Error::InvalidStep);
        }
        Ok(Self { low, high, step })
    }

    /// Index of the largest grid point that does not exceed `high`.
    #[must_use]
    pub fn n_steps(&self) -> i64 {
        (self.high - self.low) / self.step
    }
}

/// An ordered list of labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalDistribution {
    /// The available choices.
    pub choices: Vec<String>,
}

impl CategoricalDistribution {
    /// Create a validated categorical distribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyChoices`] if `choices` is empty.
    pub fn new<S: Into<String>>(choices: impl IntoIterator<Item = S>) -> Result<Self> {
        let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
        if choices.is_empty() {
            return Err(Error::EmptyChoices);
        }
        Ok(Self { choices })
    }
}

/// Enum wrapping all parameter distribution types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "attributes")]
pub enum Distribution {
    /// A continuous distribution.
    #[serde(rename = "UniformDistribution")]
    Uniform(UniformDistribution),
    /// A continuous distribution in log space.
    #[serde(rename = "LogUniformDistribution")]
    LogUniform(LogUniformDistribution),
    /// A real grid.
    #[serde(rename = "DiscreteUniformDistribution")]
    DiscreteUniform(DiscreteUniformDistribution),
    /// An integer range.
    #[serde(rename = "IntUniformDistribution")]
    IntUniform(IntUniformDistribution),
    /// A stepped integer range.
    #[serde(rename = "StepIntUniformDistribution")]
    StepIntUniform(StepIntUniformDistribution),
    /// A list of labels.
    #[serde(rename = "CategoricalDistribution")]
    Categorical(CategoricalDistribution),
}

impl Distribution {
    /// The tag used in the JSON encoding.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Uniform(_) => "UniformDistribution",
            Distribution::LogUniform(_) => "LogUniformDistribution",
            Distribution::DiscreteUniform(_) => "DiscreteUniformDistribution",
            Distribution::IntUniform(_) => "IntUniformDistribution",
            Distribution::StepIntUniform(_) => "StepIntUniformDistribution",
            Distribution::Categorical(_) => "CategoricalDistribution",
        }
    }

    /// Whether the domain holds exactly one value.
    #[must_use]
    pub fn single(&self) -> bool {
        match self {
            Distribution::Uniform(d) => d.low == d.high,
            Distribution::LogUniform(d) => d.low == d.high,
            Distribution::DiscreteUniform(d) => d.low == d.high || d.high - d.low < d.q,
            Distribution::IntUniform(d) => d.low == d.high,
            Distribution::StepIntUniform(d) => d.low == d.high || d.high - d.low < d.step,
            Distribution::Categorical(d) => d.choices.len() == 1,
        }
    }

    /// Whether the internal value `x` belongs to the domain.
    ///
    /// Continuous domains are half-open `[low, high)`; every other domain is
    /// closed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn contains(&self, x: f64) -> bool {
        match self {
            Distribution::Uniform(UniformDistribution { low, high })
            | Distribution::LogUniform(LogUniformDistribution { low, high }) => {
                if low == high {
                    x == *low
                } else {
                    *low <= x && x < *high
                }
            }
            Distribution::DiscreteUniform(d) => d.low <= x && x <= d.high,
            Distribution::IntUniform(IntUniformDistribution { low, high })
            | Distribution::StepIntUniform(StepIntUniformDistribution { low, high, .. }) => {
                *low as f64 <= x && x <= *high as f64
            }
            Distribution::Categorical(d) => 0.0 <= x && x <= (d.choices.len() - 1) as f64,
        }
    }

    /// Convert an internal value to its external representation.
    ///
    /// Integer domains round half away from zero and snap to their grid;
    /// categorical indices are clamped into range.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn to_external(&self, x: f64) -> ParamValue {
        match self {
            Distribution::Uniform(_) | Distribution::LogUniform(_) => ParamValue::Float(x),
            Distribution::DiscreteUniform(d) => ParamValue::Float(d.snap(x)),
            Distribution::IntUniform(_) => ParamValue::Int(x.round() as i64),
            Distribution::StepIntUniform(d) => {
                let k = ((x - d.low as f64) / d.step as f64).round() as i64;
                ParamValue::Int(d.low + k.clamp(0, d.n_steps()) * d.step)
            }
            Distribution::Categorical(d) => {
                let idx = (x.round().max(0.0) as usize).min(d.choices.len() - 1);
                ParamValue::Categorical(d.choices[idx].clone())
            }
        }
    }

    /// Convert an external value to the internal encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParamValue`] if the value has the wrong kind
    /// (for instance a label for a numeric domain) or an unknown label.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_internal(&self, value: &ParamValue) -> Result<f64> {
        match (self, value) {
            (
                Distribution::Uniform(_)
                | Distribution::LogUniform(_)
                | Distribution::DiscreteUniform(_),
                ParamValue::Float(v),
            ) => Ok(*v),
            (
                Distribution::Uniform(_)
                | Distribution::LogUniform(_)
                | Distribution::DiscreteUniform(_)
                | Distribution::IntUniform(_)
                | Distribution::StepIntUniform(_),
                ParamValue::Int(v),
            ) => Ok(*v as f64),
            (
                Distribution::IntUniform(_) | Distribution::StepIntUniform(_),
                ParamValue::Float(v),
            ) if v.fract() == 0.0 => Ok(*v),
            (Distribution::Categorical(d), ParamValue::Categorical(label)) => d
                .choices
                .iter()
                .position(|c| c == label)
                .map(|i| i as f64)
                .ok_or_else(|| {
                    Error::InvalidParamValue(format!("'{label}' is not one of {:?}", d.choices))
                }),
            _ => Err(Error::InvalidParamValue(format!(
                "{value} does not fit {}",
                self.name()
            ))),
        }
    }

    /// The internal `[low, high]` range used by samplers.
    ///
    /// Categorical domains span `[0, n_choices - 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn internal_bounds(&self) -> (f64, f64) {
        match self {
            Distribution::Uniform(d) => (d.low, d.high),
            Distribution::LogUniform(d) => (d.low, d.high),
            Distribution::DiscreteUniform(d) => (d.low, d.high),
            Distribution::IntUniform(d) => (d.low as f64, d.high as f64),
            Distribution::StepIntUniform(d) => (d.low as f64, d.high as f64),
            Distribution::Categorical(d) => (0.0, (d.choices.len() - 1) as f64),
        }
    }

    /// Whether this is a categorical distribution.
    #[must_use]
    pub fn is_categorical(&self) -> bool {
        matches!(self, Distribution::Categorical(_))
    }

    /// Validate the fields, for instance after decoding.
    ///
    /// # Errors
    ///
    /// Returns the same errors as the variant constructors.
    pub fn validate(&self) -> Result<()> {
        match self {
            Distribution::Uniform(d) => UniformDistribution::new(d.low, d.high).map(drop),
            Distribution::LogUniform(d) => LogUniformDistribution::new(d.low, d.high).map(drop),
            Distribution::DiscreteUniform(d) => {
                DiscreteUniformDistribution::new(d.low, d.high, d.q).map(drop)
            }
            Distribution::IntUniform(d) => IntUniformDistribution::new(d.low, d.high).map(drop),
            Distribution::StepIntUniform(d) => {
                StepIntUniformDistribution::new(d.low, d.high, d.step).map(drop)
            }
            Distribution::Categorical(d) => {
                CategoricalDistribution::new(d.choices.iter().cloned()).map(drop)
            }
        }
    }

    /// Encode as `{"name": ..., "attributes": {...}}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the JSON encoding produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDistribution`] if the name tag is unknown or
    /// the payload is malformed, and the constructor errors if the decoded
    /// fields are invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let d: Distribution =
            serde_json::from_str(json).map_err(|e| Error::UnknownDistribution(e.to_string()))?;
        d.validate()?;
        Ok(d)
    }
}

fn check_bounds(low: f64, high: f64) -> Result<()> {
    if low.is_nan() || high.is_nan() || low > high {
        return Err(Error::InvalidBounds { low, high });
    }
    Ok(())
}
