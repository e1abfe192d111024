//! Relative sampler backed by a shared Sobol [`Engine`].

use std::collections::HashMap;

use parking_lot::Mutex;

use super::engine::{Engine, MAX_DIM};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::sampler::{RelativeSampler, SearchSpace};
use crate::study::Study;
use crate::trial::FrozenTrial;

/// Quasi-random sampler using the Sobol sequence.
///
/// The engine is created on the first call, with one dimension per
/// parameter of the search space (categoricals included), in name order.
/// If a later trial sees a search space of a different size, the sampler
/// returns an empty assignment and the study's independent sampler takes
/// over for that trial.
///
/// # Examples
///
/// ```
/// use hypertune::sampler::SobolSampler;
///
/// let sampler = SobolSampler::new();
///
/// // Skip the first 64 points when about 100 trials will run.
/// let sampler = SobolSampler::builder().skip_initial_points(100).build();
/// ```
pub struct SobolSampler {
    n_skip: u64,
    engine: Mutex<Option<Engine>>,
}

impl SobolSampler {
    /// A sampler starting at the first point of the sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a sampler.
    #[must_use]
    pub fn builder() -> SobolSamplerBuilder {
        SobolSamplerBuilder::default()
    }
}

impl Default for SobolSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SobolSampler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SobolSampler")
            .field("n_skip", &self.n_skip)
            .finish_non_exhaustive()
    }
}

impl RelativeSampler for SobolSampler {
    fn sample_relative(
        &self,
        _study: &Study,
        _trial: &FrozenTrial,
        search_space: &SearchSpace,
    ) -> Result<HashMap<String, f64>> {
        if search_space.is_empty() {
            return Ok(HashMap::new());
        }
        if search_space.len() > MAX_DIM {
            return Err(Error::UnsupportedSearchSpace(format!(
                "Sobol supports at most {MAX_DIM} parameters, got {}",
                search_space.len()
            )));
        }

        let mut guard = self.engine.lock();
        if guard.is_none() {
            let mut engine = Engine::new(search_space.len())?;
            engine.skip(self.n_skip);
            *guard = Some(engine);
        }
        let Some(engine) = guard.as_mut() else {
            return Ok(HashMap::new());
        };
        if engine.dim() != search_space.len() {
            trace_debug!(
                expected = engine.dim(),
                got = search_space.len(),
                "search space changed; deferring to the independent sampler"
            );
            return Ok(HashMap::new());
        }
        let point = engine.draw();

        Ok(search_space
            .iter()
            .zip(point)
            .map(|((name, d), u)| (name.clone(), map_unit(u, d)))
            .collect())
    }
}

/// Builder for a [`SobolSampler`].
#[derive(Debug, Clone, Default)]
pub struct SobolSamplerBuilder {
    n_skip: u64,
}

impl SobolSamplerBuilder {
    /// Skip the largest power of two not above `n_samples`, the number of
    /// trials that will use the sampler. Workers sharing a study through
    /// separate samplers should pass different values to avoid drawing the
    /// same points.
    #[must_use]
    pub fn skip_initial_points(mut self, n_samples: u64) -> Self {
        self.n_skip = if n_samples == 0 {
            0
        } else {
            1 << n_samples.ilog2()
        };
        self
    }

    /// Build the sampler.
    #[must_use]
    pub fn build(self) -> SobolSampler {
        SobolSampler {
            n_skip: self.n_skip,
            engine: Mutex::new(None),
        }
    }
}

/// Map a coordinate in `[0, 1)` onto the internal encoding of `distribution`.
#[allow(clippy::cast_precision_loss)]
fn map_unit(u: f64, distribution: &Distribution) -> f64 {
    match distribution {
        Distribution::Uniform(d) => below_high(d.low + u * (d.high - d.low), d.low, d.high),
        Distribution::LogUniform(d) => {
            let (low, high) = (d.low.ln(), d.high.ln());
            let v = (low + u * (high - low)).exp().clamp(d.low, d.high);
            below_high(v, d.low, d.high)
        }
        Distribution::DiscreteUniform(d) => {
            // shift [low, high] to [0, r] so that grid points get equal mass
            let r = d.high - d.low;
            let x = -0.5 * d.q + u * (r + d.q);
            ((x / d.q).round() * d.q + d.low).clamp(d.low, d.high)
        }
        Distribution::IntUniform(d) => {
            let span = (d.high - d.low + 1) as f64;
            ((u * span).floor() + d.low as f64).min(d.high as f64)
        }
        Distribution::StepIntUniform(d) => {
            let n = (d.n_steps() + 1) as f64;
            let k = (u * n).floor().min(n - 1.0);
            d.low as f64 + k * d.step as f64
        }
        Distribution::Categorical(d) => {
            let k = d.choices.len() as f64;
            (u * k).floor().min(k - 1.0)
        }
    }
}

/// Continuous ranges are half-open, so rounding up onto `high` steps back
/// one ulp. A single-point range keeps its only value.
fn below_high(v: f64, low: f64, high: f64) -> f64 {
    if v >= high && low < high {
        high.next_down()
    } else {
        v
    }
}
