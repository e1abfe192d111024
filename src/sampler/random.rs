//! Random sampler implementation.

use parking_lot::Mutex;

use crate::distribution::Distribution;
use crate::error::Result;
use crate::rng_util;
use crate::sampler::Sampler;
use crate::study::Study;
use crate::trial::FrozenTrial;

/// A simple random sampler that samples uniformly from distributions.
///
/// This sampler ignores the trial history and samples uniformly over the
/// internal encoding of each distribution. It serves as a baseline sampler
/// and is used during the startup phase of [`TpeSampler`](super::TpeSampler).
///
/// # Examples
///
/// ```
/// use hypertune::sampler::RandomSampler;
///
/// // Create with default RNG
/// let sampler = RandomSampler::new();
///
/// // Create with a fixed seed for reproducibility
/// let sampler = RandomSampler::with_seed(42);
/// ```
pub struct RandomSampler {
    rng: Mutex<fastrand::Rng>,
}

impl RandomSampler {
    /// Creates a new random sampler with a default random seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Creates a new random sampler with a fixed seed for reproducibility.
    ///
    /// Using the same seed will produce the same sequence of sampled values.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    /// Draw one internal value from `distribution`, ignoring any history.
    #[must_use]
    pub fn sample_internal(&self, distribution: &Distribution) -> f64 {
        sample_with(&mut self.rng.lock(), distribution)
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RandomSampler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RandomSampler").finish_non_exhaustive()
    }
}

impl Sampler for RandomSampler {
    fn sample(
        &self,
        _study: &Study,
        _trial: &FrozenTrial,
        _name: &str,
        distribution: &Distribution,
    ) -> Result<f64> {
        Ok(self.sample_internal(distribution))
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn sample_with(rng: &mut fastrand::Rng, distribution: &Distribution) -> f64 {
    if distribution.single() {
        return distribution.internal_bounds().0;
    }
    match distribution {
        Distribution::Uniform(d) => rng_util::f64_range(rng, d.low, d.high),
        Distribution::LogUniform(d) => {
            rng_util::f64_range(rng, d.low.ln(), d.high.ln()).exp()
        }
        Distribution::DiscreteUniform(d) => {
            // Shift to [0, r] so that every grid point gets an equal share.
            let r = d.high - d.low;
            let x = rng_util::f64_range(rng, -0.5 * d.q, r + 0.5 * d.q);
            let v = (x / d.q).round() * d.q + d.low;
            v.clamp(d.low, d.high)
        }
        Distribution::IntUniform(d) => rng.i64(d.low..=d.high) as f64,
        Distribution::StepIntUniform(d) => {
            let k = rng.i64(0..=d.n_steps());
            (d.low + k * d.step) as f64
        }
        Distribution::Categorical(d) => rng.usize(0..d.choices.len()) as f64,
    }
}
