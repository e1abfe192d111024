//! Tree-Parzen Estimator (TPE) sampler implementation.

use core::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::parzen_estimator::{
    EPS, ParzenEstimator, ParzenEstimatorParams, WeightsFn, choose_index,
};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::sampler::{RandomSampler, Sampler};
use crate::storage::tolerate_eviction;
use crate::study::Study;
use crate::trial::FrozenTrial;
use crate::types::{Direction, TrialState};

/// Maps a number of observations to the size of the "below" (good) set.
pub type GammaFn = Arc<dyn Fn(usize) -> usize + Send + Sync>;

/// Default gamma: `min(ceil(0.1 * n), 25)`.
///
/// ```
/// use hypertune::sampler::tpe::default_gamma;
///
/// assert_eq!(default_gamma(1), 1);
/// assert_eq!(default_gamma(10), 1);
/// assert_eq!(default_gamma(11), 2);
/// assert_eq!(default_gamma(1000), 25);
/// ```
#[must_use]
pub fn default_gamma(n: usize) -> usize {
    n.div_ceil(10).min(25)
}

/// A Tree-Parzen Estimator (TPE) sampler.
///
/// For each parameter, TPE orders the finished trials that used it by
/// objective value, fits one Parzen estimator to the best `gamma(n)`
/// observations and another to the rest, then draws `n_ei_candidates` from
/// the first and keeps the candidate with the largest density ratio.
/// Pruned trials take part too, ranked after every complete trial and
/// among themselves by how far they got.
///
/// Until `n_startup_trials` observations exist the sampler falls back to
/// uniform random sampling.
///
/// # Examples
///
/// ```
/// use hypertune::sampler::TpeSampler;
///
/// let sampler = TpeSampler::new();
///
/// let sampler = TpeSampler::builder()
///     .n_startup_trials(20)
///     .n_ei_candidates(32)
///     .gamma(|n: usize| (n / 4).max(1))
///     .seed(42)
///     .build()
///     .unwrap();
/// ```
pub struct TpeSampler {
    n_startup_trials: usize,
    n_ei_candidates: usize,
    gamma: GammaFn,
    parzen: ParzenEstimatorParams,
    rng: Mutex<StdRng>,
    random: RandomSampler,
}

impl TpeSampler {
    /// Create a TPE sampler with the default settings.
    ///
    /// - `n_startup_trials`: 10
    /// - `n_ei_candidates`: 24
    /// - gamma: [`default_gamma`]
    /// - weights: [`default_weights`](super::default_weights)
    /// - prior on with weight 1.0, magic clip on, endpoints off
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_startup_trials: 10,
            n_ei_candidates: 24,
            gamma: Arc::new(default_gamma),
            parzen: ParzenEstimatorParams::default(),
            rng: Mutex::new(StdRng::from_os_rng()),
            random: RandomSampler::new(),
        }
    }

    /// Create a builder for configuring a TPE sampler.
    #[must_use]
    pub fn builder() -> TpeSamplerBuilder {
        TpeSamplerBuilder::new()
    }

    fn sample_numerical(
        &self,
        rng: &mut StdRng,
        low: f64,
        high: f64,
        below: &[f64],
        above: &[f64],
        q: Option<f64>,
    ) -> f64 {
        let pe_below = ParzenEstimator::new(below, low, high, &self.parzen);
        let pe_above = ParzenEstimator::new(above, low, high, &self.parzen);
        if pe_below.is_empty() {
            return pe_above.sample(rng, low, high, q);
        }

        let mut best = f64::NAN;
        let mut best_score = f64::NEG_INFINITY;
        for _ in 0..self.n_ei_candidates {
            let x = pe_below.sample(rng, low, high, q);
            let score = pe_below.log_pdf(x, low, high, q) - pe_above.log_pdf(x, low, high, q);
            if best.is_nan() || score > best_score {
                best = x;
                best_score = score;
            }
        }
        best
    }

    /// Sample a grid `{low, low + q, ..., low + span}` in the space shifted
    /// to start at zero.
    fn sample_grid(
        &self,
        rng: &mut StdRng,
        low: f64,
        span: f64,
        q: f64,
        below: &[f64],
        above: &[f64],
    ) -> f64 {
        let shift = |xs: &[f64]| xs.iter().map(|x| x - low).collect::<Vec<_>>();
        let x = self.sample_numerical(
            rng,
            -0.5 * q,
            span + 0.5 * q,
            &shift(below),
            &shift(above),
            Some(q),
        );
        (x + low).clamp(low, low + span)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn sample_categorical(
        &self,
        rng: &mut StdRng,
        n_choices: usize,
        below: &[f64],
        above: &[f64],
    ) -> f64 {
        let histogram = |xs: &[f64]| {
            let prior = if self.parzen.consider_prior {
                self.parzen.prior_weight
            } else {
                0.0
            };
            let mut h = vec![prior; n_choices];
            for (&x, w) in xs.iter().zip((self.parzen.weights)(xs.len())) {
                if let Some(slot) = h.get_mut(x.round() as usize) {
                    *slot += w;
                }
            }
            let total: f64 = h.iter().sum();
            for v in &mut h {
                *v /= total.max(EPS);
            }
            h
        };
        let h_below = histogram(below);
        let h_above = histogram(above);

        let mut best = choose_index(rng, &h_below);
        let mut best_score = f64::NEG_INFINITY;
        for _ in 0..self.n_ei_candidates {
            let i = choose_index(rng, &h_below);
            let score = (h_below[i] + EPS).ln() - (h_above[i] + EPS).ln();
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        best as f64
    }
}

impl Default for TpeSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for TpeSampler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TpeSampler")
            .field("n_startup_trials", &self.n_startup_trials)
            .field("n_ei_candidates", &self.n_ei_candidates)
            .field("consider_prior", &self.parzen.consider_prior)
            .field("prior_weight", &self.parzen.prior_weight)
            .field("consider_magic_clip", &self.parzen.consider_magic_clip)
            .field("consider_endpoints", &self.parzen.consider_endpoints)
            .finish_non_exhaustive()
    }
}

impl Sampler for TpeSampler {
    #[allow(clippy::cast_precision_loss)]
    fn sample(
        &self,
        study: &Study,
        _trial: &FrozenTrial,
        name: &str,
        distribution: &Distribution,
    ) -> Result<f64> {
        if distribution.single() {
            return Ok(distribution.internal_bounds().0);
        }

        let trials = tolerate_eviction(study.storage().get_all_trials(study.id()))?;
        let observations = observation_pairs(&trials, name, distribution, study.direction());
        if observations.is_empty() || observations.len() < self.n_startup_trials {
            return Ok(self.random.sample_internal(distribution));
        }
        let n_below = (self.gamma)(observations.len());
        let (below, above) = split_observations(&observations, n_below);

        let mut rng = self.rng.lock();
        let value = match distribution {
            Distribution::Uniform(d) => {
                self.sample_numerical(&mut rng, d.low, d.high, &below, &above, None)
            }
            Distribution::LogUniform(d) => {
                let ln = |xs: &[f64]| xs.iter().map(|x| x.ln()).collect::<Vec<_>>();
                let x = self.sample_numerical(
                    &mut rng,
                    d.low.ln(),
                    d.high.ln(),
                    &ln(&below),
                    &ln(&above),
                    None,
                );
                x.exp().clamp(d.low, d.high)
            }
            Distribution::DiscreteUniform(d) => {
                self.sample_grid(&mut rng, d.low, d.high - d.low, d.q, &below, &above)
            }
            Distribution::IntUniform(d) => self.sample_grid(
                &mut rng,
                d.low as f64,
                (d.high - d.low) as f64,
                1.0,
                &below,
                &above,
            ),
            Distribution::StepIntUniform(d) => self.sample_grid(
                &mut rng,
                d.low as f64,
                (d.n_steps() * d.step) as f64,
                d.step as f64,
                &below,
                &above,
            ),
            Distribution::Categorical(d) => {
                self.sample_categorical(&mut rng, d.choices.len(), &below, &above)
            }
        };
        Ok(value)
    }
}

/// An observed parameter value with its rank key `(class, loss)`.
///
/// Complete trials have class `-inf`; pruned ones `-step`, so a trial pruned
/// later ranks better than one pruned earlier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Observation {
    pub(super) value: f64,
    pub(super) class: f64,
    pub(super) loss: f64,
}

/// Collect the finished trials that used `name`, in trial order.
#[allow(clippy::cast_precision_loss)]
pub(super) fn observation_pairs(
    trials: &[FrozenTrial],
    name: &str,
    distribution: &Distribution,
    direction: Direction,
) -> Vec<Observation> {
    let sign = direction.sign();
    let mut ordered: Vec<&FrozenTrial> = trials.iter().collect();
    ordered.sort_by_key(|t| t.number);

    ordered
        .into_iter()
        .filter_map(|trial| {
            let &value = trial.params_internal.get(name)?;
            if !distribution.contains(value) {
                return None;
            }
            let (class, loss) = match trial.state {
                TrialState::Complete => (f64::NEG_INFINITY, sign * trial.value?),
                TrialState::Pruned => match trial.intermediate_values.iter().next_back() {
                    Some((&step, &v)) if v.is_nan() => (-(step as f64), f64::INFINITY),
                    Some((&step, &v)) => (-(step as f64), sign * v),
                    None => (f64::INFINITY, 0.0),
                },
                _ => return None,
            };
            Some(Observation { value, class, loss })
        })
        .collect()
}

/// Split into the best `n_below` values and the rest, both kept in
/// observation order.
pub(super) fn split_observations(
    observations: &[Observation],
    n_below: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut ranked: Vec<usize> = (0..observations.len()).collect();
    ranked.sort_by(|&a, &b| {
        let (a, b) = (&observations[a], &observations[b]);
        match a.class.total_cmp(&b.class) {
            Ordering::Equal => a.loss.total_cmp(&b.loss),
            other => other,
        }
    });
    let n_below = n_below.min(observations.len());
    let mut below_idx = ranked[..n_below].to_vec();
    let mut above_idx = ranked[n_below..].to_vec();
    below_idx.sort_unstable();
    above_idx.sort_unstable();
    (
        below_idx.iter().map(|&i| observations[i].value).collect(),
        above_idx.iter().map(|&i| observations[i].value).collect(),
    )
}

/// Builder for [`TpeSampler`].
pub struct TpeSamplerBuilder {
    n_startup_trials: usize,
    n_ei_candidates: usize,
    gamma: GammaFn,
    parzen: ParzenEstimatorParams,
    seed: Option<u64>,
}

impl TpeSamplerBuilder {
    /// Create a builder with the defaults of [`TpeSampler::new`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_startup_trials: 10,
            n_ei_candidates: 24,
            gamma: Arc::new(default_gamma),
            parzen: ParzenEstimatorParams::default(),
            seed: None,
        }
    }

    /// Number of observations required before TPE replaces random sampling.
    #[must_use]
    pub fn n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Number of candidates drawn from the "below" estimator per suggestion.
    #[must_use]
    pub fn n_ei_candidates(mut self, n: usize) -> Self {
        self.n_ei_candidates = n;
        self
    }

    /// Size of the "below" set as a function of the number of observations.
    #[must_use]
    pub fn gamma(mut self, gamma: impl Fn(usize) -> usize + Send + Sync + 'static) -> Self {
        self.gamma = Arc::new(gamma);
        self
    }

    /// Mixture weights as a function of the number of observations.
    ///
    /// The returned vector lists weights oldest observation first.
    #[must_use]
    pub fn weights(mut self, weights: impl Fn(usize) -> Vec<f64> + Send + Sync + 'static) -> Self {
        let weights: WeightsFn = Arc::new(weights);
        self.parzen.weights = weights;
        self
    }

    /// Add a prior component spanning the whole range.
    #[must_use]
    pub fn consider_prior(mut self, consider: bool) -> Self {
        self.parzen.consider_prior = consider;
        self
    }

    /// Weight of the prior component before normalization.
    #[must_use]
    pub fn prior_weight(mut self, weight: f64) -> Self {
        self.parzen.prior_weight = weight;
        self
    }

    /// Floor sigmas at `range / min(100, 1 + n)`.
    #[must_use]
    pub fn consider_magic_clip(mut self, consider: bool) -> Self {
        self.parzen.consider_magic_clip = consider;
        self
    }

    /// Treat the range ends as neighbors of the extreme components.
    #[must_use]
    pub fn consider_endpoints(mut self, consider: bool) -> Self {
        self.parzen.consider_endpoints = consider;
        self
    }

    /// Seed the sampler for reproducible runs.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the sampler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `n_ei_candidates` is zero or the
    /// prior weight is not positive.
    pub fn build(self) -> Result<TpeSampler> {
        if self.n_ei_candidates == 0 {
            return Err(Error::InvalidConfig(
                "n_ei_candidates must be at least 1".into(),
            ));
        }
        if self.parzen.prior_weight.is_nan() || self.parzen.prior_weight <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "prior_weight must be positive, got {}",
                self.parzen.prior_weight
            )));
        }
        let (rng, random) = match self.seed {
            Some(seed) => (StdRng::seed_from_u64(seed), RandomSampler::with_seed(seed)),
            None => (StdRng::from_os_rng(), RandomSampler::new()),
        };
        Ok(TpeSampler {
            n_startup_trials: self.n_startup_trials,
            n_ei_candidates: self.n_ei_candidates,
            gamma: self.gamma,
            parzen: self.parzen,
            rng: Mutex::new(rng),
            random,
        })
    }
}

impl Default for TpeSamplerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
