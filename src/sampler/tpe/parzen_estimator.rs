//! One-dimensional Parzen estimator: a truncated Gaussian mixture fitted to
//! a set of observations.

use core::f64::consts::PI;
use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;

use crate::rng_util::{log_sum_exp, norm_cdf, sample_standard_normal};

pub(super) const EPS: f64 = 1e-12;

/// Maps a number of observations to their mixture weights, oldest first.
pub type WeightsFn = Arc<dyn Fn(usize) -> Vec<f64> + Send + Sync>;

/// Default weights: flat 1s for fewer than 25 observations, otherwise a
/// linear ramp from `1/n` to 1 over the oldest `n - 25` followed by 25 ones.
///
/// ```
/// use hypertune::sampler::tpe::default_weights;
///
/// assert_eq!(default_weights(3), vec![1.0, 1.0, 1.0]);
/// let w = default_weights(27);
/// assert_eq!(w.len(), 27);
/// assert!((w[0] - 1.0 / 27.0).abs() < 1e-12);
/// assert!((w[1] - 1.0).abs() < 1e-12);
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn default_weights(n: usize) -> Vec<f64> {
    if n < 25 {
        return vec![1.0; n];
    }
    let n_ramp = n - 25;
    let start = 1.0 / n as f64;
    let mut weights: Vec<f64> = match n_ramp {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..n_ramp)
            .map(|i| start + (1.0 - start) * i as f64 / (n_ramp - 1) as f64)
            .collect(),
    };
    weights.extend(core::iter::repeat_n(1.0, 25));
    weights
}

#[derive(Clone)]
pub(crate) struct ParzenEstimatorParams {
    pub(crate) consider_prior: bool,
    pub(crate) prior_weight: f64,
    pub(crate) consider_magic_clip: bool,
    pub(crate) consider_endpoints: bool,
    pub(crate) weights: WeightsFn,
}

impl Default for ParzenEstimatorParams {
    fn default() -> Self {
        Self {
            consider_prior: true,
            prior_weight: 1.0,
            consider_magic_clip: true,
            consider_endpoints: false,
            weights: Arc::new(default_weights),
        }
    }
}

/// Mixture components sorted by mean.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParzenEstimator {
    pub(crate) weights: Vec<f64>,
    pub(crate) mus: Vec<f64>,
    pub(crate) sigmas: Vec<f64>,
}

impl ParzenEstimator {
    /// Fit the mixture to `mus` (in observation order) on `[low, high]`.
    pub(crate) fn new(mus: &[f64], low: f64, high: f64, params: &ParzenEstimatorParams) -> Self {
        let mut order: Vec<usize> = (0..mus.len()).collect();
        order.sort_by(|&a, &b| mus[a].total_cmp(&mus[b]));

        let raw_weights = (params.weights)(mus.len());
        let mut sorted_mus: Vec<f64> = order.iter().map(|&i| mus[i]).collect();
        let mut weights: Vec<f64> = order
            .iter()
            .map(|&i| raw_weights.get(i).copied().unwrap_or(1.0))
            .collect();

        let prior_mu = 0.5 * (low + high);
        let prior_sigma = high - low;
        let prior_pos = params.consider_prior.then(|| {
            let pos = sorted_mus.partition_point(|&m| m < prior_mu);
            sorted_mus.insert(pos, prior_mu);
            weights.insert(pos, params.prior_weight);
            pos
        });

        let n = sorted_mus.len();
        let mut sigmas: Vec<f64> = (0..n)
            .map(|i| {
                let left = if i == 0 { low } else { sorted_mus[i - 1] };
                let right = if i + 1 == n { high } else { sorted_mus[i + 1] };
                (sorted_mus[i] - left).max(right - sorted_mus[i])
            })
            .collect();
        if !params.consider_endpoints && n >= 2 {
            sigmas[0] = sorted_mus[1] - sorted_mus[0];
            sigmas[n - 1] = sorted_mus[n - 1] - sorted_mus[n - 2];
        }

        #[allow(clippy::cast_precision_loss)]
        let min_sigma = if params.consider_magic_clip {
            prior_sigma / 100.0_f64.min(1.0 + n as f64)
        } else {
            EPS
        };
        for s in &mut sigmas {
            *s = s.max(min_sigma).min(prior_sigma).max(EPS);
        }
        if let Some(pos) = prior_pos {
            sigmas[pos] = prior_sigma.max(EPS);
        }

        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            for w in &mut weights {
                *w /= total;
            }
        }

        Self {
            weights,
            mus: sorted_mus,
            sigmas,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.mus.is_empty()
    }

    /// Draw one point from the mixture truncated to `[low, high)`, snapped
    /// to multiples of `q` when given.
    pub(crate) fn sample(&self, rng: &mut StdRng, low: f64, high: f64, q: Option<f64>) -> f64 {
        let k = choose_index(rng, &self.weights);
        let (mu, sigma) = (self.mus[k], self.sigmas[k]);

        let mut x = mu.clamp(low, high);
        for _ in 0..1000 {
            let candidate = mu + sigma * sample_standard_normal(rng);
            if low <= candidate && candidate < high {
                x = candidate;
                break;
            }
        }
        match q {
            Some(q) => (x / q).round() * q,
            None => x,
        }
    }

    /// Log-density of the truncated mixture at `x`. With `q`, the mass of
    /// the bucket `[x - q/2, x + q/2]` is used instead.
    pub(crate) fn log_pdf(&self, x: f64, low: f64, high: f64, q: Option<f64>) -> f64 {
        if self.is_empty() {
            return f64::NEG_INFINITY;
        }
        let components = || {
            self.weights
                .iter()
                .zip(&self.mus)
                .zip(&self.sigmas)
                .map(|((&w, &mu), &sigma)| (w, mu, sigma))
        };
        let mass = |lower: f64, upper: f64| -> f64 {
            components()
                .map(|(w, mu, sigma)| {
                    w * (norm_cdf((upper - mu) / sigma) - norm_cdf((lower - mu) / sigma))
                })
                .sum()
        };
        let p_accept = mass(low, high);

        match q {
            None => {
                let terms: Vec<f64> = components()
                    .map(|(w, mu, sigma)| {
                        let z = (x - mu) / sigma;
                        -0.5 * z * z - (sigma * (2.0 * PI).sqrt()).ln() + w.ln()
                    })
                    .collect();
                log_sum_exp(&terms) - (p_accept + EPS).ln()
            }
            Some(q) => {
                let upper = (x + 0.5 * q).min(high);
                let lower = (x - 0.5 * q).max(low);
                (mass(lower, upper) + EPS).ln() - (p_accept + EPS).ln()
            }
        }
    }
}

/// Pick an index with probability proportional to `weights`.
pub(super) fn choose_index(rng: &mut StdRng, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    let mut u = rng.random::<f64>() * total;
    for (i, &w) in weights.iter().enumerate() {
        if u < w {
            return i;
        }
        u -= w;
    }
    weights.len().saturating_sub(1)
}
