//! Ask-and-tell CMA-ES optimizer over plain `f64` vectors.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::rng_util::sample_standard_normal;

const EPS: f64 = 1e-8;

/// One evaluated point of a generation.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// The point, as returned by [`Optimizer::ask`].
    pub params: Vec<f64>,
    /// The objective value; lower is better.
    pub value: f64,
}

impl Solution {
    /// Pair a point with its objective value.
    #[must_use]
    pub fn new(params: Vec<f64>, value: f64) -> Self {
        Self { params, value }
    }
}

/// CMA-ES optimizer with an ask-and-tell interface.
///
/// Call [`ask`](Self::ask) [`population_size`](Self::population_size) times,
/// evaluate every point, then hand the whole generation to
/// [`tell`](Self::tell). Values are minimized.
///
/// # Examples
///
/// ```
/// use hypertune::sampler::cma_es::{Optimizer, Solution};
///
/// let mut optimizer = Optimizer::builder(vec![1.0, 2.0], 1.3).seed(0).build().unwrap();
/// for _ in 0..100 {
///     let solutions = (0..optimizer.population_size())
///         .map(|_| {
///             let x = optimizer.ask();
///             let value = (x[0] - 3.0).powi(2) + (10.0 * (x[1] + 2.0)).powi(2);
///             Solution::new(x, value)
///         })
///         .collect();
///     optimizer.tell(solutions).unwrap();
/// }
/// assert!((optimizer.mean()[0] - 3.0).abs() < 1e-3);
/// ```
#[derive(Clone, Debug)]
pub struct Optimizer {
    mean: DVector<f64>,
    sigma: f64,
    c: DMatrix<f64>,
    b: DMatrix<f64>,
    d: DVector<f64>,

    dim: usize,
    mu: usize,
    mu_eff: f64,
    popsize: usize,
    cc: f64,
    c1: f64,
    cmu: f64,
    c_sigma: f64,
    d_sigma: f64,
    cm: f64,
    chi_n: f64,
    p_sigma: DVector<f64>,
    pc: DVector<f64>,
    weights: DVector<f64>,

    bounds: Option<Vec<(f64, f64)>>,
    max_resampling: usize,

    tol_x: f64,
    tol_x_up: f64,
    tol_fun: f64,
    tol_condition_cov: f64,
    fun_hist_term: usize,
    fun_hist_values: Vec<f64>,

    rng: StdRng,
    generation: usize,
}

/// Builder for an [`Optimizer`].
///
/// | Option | Default |
/// |--------|---------|
/// | `bounds` | none |
/// | `population_size` | `4 + floor(3 ln(dim))` |
/// | `max_resampling` | 100 |
/// | `seed` | random |
/// | `tol_x` | `1e-12 * sigma` |
/// | `tol_x_up` | `1e4` |
/// | `tol_fun` | `1e-12` |
/// | `tol_condition_cov` | `1e14` |
#[derive(Clone, Debug)]
pub struct OptimizerBuilder {
    mean: Vec<f64>,
    sigma: f64,
    bounds: Option<Vec<(f64, f64)>>,
    popsize: Option<usize>,
    max_resampling: usize,
    seed: Option<u64>,
    tol_x: Option<f64>,
    tol_x_up: f64,
    tol_fun: f64,
    tol_condition_cov: f64,
}

impl OptimizerBuilder {
    /// Box constraints `(low, high)` per dimension.
    ///
    /// Points drawn outside the box are redrawn up to `max_resampling`
    /// times, then clamped into it.
    #[must_use]
    pub fn bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Number of points per generation (lambda).
    #[must_use]
    pub fn population_size(mut self, popsize: usize) -> Self {
        self.popsize = Some(popsize);
        self
    }

    /// How many times [`Optimizer::ask`] redraws an infeasible point before
    /// repairing it.
    #[must_use]
    pub fn max_resampling(mut self, n: usize) -> Self {
        self.max_resampling = n;
        self
    }

    /// Seed the internal RNG.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Stop once every coordinate of the step and of the evolution path is
    /// below this size.
    #[must_use]
    pub fn tol_x(mut self, tol: f64) -> Self {
        self.tol_x = Some(tol);
        self
    }

    /// Stop once the step along the widest axis exceeds this size.
    #[must_use]
    pub fn tol_x_up(mut self, tol: f64) -> Self {
        self.tol_x_up = tol;
        self
    }

    /// Stop once the recent best and worst values span less than this.
    #[must_use]
    pub fn tol_fun(mut self, tol: f64) -> Self {
        self.tol_fun = tol;
        self
    }

    /// Stop once the condition number of the covariance exceeds this.
    #[must_use]
    pub fn tol_condition_cov(mut self, tol: f64) -> Self {
        self.tol_condition_cov = tol;
        self
    }

    /// Compute the strategy constants and build the optimizer.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSigma`] if `sigma` is not a positive number.
    /// - [`Error::DimensionMismatch`] if `bounds` does not have one entry
    ///   per dimension.
    /// - [`Error::InvalidConfig`] for an empty mean, a population smaller
    ///   than 2, a tolerance that is not a positive number, or learning
    ///   rates outside their valid range.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn build(self) -> Result<Optimizer> {
        if self.sigma.is_nan() || self.sigma <= 0.0 {
            return Err(Error::InvalidSigma(self.sigma));
        }
        let dim = self.mean.len();
        if dim == 0 {
            return Err(Error::InvalidConfig("mean must not be empty".into()));
        }
        if let Some(bounds) = &self.bounds
            && bounds.len() != dim
        {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got: bounds.len(),
            });
        }

        let tol_x = self.tol_x.unwrap_or(1e-12 * self.sigma);
        for (name, tol) in [
            ("tol_x", tol_x),
            ("tol_x_up", self.tol_x_up),
            ("tol_fun", self.tol_fun),
            ("tol_condition_cov", self.tol_condition_cov),
        ] {
            if tol.is_nan() || tol <= 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive, got {tol}")));
            }
        }

        let n = dim as f64;
        let popsize = self
            .popsize
            .unwrap_or_else(|| 4 + (3.0 * n.ln()).floor() as usize);
        if popsize < 2 {
            return Err(Error::InvalidConfig(format!(
                "population size must be at least 2, got {popsize}"
            )));
        }
        let mu = popsize / 2;

        let lambda = popsize as f64;
        let weights_prime: Vec<f64> = (0..popsize)
            .map(|i| ((lambda + 1.0) / 2.0).ln() - ((i + 1) as f64).ln())
            .collect();
        let (head, tail) = weights_prime.split_at(mu);
        let mu_eff = head.iter().sum::<f64>().powi(2) / head.iter().map(|w| w * w).sum::<f64>();
        let mu_eff_minus =
            tail.iter().sum::<f64>().powi(2) / tail.iter().map(|w| w * w).sum::<f64>();

        let alpha_cov = 2.0;
        // rank-one and rank-mu learning rates
        let c1 = alpha_cov / ((n + 1.3).powi(2) + mu_eff);
        let cmu = (1.0 - c1).min(
            alpha_cov * (mu_eff - 2.0 + 1.0 / mu_eff)
                / ((n + 2.0).powi(2) + alpha_cov * mu_eff / 2.0),
        );
        if c1 + cmu > 1.0 {
            return Err(Error::InvalidConfig(
                "invalid learning rate for the rank-one and rank-mu update".into(),
            ));
        }

        let alpha_min = (1.0 + c1 / cmu)
            .min(1.0 + 2.0 * mu_eff_minus / (mu_eff + 2.0))
            .min((1.0 - c1 - cmu) / (n * cmu));

        let positive_sum: f64 = weights_prime.iter().filter(|&&w| w > 0.0).sum();
        let negative_sum: f64 = -weights_prime.iter().filter(|&&w| w < 0.0).sum::<f64>();
        let weights = DVector::from_iterator(
            popsize,
            weights_prime.iter().map(|&w| {
                if w > 0.0 {
                    w / positive_sum
                } else {
                    alpha_min / negative_sum * w
                }
            }),
        );

        // step-size cumulation
        let c_sigma = (mu_eff + 2.0) / (n + mu_eff + 5.0);
        let d_sigma = 1.0 + 2.0 * (((mu_eff - 1.0) / (n + 1.0)).sqrt() - 1.0).max(0.0) + c_sigma;
        if c_sigma >= 1.0 {
            return Err(Error::InvalidConfig(
                "invalid learning rate for the step-size cumulation".into(),
            ));
        }

        // rank-one cumulation
        let cc = (4.0 + mu_eff / n) / (n + 4.0 + 2.0 * mu_eff / n);
        if cc > 1.0 {
            return Err(Error::InvalidConfig(
                "invalid learning rate for the rank-one cumulation".into(),
            ));
        }

        let chi_n = n.sqrt() * (1.0 - 1.0 / (4.0 * n) + 1.0 / (21.0 * n * n));
        let fun_hist_term = 10 + (30.0 * n / lambda).ceil() as usize;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Optimizer {
            mean: DVector::from_vec(self.mean),
            sigma: self.sigma,
            c: DMatrix::identity(dim, dim),
            b: DMatrix::identity(dim, dim),
            d: DVector::from_element(dim, 1.0),
            dim,
            mu,
            mu_eff,
            popsize,
            cc,
            c1,
            cmu,
            c_sigma,
            d_sigma,
            cm: 1.0,
            chi_n,
            p_sigma: DVector::zeros(dim),
            pc: DVector::zeros(dim),
            weights,
            bounds: self.bounds,
            max_resampling: self.max_resampling,
            tol_x,
            tol_x_up: self.tol_x_up,
            tol_fun: self.tol_fun,
            tol_condition_cov: self.tol_condition_cov,
            fun_hist_term,
            fun_hist_values: vec![0.0; 2 * fun_hist_term],
            rng,
            generation: 0,
        })
    }
}

impl Optimizer {
    /// Start building an optimizer centered on `mean` with step-size `sigma`.
    #[must_use]
    pub fn builder(mean: Vec<f64>, sigma: f64) -> OptimizerBuilder {
        OptimizerBuilder {
            mean,
            sigma,
            bounds: None,
            popsize: None,
            max_resampling: 100,
            seed: None,
            tol_x: None,
            tol_x_up: 1e4,
            tol_fun: 1e-12,
            tol_condition_cov: 1e14,
        }
    }

    /// Number of completed [`tell`](Self::tell) calls.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Points per generation.
    #[must_use]
    pub fn population_size(&self) -> usize {
        self.popsize
    }

    /// Number of dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Current mean of the search distribution.
    #[must_use]
    pub fn mean(&self) -> &[f64] {
        self.mean.as_slice()
    }

    /// Current step-size.
    #[must_use]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Number of parents used for recombination.
    #[must_use]
    pub fn mu(&self) -> usize {
        self.mu
    }

    /// Variance-effective selection mass.
    #[must_use]
    pub fn mu_eff(&self) -> f64 {
        self.mu_eff
    }

    /// Rank-one update learning rate.
    #[must_use]
    pub fn c1(&self) -> f64 {
        self.c1
    }

    /// Rank-mu update learning rate.
    #[must_use]
    pub fn cmu(&self) -> f64 {
        self.cmu
    }

    /// Step-size cumulation rate.
    #[must_use]
    pub fn c_sigma(&self) -> f64 {
        self.c_sigma
    }

    /// Step-size damping.
    #[must_use]
    pub fn d_sigma(&self) -> f64 {
        self.d_sigma
    }

    /// Rank-one cumulation rate.
    #[must_use]
    pub fn cc(&self) -> f64 {
        self.cc
    }

    /// Expected norm of an `N(0, I)` vector.
    #[must_use]
    pub fn chi_n(&self) -> f64 {
        self.chi_n
    }

    /// Recombination weights; the tail is negative (active CMA).
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        self.weights.as_slice()
    }

    /// Draw the next point.
    ///
    /// With bounds, infeasible draws are retried and the last one is
    /// clamped into the box.
    pub fn ask(&mut self) -> Vec<f64> {
        let mut x = self.sample_solution();
        for _ in 0..self.max_resampling {
            if self.is_feasible(&x) {
                return x;
            }
            x = self.sample_solution();
        }
        self.clamp(&mut x);
        x
    }

    /// Whether `x` lies inside the closed bounds. Always true without
    /// bounds.
    #[must_use]
    pub fn is_feasible(&self, x: &[f64]) -> bool {
        let Some(bounds) = &self.bounds else {
            return true;
        };
        x.len() == self.dim
            && x
                .iter()
                .zip(bounds)
                .all(|(&v, &(low, high))| low <= v && v <= high)
    }

    /// Clamp `x` into the bounds in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `x` has the wrong length.
    pub fn repair_infeasible_params(&self, x: &mut [f64]) -> Result<()> {
        if x.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                got: x.len(),
            });
        }
        self.clamp(x);
        Ok(())
    }

    fn clamp(&self, x: &mut [f64]) {
        if let Some(bounds) = &self.bounds {
            for (v, &(low, high)) in x.iter_mut().zip(bounds) {
                *v = v.max(low).min(high);
            }
        }
    }

    fn sample_solution(&mut self) -> Vec<f64> {
        let rng = &mut self.rng;
        let z = DVector::from_fn(self.dim, |_, _| sample_standard_normal(rng));
        let y = &self.b * self.d.component_mul(&z);
        let x = &self.mean + self.sigma * y;
        x.as_slice().to_vec()
    }

    /// Update the distribution from one evaluated generation.
    ///
    /// # Errors
    ///
    /// - [`Error::TellSizeMismatch`] unless exactly `population_size`
    ///   solutions are given.
    /// - [`Error::DimensionMismatch`] if a solution has the wrong length.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation
    )]
    pub fn tell(&mut self, mut solutions: Vec<Solution>) -> Result<()> {
        if solutions.len() != self.popsize {
            return Err(Error::TellSizeMismatch {
                expected: self.popsize,
                got: solutions.len(),
            });
        }
        if let Some(bad) = solutions.iter().find(|s| s.params.len() != self.dim) {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                got: bad.params.len(),
            });
        }

        self.generation += 1;
        solutions.sort_by(|a, b| a.value.total_cmp(&b.value));

        let n = self.dim as f64;
        let ys: Vec<DVector<f64>> = solutions
            .iter()
            .map(|s| (DVector::from_column_slice(&s.params) - &self.mean) / self.sigma)
            .collect();

        // selection and recombination
        let mut y_w = DVector::zeros(self.dim);
        for (y, &w) in ys.iter().zip(self.weights.iter()).take(self.mu) {
            y_w += w * y;
        }
        // epsilon keeps the mean moving so the deviation never hits zero
        self.mean += (self.cm * self.sigma * &y_w).add_scalar(EPS);

        // step-size control; C^(-1/2) = B D^(-1) B^T
        let d_inv = DMatrix::from_diagonal(&self.d.map(|d| 1.0 / d));
        let c_inv_sqrt = &self.b * d_inv * self.b.transpose();
        let c2_yw = &c_inv_sqrt * &y_w;
        self.p_sigma = (1.0 - self.c_sigma) * &self.p_sigma
            + (self.c_sigma * (2.0 - self.c_sigma) * self.mu_eff).sqrt() * c2_yw;

        let norm_p_sigma = self.p_sigma.norm();
        self.sigma *= ((self.c_sigma / self.d_sigma) * (norm_p_sigma / self.chi_n - 1.0)).exp();

        let h_sigma_left = norm_p_sigma
            / (1.0 - (1.0 - self.c_sigma).powi(2 * (self.generation as i32 + 1))).sqrt();
        let h_sigma_right = (1.4 + 2.0 / (n + 1.0)) * self.chi_n;
        let h_sigma = if h_sigma_left < h_sigma_right { 1.0 } else { 0.0 };

        self.pc = (1.0 - self.cc) * &self.pc
            + h_sigma * (self.cc * (2.0 - self.cc) * self.mu_eff).sqrt() * &y_w;

        // negative weights are rescaled by the Mahalanobis norm of y_i
        let w_io: Vec<f64> = self
            .weights
            .iter()
            .zip(&ys)
            .map(|(&w, y)| {
                if w >= 0.0 {
                    w
                } else {
                    w * n / ((&c_inv_sqrt * y).norm_squared() + EPS)
                }
            })
            .collect();

        let delta_h_sigma = (1.0 - h_sigma) * self.cc * (2.0 - self.cc);

        let rank_one = &self.pc * self.pc.transpose();
        let mut rank_mu = DMatrix::zeros(self.dim, self.dim);
        for (y, &w) in ys.iter().zip(&w_io) {
            rank_mu += w * (y * y.transpose());
        }

        let weight_sum: f64 = self.weights.iter().sum();
        self.c = (1.0 + self.c1 * delta_h_sigma - self.c1 - self.cmu * weight_sum) * &self.c
            + self.c1 * rank_one
            + self.cmu * rank_mu;
        for i in 0..self.dim {
            if self.c[(i, i)] <= 0.0 {
                self.c[(i, i)] += EPS;
            }
        }
        self.c = (&self.c + self.c.transpose()) * 0.5;

        // best and worst value of the last `fun_hist_term` generations
        let idx = 2 * (self.generation % self.fun_hist_term);
        self.fun_hist_values[idx] = solutions[0].value;
        self.fun_hist_values[idx + 1] = solutions[solutions.len() - 1].value;

        self.update_eigen();
        Ok(())
    }

    fn update_eigen(&mut self) {
        let eigen = self.c.clone().symmetric_eigen();
        self.d = eigen.eigenvalues.map(|v| v.max(EPS).sqrt());
        self.b = eigen.eigenvectors;
    }

    /// Whether the run has converged or is diverging.
    ///
    /// True when the recent value range is below `tol_fun`, every
    /// coordinate of the step and the evolution path is below `tol_x`, the
    /// step exceeds `tol_x_up`, or the covariance condition number exceeds
    /// `tol_condition_cov`. See [`OptimizerBuilder`] for the defaults.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        if self.generation > self.fun_hist_term {
            let max = self.fun_hist_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = self.fun_hist_values.iter().copied().fold(f64::INFINITY, f64::min);
            if max - min < self.tol_fun {
                return true;
            }
        }

        let tiny = (0..self.dim).all(|i| {
            self.sigma * self.c[(i, i)] <= self.tol_x
                && (self.sigma * self.pc[i]).abs() <= self.tol_x
        });
        if tiny {
            return true;
        }

        let d_max = self.d.max();
        if self.sigma * d_max > self.tol_x_up {
            return true;
        }

        d_max / self.d.min() > self.tol_condition_cov
    }
}
