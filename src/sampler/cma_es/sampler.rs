//! Relative sampler that drives a CMA-ES [`Optimizer`] from trial history.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::optimizer::{Optimizer, Solution};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::sampler::{RelativeSampler, SearchSpace};
use crate::study::Study;
use crate::trial::FrozenTrial;
use crate::types::TrialState;

/// Trial system attribute recording the optimizer generation a trial was
/// asked in, formatted as `"{optimizer_id}-{generation}"`.
pub const GENERATION_ATTR_KEY: &str = "goptuna:cmaes:generationId";

/// How the sampler restarts a converged optimizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartStrategy {
    /// IPOP-CMA-ES: every restart multiplies the population size by
    /// `inc_popsize`.
    Ipop,
    /// BIPOP-CMA-ES: alternates between large populations (grown like
    /// IPOP) and small randomized ones, balancing the evaluation budget
    /// spent on each.
    Bipop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PopType {
    Small,
    Large,
}

struct CmaEsState {
    rng: StdRng,
    optimizer: Option<Optimizer>,
    optimizer_id: String,
    n_restarts: u32,
    n_small_eval: usize,
    n_large_eval: usize,
    popsize0: Option<usize>,
    poptype: PopType,
}

/// CMA-ES relative sampler.
///
/// Every numeric, non-singleton parameter of the search space becomes one
/// dimension of the optimizer, in name order. Log-uniform parameters are
/// searched in log space; integer and grid parameters are searched
/// continuously and snapped back onto their grid.
///
/// A generation is told to the optimizer once `population_size` complete
/// trials tagged with the current generation exist. For maximization the
/// values are negated first.
///
/// # Examples
///
/// ```
/// use hypertune::sampler::cma_es::CmaEsSampler;
/// use hypertune::Study;
///
/// let study = Study::builder()
///     .relative_sampler(CmaEsSampler::builder().sigma0(0.5).seed(42).build())
///     .build()
///     .unwrap();
/// ```
pub struct CmaEsSampler {
    x0: Option<HashMap<String, f64>>,
    sigma0: Option<f64>,
    n_startup_trials: usize,
    popsize: Option<usize>,
    restart_strategy: Option<RestartStrategy>,
    inc_popsize: usize,
    state: Mutex<CmaEsState>,
}

impl CmaEsSampler {
    /// A sampler with default settings and a random seed.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// A sampler with default settings and a fixed seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::builder().seed(seed).build()
    }

    /// Start configuring a sampler.
    #[must_use]
    pub fn builder() -> CmaEsSamplerBuilder {
        CmaEsSamplerBuilder::default()
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn next_popsize(&self, state: &mut CmaEsState, current: &Optimizer) -> usize {
        let Some(strategy) = self.restart_strategy else {
            return current.population_size();
        };
        if strategy == RestartStrategy::Ipop {
            state.n_restarts += 1;
            return current.population_size() * self.inc_popsize;
        }

        let popsize0 = *state.popsize0.get_or_insert(current.population_size());
        let n_eval = current.population_size() * current.generation();
        match state.poptype {
            PopType::Small => state.n_small_eval += n_eval,
            PopType::Large => state.n_large_eval += n_eval,
        }

        if state.n_small_eval < state.n_large_eval {
            state.poptype = PopType::Small;
            let multiplier = (self.inc_popsize as f64).powi(state.n_restarts.cast_signed());
            let r = state.rng.random::<f64>().powi(2);
            return ((popsize0 as f64 * multiplier.powf(r)).floor() as usize).max(2);
        }

        state.poptype = PopType::Large;
        state.n_restarts += 1;
        popsize0 * self.inc_popsize.pow(state.n_restarts)
    }

    fn init_optimizer(
        &self,
        state: &mut CmaEsState,
        space: &SearchSpace,
        popsize: Option<usize>,
    ) -> Result<Optimizer> {
        let mut mean = Vec::with_capacity(space.len());
        let mut bounds = Vec::with_capacity(space.len());
        let mut sigma0 = f64::INFINITY;
        for (name, distribution) in space {
            let (low, high) = cma_bounds(distribution);
            let x0 = match self.x0.as_ref().and_then(|x0| x0.get(name)) {
                Some(&v) => to_cma_param(distribution, v),
                None if state.n_restarts > 0 => low + state.rng.random::<f64>() * (high - low),
                None => 0.5 * (low + high),
            };
            mean.push(x0);
            bounds.push((low, high));
            sigma0 = sigma0.min((high - low) / 6.0);
        }
        if let Some(s) = self.sigma0.filter(|&s| s > 0.0) {
            sigma0 = s;
        }

        let mut builder = Optimizer::builder(mean, sigma0)
            .bounds(bounds)
            .seed(state.rng.random::<u64>());
        if let Some(popsize) = popsize.or(self.popsize) {
            builder = builder.population_size(popsize);
        }
        let optimizer = builder.build()?;
        state.optimizer_id = format!("{:016x}", state.rng.random::<u64>());
        Ok(optimizer)
    }
}

impl Default for CmaEsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CmaEsSampler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CmaEsSampler")
            .field("sigma0", &self.sigma0)
            .field("n_startup_trials", &self.n_startup_trials)
            .field("restart_strategy", &self.restart_strategy)
            .finish_non_exhaustive()
    }
}

impl RelativeSampler for CmaEsSampler {
    fn sample_relative(
        &self,
        study: &Study,
        trial: &FrozenTrial,
        search_space: &SearchSpace,
    ) -> Result<HashMap<String, f64>> {
        if search_space.is_empty() {
            return Ok(HashMap::new());
        }
        let space: SearchSpace = search_space
            .iter()
            .filter(|(_, d)| !d.is_categorical() && !d.single())
            .map(|(name, d)| (name.clone(), d.clone()))
            .collect();
        if space.len() < 2 {
            return Err(Error::UnsupportedSearchSpace(
                "CMA-ES needs at least two numeric parameters".into(),
            ));
        }

        let (trials, partial) = match study.storage().get_all_trials(study.id()) {
            Ok(trials) => (trials, false),
            Err(Error::TrialsPartiallyDeleted(trials)) => (trials, true),
            Err(e) => return Err(e),
        };
        let mut completed: Vec<FrozenTrial> = trials
            .into_iter()
            .filter(|t| t.state == TrialState::Complete)
            .collect();
        completed.sort_by_key(|t| t.number);
        if completed.len() < self.n_startup_trials {
            return Ok(HashMap::new());
        }

        let mut state = self.state.lock();
        let state = &mut *state;

        if partial
            && let Some(optimizer) = &state.optimizer
            && completed.len() < optimizer.population_size()
        {
            trace_warn!(
                popsize = optimizer.population_size(),
                completed = completed.len(),
                "storage keeps fewer trials than one CMA-ES generation; deferring to the independent sampler"
            );
            return Ok(HashMap::new());
        }

        let mut optimizer = match state.optimizer.take() {
            Some(optimizer) => optimizer,
            None => self.init_optimizer(state, &space, None)?,
        };

        if optimizer.dim() != space.len() {
            trace_warn!(
                expected = optimizer.dim(),
                got = space.len(),
                "CMA-ES does not support a dynamic search space; deferring to the independent sampler"
            );
            state.optimizer = Some(optimizer);
            return Ok(HashMap::new());
        }

        let tag = format!("{}-{}", state.optimizer_id, optimizer.generation());
        let sign = study.direction().sign();
        let solutions: Vec<Solution> = completed
            .iter()
            .filter(|t| t.system_attrs.get(GENERATION_ATTR_KEY) == Some(&tag))
            .filter_map(|t| {
                let value = t.value?;
                let params = space
                    .iter()
                    .map(|(name, d)| Some(to_cma_param(d, *t.params_internal.get(name)?)))
                    .collect::<Option<Vec<f64>>>()?;
                Some(Solution::new(params, sign * value))
            })
            .take(optimizer.population_size())
            .collect();

        if solutions.len() == optimizer.population_size() {
            optimizer.tell(solutions)?;
            if self.restart_strategy.is_some() && optimizer.should_stop() {
                let popsize = self.next_popsize(state, &optimizer);
                trace_info!(
                    generation = optimizer.generation(),
                    popsize,
                    "restarting CMA-ES"
                );
                optimizer = self.init_optimizer(state, &space, Some(popsize))?;
            }
        }

        let x = optimizer.ask();
        let tag = format!("{}-{}", state.optimizer_id, optimizer.generation());
        state.optimizer = Some(optimizer);
        study
            .storage()
            .set_trial_system_attr(trial.id, GENERATION_ATTR_KEY, &tag)?;

        Ok(space
            .iter()
            .zip(x)
            .map(|((name, d), v)| (name.clone(), from_cma_param(d, v)))
            .collect())
    }
}

/// Builder for a [`CmaEsSampler`].
///
/// | Option | Default |
/// |--------|---------|
/// | `x0` | midpoint of each range (random after a restart) |
/// | `sigma0` | smallest range / 6 |
/// | `n_startup_trials` | 0 |
/// | `population_size` | `4 + floor(3 ln(dim))` |
/// | `restart_strategy` | none |
/// | `inc_popsize` | 2 |
/// | `seed` | random |
#[derive(Debug, Clone)]
pub struct CmaEsSamplerBuilder {
    x0: Option<HashMap<String, f64>>,
    sigma0: Option<f64>,
    n_startup_trials: usize,
    popsize: Option<usize>,
    restart_strategy: Option<RestartStrategy>,
    inc_popsize: usize,
    seed: Option<u64>,
}

impl Default for CmaEsSamplerBuilder {
    fn default() -> Self {
        Self {
            x0: None,
            sigma0: None,
            n_startup_trials: 0,
            popsize: None,
            restart_strategy: None,
            inc_popsize: 2,
            seed: None,
        }
    }
}

impl CmaEsSamplerBuilder {
    /// Initial mean, keyed by parameter name, in each parameter's own
    /// scale. Missing names use the default.
    #[must_use]
    pub fn x0(mut self, x0: HashMap<String, f64>) -> Self {
        self.x0 = Some(x0);
        self
    }

    /// Initial step-size. Non-positive values keep the default.
    #[must_use]
    pub fn sigma0(mut self, sigma0: f64) -> Self {
        self.sigma0 = Some(sigma0);
        self
    }

    /// Number of complete trials required before CMA-ES takes over.
    #[must_use]
    pub fn n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Population size of the first optimizer.
    #[must_use]
    pub fn population_size(mut self, popsize: usize) -> Self {
        self.popsize = Some(popsize);
        self
    }

    /// Restart converged optimizers with a larger population.
    #[must_use]
    pub fn restart_strategy(mut self, strategy: RestartStrategy) -> Self {
        self.restart_strategy = Some(strategy);
        self
    }

    /// Population growth factor per restart.
    #[must_use]
    pub fn inc_popsize(mut self, factor: usize) -> Self {
        self.inc_popsize = factor.max(1);
        self
    }

    /// Seed the sampler RNG. Every optimizer it creates is seeded from it.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the sampler.
    #[must_use]
    pub fn build(self) -> CmaEsSampler {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        CmaEsSampler {
            x0: self.x0,
            sigma0: self.sigma0,
            n_startup_trials: self.n_startup_trials,
            popsize: self.popsize,
            restart_strategy: self.restart_strategy,
            inc_popsize: self.inc_popsize,
            state: Mutex::new(CmaEsState {
                rng,
                optimizer: None,
                optimizer_id: String::new(),
                n_restarts: 0,
                n_small_eval: 0,
                n_large_eval: 0,
                popsize0: None,
                poptype: PopType::Small,
            }),
        }
    }
}

fn cma_bounds(distribution: &Distribution) -> (f64, f64) {
    match distribution {
        Distribution::LogUniform(d) => (d.low.ln(), d.high.ln()),
        other => other.internal_bounds(),
    }
}

fn to_cma_param(distribution: &Distribution, x: f64) -> f64 {
    match distribution {
        Distribution::LogUniform(_) => x.ln(),
        _ => x,
    }
}

fn from_cma_param(distribution: &Distribution, x: f64) -> f64 {
    match distribution {
        Distribution::Uniform(d) => below_high(x, d.low, d.high),
        Distribution::LogUniform(d) => below_high(x.exp(), d.low, d.high),
        other => other.to_internal(&other.to_external(x)).unwrap_or(x),
    }
}

/// Clamp into the half-open range `[low, high)`.
fn below_high(x: f64, low: f64, high: f64) -> f64 {
    if x >= high { high.next_down().max(low) } else { x.max(low) }
}
