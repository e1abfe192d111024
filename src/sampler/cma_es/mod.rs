//! CMA-ES (Covariance Matrix Adaptation Evolution Strategy) sampler.
//!
//! CMA-ES maintains a multivariate Gaussian over the numeric parameters and
//! adapts its mean, covariance matrix and step-size from the ranking of each
//! completed generation. It is one of the most effective derivative-free
//! optimizers for continuous search spaces.
//!
//! The module has two layers:
//!
//! - [`Optimizer`] is a plain ask-and-tell optimizer over `f64` vectors with
//!   optional box bounds. It knows nothing about studies.
//! - [`CmaEsSampler`] is a [`RelativeSampler`](crate::sampler::RelativeSampler)
//!   that drives an [`Optimizer`] from the trial history, tagging each trial
//!   with the generation it was asked in (see [`GENERATION_ATTR_KEY`]).
//!
//! Categorical and single-valued parameters are left to the study's
//! independent sampler. Search spaces with fewer than two numeric
//! parameters are rejected with
//! [`Error::UnsupportedSearchSpace`](crate::Error::UnsupportedSearchSpace),
//! which makes the study fall back to independent sampling.
//!
//! With a [`RestartStrategy`], the sampler starts a fresh optimizer with a
//! larger population whenever the current one converges or diverges
//! (IPOP-CMA-ES and BIPOP-CMA-ES).
//!
//! Requires the `cma-es` feature flag.
//!
//! # Examples
//!
//! ```
//! use hypertune::prelude::*;
//! use hypertune::sampler::cma_es::{CmaEsSampler, RestartStrategy};
//!
//! let sampler = CmaEsSampler::builder()
//!     .restart_strategy(RestartStrategy::Ipop)
//!     .seed(1)
//!     .build();
//! let study = Study::builder().relative_sampler(sampler).build().unwrap();
//! study
//!     .optimize(30, |trial: &Trial| {
//!         let x = trial.suggest_uniform("x", -4.0, 4.0)?;
//!         let y = trial.suggest_int("y", -3, 3)?;
//!         Ok::<_, Error>(x * x + (y as f64).powi(2))
//!     })
//!     .unwrap();
//! ```

mod optimizer;
mod sampler;

pub use optimizer::{Optimizer, OptimizerBuilder, Solution};
pub use sampler::{CmaEsSampler, CmaEsSamplerBuilder, GENERATION_ATTR_KEY, RestartStrategy};
