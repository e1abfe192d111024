//! Tree-Parzen Estimator (TPE) sampler.
//!
//! TPE models `p(x | y)` instead of `p(y | x)`. It splits the observations of
//! a parameter into a "below" set (the best `gamma(n)`) and an "above" set,
//! fits a Parzen estimator to each, and proposes the candidate that
//! maximizes `l(x) / g(x)`, an approximation of expected improvement.
//!
//! | Knob | Default |
//! |------|---------|
//! | `n_startup_trials` | 10 |
//! | `n_ei_candidates` | 24 |
//! | gamma | [`default_gamma`]: `min(ceil(0.1 n), 25)` |
//! | weights | [`default_weights`]: ramp then 25 flat ones |
//! | prior | on, weight 1.0 |
//! | magic clip | on |
//! | endpoints | off |
//!
//! # Examples
//!
//! ```
//! use hypertune::prelude::*;
//!
//! let sampler = TpeSampler::builder().seed(7).build().unwrap();
//! let study = Study::builder().sampler(sampler).build().unwrap();
//! study
//!     .optimize(20, |trial: &Trial| {
//!         let lr = trial.suggest_log_float("lr", 1e-5, 1e-1)?;
//!         let layers = trial.suggest_int("layers", 1, 4)?;
//!         Ok::<_, Error>(lr.ln().abs() + layers as f64)
//!     })
//!     .unwrap();
//! ```

mod parzen_estimator;
mod sampler;

pub use parzen_estimator::{WeightsFn, default_weights};
pub use sampler::{GammaFn, TpeSampler, TpeSamplerBuilder, default_gamma};
