#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Define-by-run hyperparameter optimization with a storage-centred design.
//! Objectives request parameters from a [`Trial`] while they run; samplers
//! and pruners learn from the trial history kept in a pluggable
//! [`Storage`](storage::Storage). Several workers may drive one study at
//! once, contending only through that storage.
//!
//! # Getting Started
//!
//! ```
//! use hypertune::prelude::*;
//!
//! let study = Study::builder()
//!     .sampler(TpeSampler::builder().seed(0).build().unwrap())
//!     .build()
//!     .unwrap();
//!
//! study
//!     .optimize(30, |trial: &Trial| {
//!         let x = trial.suggest_uniform("x", -10.0, 10.0)?;
//!         Ok::<_, Error>((x - 2.0).powi(2))
//!     })
//!     .unwrap();
//!
//! let best = study.get_best_trial().unwrap();
//! println!("best value {:?} with {:?}", best.value, best.params());
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Study`] | Drive the optimization loop over a shared storage. |
//! | [`Trial`] | Live handle used by an objective to suggest parameters and report progress. |
//! | [`FrozenTrial`] | Immutable snapshot of a trial as seen by samplers and pruners. |
//! | [`Distribution`](distribution::Distribution) | Domain of one parameter, with internal and external encodings. |
//! | [`Sampler`](sampler::Sampler) / [`RelativeSampler`](sampler::RelativeSampler) | Choose parameter values, one at a time or jointly. |
//! | [`Pruner`](pruner::Pruner) | Stop unpromising trials from their intermediate values. |
//! | [`Storage`](storage::Storage) | Persist studies and trials. |
//!
//! # Samplers
//!
//! | Sampler | Algorithm | Kind | Feature flag |
//! |---------|-----------|------|--------------|
//! | [`RandomSampler`](sampler::RandomSampler) | Uniform random | independent | — |
//! | [`TpeSampler`](sampler::TpeSampler) | Tree-structured Parzen Estimator | independent | — |
//! | [`SobolSampler`](sampler::SobolSampler) | Sobol quasi-random sequence | relative | — |
//! | [`CmaEsSampler`](sampler::CmaEsSampler) | CMA-ES with IPOP/BIPOP restarts | relative | `cma-es` |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key optimization points | on |
//! | `cma-es` | [`CmaEsSampler`](sampler::CmaEsSampler) and the low-level [`Optimizer`](sampler::cma_es::Optimizer) | on |
//! | `async` | `Study::optimize_async`, running workers on tokio's blocking pool | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

mod context;
pub mod distribution;
mod error;
pub mod multi_objective;
pub mod objective;
mod param;
pub mod pruner;
mod rng_util;
pub mod sampler;
pub mod storage;
mod study;
mod trial;
mod types;

pub use context::Context;
pub use error::{Error, Result, TrialPruned};
pub use objective::Objective;
pub use param::ParamValue;
pub use study::{Study, StudyBuilder, StudySummary};
pub use trial::{FrozenTrial, Trial};
pub use types::{Direction, TrialState};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use hypertune::prelude::*;
/// ```
pub mod prelude {
    pub use crate::context::Context;
    pub use crate::distribution::Distribution;
    pub use crate::error::{Error, Result, TrialPruned};
    pub use crate::objective::Objective;
    pub use crate::param::ParamValue;
    pub use crate::pruner::{
        HyperbandPruner, MedianPruner, PercentilePruner, Pruner, SuccessiveHalvingPruner,
    };
    #[cfg(feature = "cma-es")]
    pub use crate::sampler::CmaEsSampler;
    pub use crate::sampler::{RandomSampler, RelativeSampler, Sampler, SobolSampler, TpeSampler};
    pub use crate::storage::{BlackHoleStorage, InMemoryStorage, Storage};
    pub use crate::study::{Study, StudyBuilder, StudySummary};
    pub use crate::trial::{FrozenTrial, Trial};
    pub use crate::types::{Direction, TrialState};
}
