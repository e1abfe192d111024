//! Quasi-random sampling with Sobol low-discrepancy sequences.
//!
//! [`Engine`] produces the unscrambled Sobol sequence in `[0, 1)^d` using
//! the Joe-Kuo direction numbers, skipping the all-zero first point.
//! [`SobolSampler`] is a [`RelativeSampler`](crate::sampler::RelativeSampler)
//! that draws one point per trial and maps each coordinate onto its
//! distribution, so the trials of a study fill the search space far more
//! evenly than [`RandomSampler`](crate::sampler::RandomSampler) does.
//!
//! The sequence is fully deterministic: the `n`-th point depends only on
//! `n` and the dimension. Workers sharing one sampler share its engine, so
//! no two trials get the same point.
//!
//! # Examples
//!
//! ```
//! use hypertune::prelude::*;
//!
//! let study = Study::builder()
//!     .relative_sampler(SobolSampler::builder().skip_initial_points(16).build())
//!     .build()
//!     .unwrap();
//! study
//!     .optimize(16, |trial: &Trial| {
//!         let x = trial.suggest_uniform("x", -1.0, 1.0)?;
//!         let y = trial.suggest_uniform("y", -1.0, 1.0)?;
//!         Ok::<_, Error>(x * x + y * y)
//!     })
//!     .unwrap();
//! ```

mod engine;
mod sampler;

pub use engine::{Engine, MAX_DIM};
pub use sampler::{SobolSampler, SobolSamplerBuilder};
