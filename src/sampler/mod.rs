//! Sampler traits and implementations.
//!
//! A [`Sampler`] picks one parameter at a time; a [`RelativeSampler`] picks
//! a joint assignment for a whole [`SearchSpace`] before the objective runs.
//! Both only see trial history through the study's storage.
//!
//! # Available samplers
//!
//! | Sampler | Kind | Description |
//! |---------|------|-------------|
//! | [`RandomSampler`] | independent | Uniform over the internal encoding |
//! | [`TpeSampler`] | independent | Tree-structured Parzen Estimator |
//! | [`SobolSampler`] | relative | Low-discrepancy quasi-random sequence |
//! | [`CmaEsSampler`] | relative | CMA-ES with optional IPOP/BIPOP restarts (feature `cma-es`) |

use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "cma-es")]
pub mod cma_es;
pub mod random;
mod search_space;
pub mod sobol;
pub mod tpe;

#[cfg(feature = "cma-es")]
pub use cma_es::CmaEsSampler;
pub use random::RandomSampler;
pub use search_space::intersection_search_space;
pub use sobol::SobolSampler;
pub use tpe::TpeSampler;

use crate::distribution::Distribution;
use crate::error::Result;
use crate::study::Study;
use crate::trial::FrozenTrial;

/// A frozen map from parameter name to distribution.
pub type SearchSpace = BTreeMap<String, Distribution>;

/// Chooses one parameter value at a time.
///
/// Implementations must handle every [`Distribution`] variant and return a
/// value in its internal encoding. A single instance is shared by every
/// worker of a study, so mutable state (RNGs, caches) must sit behind a lock.
pub trait Sampler: Send + Sync {
    /// Sample `name` from `distribution` for `trial`.
    ///
    /// # Errors
    ///
    /// Storage errors while reading history.
    fn sample(
        &self,
        study: &Study,
        trial: &FrozenTrial,
        name: &str,
        distribution: &Distribution,
    ) -> Result<f64>;
}

/// Chooses a joint assignment for a whole search space.
///
/// Returning an empty map defers every parameter to the study's independent
/// [`Sampler`].
pub trait RelativeSampler: Send + Sync {
    /// Sample every parameter of `search_space` for `trial`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedSearchSpace`](crate::Error::UnsupportedSearchSpace)
    /// for shapes the sampler cannot handle, plus storage errors.
    fn sample_relative(
        &self,
        study: &Study,
        trial: &FrozenTrial,
        search_space: &SearchSpace,
    ) -> Result<HashMap<String, f64>>;
}
