use super::SearchSpace;
use crate::trial::FrozenTrial;
use crate::types::TrialState;

/// Intersection of the search spaces of every complete trial.
///
/// Starts from the first complete trial's distributions and keeps only the
/// names present in every later complete trial with an equal distribution.
/// Categorical parameters are kept; samplers that cannot handle them filter
/// the result themselves.
///
/// # Examples
///
/// ```
/// use hypertune::distribution::{Distribution, UniformDistribution};
/// use hypertune::sampler::intersection_search_space;
/// use hypertune::{FrozenTrial, TrialState};
///
/// let x = Distribution::Uniform(UniformDistribution::new(0.0, 1.0).unwrap());
/// let y = Distribution::Uniform(UniformDistribution::new(0.0, 2.0).unwrap());
///
/// let mut a = FrozenTrial::new(0, 0, 0);
/// a.state = TrialState::Complete;
/// a.distributions.insert("x".into(), x.clone());
/// a.distributions.insert("y".into(), y.clone());
/// let mut b = a.clone();
/// b.distributions.remove("y");
///
/// let space = intersection_search_space(&[a, b]);
/// assert_eq!(space.len(), 1);
/// assert_eq!(space["x"], x);
/// ```
#[must_use]
pub fn intersection_search_space(trials: &[FrozenTrial]) -> SearchSpace {
    let mut complete = trials.iter().filter(|t| t.state == TrialState::Complete);
    let Some(first) = complete.next() else {
        return SearchSpace::new();
    };

    let mut space = first.distributions.clone();
    for trial in complete {
        space.retain(|name, dist| trial.distributions.get(name) == Some(dist));
        if space.is_empty() {
            break;
        }
    }
    space
}
