use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hypertune::distribution::{Distribution, UniformDistribution};
use hypertune::prelude::*;
use hypertune::sampler::SearchSpace;

use crate::init_tracing;

#[test]
fn test_study_basic_workflow() {
    init_tracing();
    let study = Study::builder()
        .sampler(TpeSampler::builder().seed(1).build().unwrap())
        .build()
        .unwrap();

    study
        .optimize(10, |trial: &Trial| {
            let x = trial.suggest_uniform("x", -5.0, 5.0)?;
            Ok::<_, Error>(x * x)
        })
        .expect("optimization should succeed");

    assert_eq!(study.n_trials().unwrap(), 10);
    let best = study.get_best_trial().expect("should have best trial");
    assert!(best.value.unwrap() >= 0.0, "x^2 should be non-negative");
    assert_eq!(best.state, TrialState::Complete);
    assert!(best.datetime_complete.is_some());
}

#[test]
fn test_trial_numbers_follow_creation_order() {
    let study = Study::builder().build().unwrap();
    study
        .optimize(5, |trial: &Trial| Ok::<_, Error>(trial.number() as f64))
        .unwrap();

    let numbers: Vec<u64> = study.get_trials().unwrap().iter().map(|t| t.number).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_every_trial_reaches_a_final_state() {
    init_tracing();
    let study = Study::builder()
        .sampler(RandomSampler::with_seed(3))
        .ignore_error(true)
        .build()
        .unwrap();

    study
        .optimize(30, |trial: &Trial| {
            let x = trial.suggest_uniform("x", 0.0, 1.0)?;
            match trial.number() % 3 {
                0 => Ok::<_, Error>(x),
                1 => Err(Error::TrialPruned),
                _ => Err(Error::objective(std::io::Error::other("diverged"))),
            }
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    assert_eq!(trials.len(), 30);
    let count = |state: TrialState| trials.iter().filter(|t| t.state == state).count();
    assert_eq!(count(TrialState::Complete), 10);
    assert_eq!(count(TrialState::Pruned), 10);
    assert_eq!(count(TrialState::Fail), 10);
    assert_eq!(
        count(TrialState::Complete) + count(TrialState::Pruned) + count(TrialState::Fail),
        30
    );
}

#[test]
fn test_failure_stops_the_loop_unless_ignored() {
    let study = Study::builder().build().unwrap();

    let result = study.optimize(10, |trial: &Trial| {
        if trial.number() == 2 {
            return Err(Error::objective("boom"));
        }
        Ok::<_, Error>(1.0)
    });

    assert!(matches!(result, Err(Error::Objective(_))), "{result:?}");
    let trials = study.get_trials().unwrap();
    assert_eq!(trials.len(), 3, "the loop stops at the failing trial");
    assert_eq!(trials[2].state, TrialState::Fail);
}

#[test]
fn test_completed_values_match_the_objective() {
    let objective = |x: f64, n: i64, kind: &str| -> f64 {
        let bonus = if kind == "b" { 0.5 } else { 0.0 };
        (x - 1.0).powi(2) + n as f64 + bonus
    };

    let study = Study::builder()
        .sampler(RandomSampler::with_seed(12))
        .build()
        .unwrap();
    study
        .optimize(25, |trial: &Trial| {
            let x = trial.suggest_uniform("x", -3.0, 3.0)?;
            let n = trial.suggest_int("n", 0, 5)?;
            let kind = trial.suggest_categorical("kind", ["a", "b"])?;
            Ok::<_, Error>(objective(x, n, kind.as_str()))
        })
        .unwrap();

    for t in study.get_trials().unwrap() {
        let params = t.params();
        let x = params["x"].as_f64().unwrap();
        let n = params["n"].as_i64().unwrap();
        let kind = params["kind"].as_str().unwrap();
        assert_eq!(t.value, Some(objective(x, n, kind)), "trial {}", t.number);
    }
}

#[test]
fn test_best_trial_is_not_dominated() {
    for direction in [Direction::Minimize, Direction::Maximize] {
        let study = Study::builder()
            .direction(direction)
            .sampler(RandomSampler::with_seed(5))
            .build()
            .unwrap();
        study
            .optimize(40, |trial: &Trial| {
                let x = trial.suggest_uniform("x", -1.0, 1.0)?;
                Ok::<_, Error>(x.sin())
            })
            .unwrap();

        let best = study.get_best_trial().unwrap();
        let best_value = best.value.unwrap();
        for t in study.get_trials().unwrap() {
            let v = t.value.unwrap();
            assert!(
                !direction.is_better(v, best_value),
                "{direction}: trial {} ({v}) beats the best ({best_value})",
                t.number
            );
        }
    }
}

#[test]
fn test_best_trial_tie_goes_to_earliest() {
    let study = Study::builder().build().unwrap();
    study
        .optimize(4, |trial: &Trial| {
            Ok::<_, Error>(if trial.number() == 0 { 5.0 } else { 1.0 })
        })
        .unwrap();
    assert_eq!(study.get_best_trial().unwrap().number, 1);
}

#[test]
fn test_no_completed_trials_error() {
    let study = Study::builder().build().unwrap();
    assert!(matches!(study.get_best_trial(), Err(Error::NoCompletedTrials)));
    assert!(matches!(study.get_best_value(), Err(Error::NoCompletedTrials)));
}

#[test]
fn test_delete_study_clears_summaries() {
    let study = Study::builder().name("to-delete").build().unwrap();
    study
        .optimize(10, |trial: &Trial| {
            let x = trial.suggest_uniform("x", 0.0, 1.0)?;
            Ok::<_, Error>(x)
        })
        .unwrap();
    assert_eq!(study.storage().get_all_study_summaries().unwrap().len(), 1);

    study.storage().delete_study(study.id()).unwrap();
    assert!(study.storage().get_all_study_summaries().unwrap().is_empty());
    assert!(matches!(
        study.storage().get_study_id_from_name("to-delete"),
        Err(Error::StudyNotFound(_))
    ));
}

#[test]
fn test_should_prune_requires_an_intermediate_value() {
    let study = Study::builder().pruner(MedianPruner::new()).build().unwrap();

    study
        .optimize(1, |trial: &Trial| {
            assert!(matches!(trial.should_prune(), Err(Error::NoIntermediateValues)));

            trial.report(3, 0.5)?;
            trial.report(1, 0.7)?;
            let snapshot = trial.snapshot()?;
            assert_eq!(snapshot.latest_step(), Some(3));
            assert_eq!(snapshot.last_intermediate_value(), Some(0.5));
            assert!(!trial.should_prune()?);
            Ok::<_, Error>(0.5)
        })
        .unwrap();

    // Without a pruner the call still checks for a report
    let study = Study::builder().build().unwrap();
    study
        .optimize(1, |trial: &Trial| {
            assert!(trial.should_prune().is_err());
            trial.report(0, 1.0)?;
            assert!(!trial.should_prune()?);
            Ok::<_, Error>(1.0)
        })
        .unwrap();
}

#[test]
fn test_report_updates_the_running_value() {
    let study = Study::builder().build().unwrap();
    study
        .optimize(1, |trial: &Trial| {
            trial.report(0, 3.0)?;
            assert_eq!(trial.snapshot()?.value, Some(3.0));
            trial.report(1, 2.0)?;
            assert_eq!(trial.snapshot()?.value, Some(2.0));
            Ok::<_, Error>(1.0)
        })
        .unwrap();
    assert_eq!(study.get_best_value().unwrap(), 1.0);
}

#[test]
fn test_finished_trials_are_frozen() {
    let study = Study::builder().build().unwrap();
    study.optimize(1, |_: &Trial| Ok::<_, Error>(1.0)).unwrap();

    let trial = &study.get_trials().unwrap()[0];
    let storage = study.storage();
    assert!(matches!(
        storage.set_trial_value(trial.id, 2.0),
        Err(Error::TrialNotUpdatable)
    ));
    assert!(matches!(
        storage.set_trial_user_attr(trial.id, "k", "v"),
        Err(Error::TrialNotUpdatable)
    ));
}

#[test]
fn test_parameter_conflict_within_a_trial() {
    let study = Study::builder().build().unwrap();
    let result = study.optimize(1, |trial: &Trial| {
        trial.suggest_uniform("x", 0.0, 1.0)?;
        trial.suggest_int("x", 0, 10)?;
        Ok::<_, Error>(0.0)
    });
    assert!(matches!(result, Err(Error::ParameterConflict { .. })), "{result:?}");
}

#[test]
fn test_repeated_suggest_returns_the_same_value() {
    let study = Study::builder().build().unwrap();
    study
        .optimize(3, |trial: &Trial| {
            let a = trial.suggest_uniform("x", 0.0, 1.0)?;
            let b = trial.suggest_uniform("x", 0.0, 1.0)?;
            assert_eq!(a, b);
            Ok::<_, Error>(a)
        })
        .unwrap();
}

#[test]
fn test_invalid_distributions_are_rejected() {
    let study = Study::builder().ignore_error(true).build().unwrap();
    study
        .optimize(1, |trial: &Trial| {
            assert!(matches!(
                trial.suggest_uniform("a", 1.0, 0.0),
                Err(Error::InvalidBounds { .. })
            ));
            assert!(matches!(
                trial.suggest_loguniform("b", 0.0, 1.0),
                Err(Error::InvalidLogBounds)
            ));
            assert!(matches!(
                trial.suggest_step_int("c", 0, 10, 0),
                Err(Error::InvalidStep)
            ));
            assert!(matches!(
                trial.suggest_categorical("d", Vec::<String>::new()),
                Err(Error::EmptyChoices)
            ));
            Ok::<_, Error>(0.0)
        })
        .unwrap();
}

struct BrokenRelativeSampler {
    calls: Arc<AtomicUsize>,
}

impl RelativeSampler for BrokenRelativeSampler {
    fn sample_relative(
        &self,
        _study: &Study,
        _trial: &FrozenTrial,
        search_space: &SearchSpace,
    ) -> Result<HashMap<String, f64>> {
        assert!(!search_space.is_empty(), "called with an empty search space");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Internal("relative sampler is broken"))
    }
}

#[test]
fn test_setup_failure_marks_the_trial_failed() {
    let calls = Arc::default();
    let study = Study::builder()
        .relative_sampler(BrokenRelativeSampler {
            calls: Arc::clone(&calls),
        })
        .ignore_error(true)
        .build()
        .unwrap();

    study
        .optimize(3, |trial: &Trial| {
            let x = trial.suggest_uniform("x", 0.0, 1.0)?;
            Ok::<_, Error>(x)
        })
        .unwrap();

    // The first trial has no history, so the relative sampler is skipped
    let states: Vec<TrialState> = study.get_trials().unwrap().iter().map(|t| t.state).collect();
    assert_eq!(
        states,
        vec![TrialState::Complete, TrialState::Fail, TrialState::Fail]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_setup_failure_is_returned_without_ignore_error() {
    let study = Study::builder()
        .relative_sampler(BrokenRelativeSampler {
            calls: Arc::default(),
        })
        .define_search_space(
            [(
                "x".to_string(),
                Distribution::Uniform(UniformDistribution::new(0.0, 1.0).unwrap()),
            )]
            .into(),
        )
        .build()
        .unwrap();

    let result = study.optimize(3, |trial: &Trial| {
        let x = trial.suggest_uniform("x", 0.0, 1.0)?;
        Ok::<_, Error>(x)
    });

    assert!(matches!(result, Err(Error::Internal(_))), "{result:?}");
    let trials = study.get_trials().unwrap();
    assert_eq!(trials.len(), 1);
    assert_eq!(trials[0].state, TrialState::Fail);
    assert!(trials[0].datetime_complete.is_some());
}
