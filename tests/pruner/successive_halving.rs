use hypertune::prelude::*;
use hypertune::pruner::{COMPLETED_RUNG_PREFIX, Pruner};

fn rung_key(rung: u32) -> String {
    format!("{COMPLETED_RUNG_PREFIX}{rung}")
}

fn sha(eta: u64) -> SuccessiveHalvingPruner {
    SuccessiveHalvingPruner::new()
        .min_resource(1)
        .reduction_factor(eta)
        .min_early_stopping_rate(0)
        .build()
        .unwrap()
}

#[test]
fn test_rungs_recorded_up_to_latest_step() {
    let study = Study::builder().pruner(sha(2)).build().unwrap();

    // Seven trials report 0.1 * (i + 1) at step 7; rungs sit at steps 1, 2, 4, 8
    study
        .optimize(7, |trial: &Trial| {
            let v = 0.1 * (trial.number() + 1) as f64;
            trial.report(7, v)?;
            if trial.should_prune()? {
                return Err(Error::TrialPruned);
            }
            Ok::<_, Error>(v)
        })
        .unwrap();

    let storage = study.storage();
    let id = storage.create_new_trial(study.id()).unwrap();
    storage.set_trial_intermediate_value(id, 7, 0.05).unwrap();
    let trial = storage.get_trial(id).unwrap();

    let pruned = study.pruner().unwrap().should_prune(&study, &trial).unwrap();
    assert!(!pruned, "the best value so far must be promoted");

    let attrs = storage.get_trial(id).unwrap().system_attrs;
    for rung in 0..3 {
        assert_eq!(
            attrs.get(&rung_key(rung)).map(String::as_str),
            Some("0.05"),
            "rung {rung} should be recorded"
        );
    }
    assert!(!attrs.contains_key(&rung_key(3)), "step 7 has not reached rung 3");
}

#[test]
fn test_worse_trials_are_pruned_at_first_rung() {
    let study = Study::builder().pruner(sha(2)).build().unwrap();

    study
        .optimize(7, |trial: &Trial| {
            let v = 0.1 * (trial.number() + 1) as f64;
            trial.report(7, v)?;
            if trial.should_prune()? {
                return Err(Error::TrialPruned);
            }
            Ok::<_, Error>(v)
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    // Each new trial is the worst so far, so only the first one survives
    assert_eq!(trials[0].state, TrialState::Complete);
    assert!(trials[0].system_attrs.contains_key(&rung_key(2)));
    for t in &trials[1..] {
        assert_eq!(t.state, TrialState::Pruned, "trial {}", t.number);
        assert!(t.system_attrs.contains_key(&rung_key(0)));
        assert!(!t.system_attrs.contains_key(&rung_key(1)));
    }
}

#[test]
fn test_first_arrivals_at_a_rung_are_never_pruned() {
    let eta = 4;
    let study = Study::builder().pruner(sha(eta)).build().unwrap();

    // Values get worse with every trial; the first eta - 1 still survive rung 0
    study
        .optimize(6, |trial: &Trial| {
            let v = (trial.number() + 1) as f64;
            trial.report(1, v)?;
            if trial.should_prune()? {
                return Err(Error::TrialPruned);
            }
            Ok::<_, Error>(v)
        })
        .unwrap();

    let states: Vec<TrialState> = study.get_trials().unwrap().iter().map(|t| t.state).collect();
    assert_eq!(
        states,
        vec![
            TrialState::Complete,
            TrialState::Complete,
            TrialState::Complete,
            TrialState::Pruned,
            TrialState::Pruned,
            TrialState::Pruned,
        ]
    );
}

#[test]
fn test_maximize_promotes_large_values() {
    let study = Study::builder().maximize().pruner(sha(2)).build().unwrap();

    study
        .optimize(4, |trial: &Trial| {
            let v = (trial.number() + 1) as f64;
            trial.report(1, v)?;
            if trial.should_prune()? {
                return Err(Error::TrialPruned);
            }
            Ok::<_, Error>(v)
        })
        .unwrap();

    // Every new trial is the best so far under maximization
    assert!(
        study
            .get_trials()
            .unwrap()
            .iter()
            .all(|t| t.state == TrialState::Complete)
    );
}

#[test]
fn test_min_early_stopping_rate_skips_rungs() {
    let pruner = SuccessiveHalvingPruner::new()
        .min_resource(2)
        .reduction_factor(3)
        .min_early_stopping_rate(1)
        .build()
        .unwrap();
    assert_eq!(pruner.promotion_step(0), Some(6));
    assert_eq!(pruner.promotion_step(1), Some(18));

    let study = Study::builder().pruner(pruner).build().unwrap();
    study
        .optimize(3, |trial: &Trial| {
            // never reaches the first rung
            trial.report(5, 100.0 * trial.number() as f64)?;
            assert!(!trial.should_prune()?);
            Ok::<_, Error>(0.0)
        })
        .unwrap();
    for t in study.get_trials().unwrap() {
        assert!(t.system_attrs.is_empty());
    }
}
