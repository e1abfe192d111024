use hypertune::prelude::*;
use hypertune::pruner::{COMPLETED_RUNG_PREFIX, Pruner};

fn pruner() -> HyperbandPruner {
    HyperbandPruner::builder()
        .min_resource(1)
        .reduction_factor(2)
        .min_early_stopping_rate_low(0)
        .min_early_stopping_rate_high(3)
        .build()
        .unwrap()
}

#[test]
fn test_hyperband_runs_every_trial() {
    let study = Study::builder().pruner(pruner()).build().unwrap();

    study
        .optimize(40, |trial: &Trial| {
            for step in 1..=16 {
                trial.report(step, 1.0)?;
                if trial.should_prune()? {
                    return Err(Error::TrialPruned);
                }
            }
            Ok::<_, Error>(1.0)
        })
        .expect("no trial should raise");

    let trials = study.get_trials().unwrap();
    assert_eq!(trials.len(), 40);
    // Ties are promoted, so a constant objective never prunes
    assert!(trials.iter().all(|t| t.state == TrialState::Complete));

    // Bracket 0 (rate 0) decides its first rung at step 1, bracket 1 at step 2
    let first_rung = format!("{COMPLETED_RUNG_PREFIX}0");
    let third_rung = format!("{COMPLETED_RUNG_PREFIX}2");
    let fifth_rung = format!("{COMPLETED_RUNG_PREFIX}4");
    assert!(trials[0].system_attrs.contains_key(&fifth_rung), "16 = 2^4");
    assert!(trials[20].system_attrs.contains_key(&third_rung));
    assert!(
        !trials[20].system_attrs.contains_key(&fifth_rung),
        "bracket 1 tops out at 2^4 = rung 3"
    );
    assert!(trials[39].system_attrs.contains_key(&first_rung));
}

#[test]
fn test_bracket_budgets_and_dispatch() {
    let pruner = pruner();
    assert_eq!(pruner.n_brackets(), 4);
    assert_eq!(pruner.bracket_budgets(), &[20, 16, 12, 8]);

    let total: u64 = pruner.bracket_budgets().iter().sum();
    assert_eq!(total, 56);
    for number in 0..200 {
        assert_eq!(
            pruner.bracket_of(number),
            pruner.bracket_of(number % total),
            "trial {number}"
        );
    }

    let mut counts = [0; 4];
    for number in 0..total {
        counts[pruner.bracket_of(number)] += 1;
    }
    assert_eq!(counts, [20, 16, 12, 8]);
    assert_eq!(pruner.bracket_of(0), 0);
    assert_eq!(pruner.bracket_of(35), 1);
    assert_eq!(pruner.bracket_of(36), 2);
    assert_eq!(pruner.bracket_of(55), 3);
}

#[test]
fn test_brackets_do_not_compete() {
    let study = Study::builder().pruner(pruner()).build().unwrap();

    // Bracket 0 holds trials 0..20 with good values. Trial 20 opens bracket 1
    // with a much worse value and still survives, being alone in its bracket.
    study
        .optimize(21, |trial: &Trial| {
            let v = if trial.number() < 20 { 0.0 } else { 100.0 };
            trial.report(2, v)?;
            if trial.should_prune()? {
                return Err(Error::TrialPruned);
            }
            Ok::<_, Error>(v)
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    assert_eq!(trials[20].state, TrialState::Complete);

    // Trial 21 joins trial 20 in bracket 1; a plain SHA over the whole study
    // would prune it against the twenty zeros of bracket 0.
    let storage = study.storage();
    let id = storage.create_new_trial(study.id()).unwrap();
    storage.set_trial_intermediate_value(id, 2, 100.0).unwrap();
    let candidate = storage.get_trial(id).unwrap();
    assert_eq!(candidate.number, 21);
    assert!(!study.pruner().unwrap().should_prune(&study, &candidate).unwrap());

    let sha = SuccessiveHalvingPruner::new()
        .reduction_factor(2)
        .min_early_stopping_rate(1)
        .build()
        .unwrap();
    let id = storage.create_new_trial(study.id()).unwrap();
    storage.set_trial_intermediate_value(id, 2, 100.0).unwrap();
    let candidate = storage.get_trial(id).unwrap();
    assert!(sha.should_prune(&study, &candidate).unwrap());
}

#[test]
fn test_invalid_rate_range() {
    assert!(matches!(
        HyperbandPruner::builder()
            .min_early_stopping_rate_low(3)
            .min_early_stopping_rate_high(1)
            .build(),
        Err(Error::InvalidConfig(_))
    ));
    assert!(HyperbandPruner::new().is_ok());
}
