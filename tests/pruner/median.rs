use hypertune::prelude::*;
use hypertune::pruner::Pruner;

fn is_pruned_at(study: &Study, step: u64, value: f64) -> bool {
    let storage = study.storage();
    let id = storage.create_new_trial(study.id()).unwrap();
    storage.set_trial_intermediate_value(id, step, value).unwrap();
    let trial = storage.get_trial(id).unwrap();
    study.pruner().unwrap().should_prune(study, &trial).unwrap()
}

fn study_with_history(direction: Direction, pruner: MedianPruner) -> Study {
    let study = Study::builder()
        .direction(direction)
        .pruner(pruner)
        .build()
        .unwrap();
    study
        .optimize(5, |trial: &Trial| {
            let v = (trial.number() + 1) as f64;
            trial.report(1, v)?;
            Ok::<_, Error>(v)
        })
        .unwrap();
    study
}

#[test]
fn prune_when_worse_than_median_minimize() {
    let study = study_with_history(Direction::Minimize, MedianPruner::new().n_startup_trials(0));

    // median of [1, 2, 3, 4, 5] is 3
    assert!(is_pruned_at(&study, 1, 3.1));
    assert!(!is_pruned_at(&study, 1, 3.0));
    assert!(!is_pruned_at(&study, 1, 2.1));
}

#[test]
fn prune_when_worse_than_median_maximize() {
    let study = study_with_history(Direction::Maximize, MedianPruner::new().n_startup_trials(0));

    assert!(is_pruned_at(&study, 1, 2.9));
    assert!(!is_pruned_at(&study, 1, 3.0));
    assert!(!is_pruned_at(&study, 1, 3.9));
}

#[test]
fn default_startup_trials() {
    // Five complete trials satisfy the default of five startup trials
    let study = study_with_history(Direction::Minimize, MedianPruner::new());
    assert!(is_pruned_at(&study, 1, 10.0));

    let study = Study::builder().pruner(MedianPruner::new()).build().unwrap();
    study
        .optimize(4, |trial: &Trial| {
            trial.report(1, 1.0)?;
            Ok::<_, Error>(1.0)
        })
        .unwrap();
    assert!(!is_pruned_at(&study, 1, 10.0), "four complete trials are not enough");
}

#[test]
fn warmup_steps() {
    let study = study_with_history(
        Direction::Minimize,
        MedianPruner::new().n_startup_trials(0).n_warmup_steps(1),
    );
    assert!(!is_pruned_at(&study, 1, 10.0));
}
