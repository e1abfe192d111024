use hypertune::prelude::*;

#[test]
fn test_summary_reflects_the_study() {
    let study = Study::builder()
        .name("summarized")
        .maximize()
        .build()
        .unwrap();
    study.set_user_attr("owner", "ml-team").unwrap();
    study.set_system_attr("version", "3").unwrap();

    let empty = study.summary().unwrap();
    assert_eq!(empty.name, "summarized");
    assert_eq!(empty.direction, Direction::Maximize);
    assert!(empty.best_trial.is_none());
    assert!(empty.datetime_start.is_none());

    study
        .optimize(5, |trial: &Trial| Ok::<_, Error>(trial.number() as f64))
        .unwrap();

    let summary = study.summary().unwrap();
    assert_eq!(summary.id, study.id());
    assert_eq!(summary.best_trial.as_ref().map(|t| t.number), Some(4));
    assert_eq!(summary.user_attrs["owner"], "ml-team");
    assert_eq!(summary.system_attrs["version"], "3");

    let first = &study.get_trials().unwrap()[0];
    assert_eq!(summary.datetime_start, Some(first.datetime_start));
}

#[test]
fn test_summary_of_deleted_study() {
    let study = Study::builder().name("gone").build().unwrap();
    study.storage().delete_study(study.id()).unwrap();
    assert!(matches!(study.summary(), Err(Error::StudyNotFound(name)) if name == "gone"));
}

#[test]
fn test_study_attrs_round_trip() {
    let study = Study::builder().build().unwrap();
    study.set_user_attr("a", "1").unwrap();
    study.set_user_attr("a", "2").unwrap();
    assert_eq!(study.get_user_attrs().unwrap()["a"], "2");
    assert!(study.get_system_attrs().unwrap().is_empty());
}

#[test]
fn test_trial_attrs_are_stored() {
    let study = Study::builder().build().unwrap();
    study
        .optimize(2, |trial: &Trial| {
            trial.set_user_attr("worker", "main")?;
            trial.set_system_attr("fold", &trial.number().to_string())?;
            assert_eq!(trial.user_attrs()?["worker"], "main");
            Ok::<_, Error>(0.0)
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    assert_eq!(trials[1].user_attrs["worker"], "main");
    assert_eq!(trials[1].system_attrs["fold"], "1");
}

#[test]
fn test_summary_serializes_to_json() {
    let study = Study::builder().name("json").build().unwrap();
    study
        .optimize(2, |trial: &Trial| {
            let x = trial.suggest_uniform("x", 0.0, 1.0)?;
            Ok::<_, Error>(x)
        })
        .unwrap();

    let summary = study.summary().unwrap();
    let json = serde_json::to_string(&summary).unwrap();
    let back: StudySummary = serde_json::from_str(&json).unwrap();
    assert_eq!(back, summary);
}
