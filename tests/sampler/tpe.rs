use hypertune::prelude::*;

#[test]
fn test_tpe_quadratic_bowl() {
    let sampler = TpeSampler::builder().seed(0).build().unwrap();
    let study = Study::builder().sampler(sampler).build().unwrap();

    // 50 trials is enough for most seeds; 100 leaves margin for the fixed one.
    study
        .optimize(100, |trial: &Trial| {
            let x1 = trial.suggest_uniform("x1", -10.0, 10.0)?;
            let x2 = trial.suggest_uniform("x2", -10.0, 10.0)?;
            Ok::<_, Error>((x1 - 2.0).powi(2) + (x2 + 5.0).powi(2))
        })
        .unwrap();

    let best = study.get_best_trial().unwrap();
    let value = best.value.unwrap();
    assert!(value <= 1.0, "best value should be <= 1.0, got {value}");

    let params = study.get_best_params().unwrap();
    let x1 = params["x1"].as_f64().unwrap();
    let x2 = params["x2"].as_f64().unwrap();
    assert!((x1 - 2.0).abs() <= 0.5, "x1 = {x1} should be near 2");
    assert!((x2 + 5.0).abs() <= 0.5, "x2 = {x2} should be near -5");
}

#[test]
fn test_tpe_beats_random_on_average() {
    let objective = |trial: &Trial| {
        let x = trial.suggest_uniform("x", -10.0, 10.0)?;
        Ok::<_, Error>((x - 3.0).powi(2))
    };

    let tpe_study = Study::builder()
        .sampler(TpeSampler::builder().seed(11).build().unwrap())
        .build()
        .unwrap();
    tpe_study.optimize(60, objective).unwrap();

    let tpe_tail: f64 = tpe_study
        .get_trials()
        .unwrap()
        .iter()
        .skip(40)
        .map(|t| t.value.unwrap())
        .sum::<f64>()
        / 20.0;

    // uniform on [-10, 10] gives E[(x-3)^2] = 9 + 100/3
    assert!(
        tpe_tail < 20.0,
        "late TPE trials should concentrate near the optimum, mean value {tpe_tail}"
    );
}

#[test]
fn test_tpe_maximize() {
    let study = Study::builder()
        .maximize()
        .sampler(TpeSampler::builder().seed(3).build().unwrap())
        .build()
        .unwrap();

    study
        .optimize(80, |trial: &Trial| {
            let x = trial.suggest_uniform("x", 0.0, 10.0)?;
            Ok::<_, Error>(-(x - 7.0).powi(2))
        })
        .unwrap();

    let best = study.get_best_value().unwrap();
    assert!(best > -0.5, "best value {best} should approach 0");
}

#[test]
fn test_tpe_integer_and_categorical() {
    let sampler = TpeSampler::builder()
        .n_startup_trials(5)
        .seed(5)
        .build()
        .unwrap();
    let study = Study::builder().sampler(sampler).build().unwrap();

    study
        .optimize(60, |trial: &Trial| {
            let n = trial.suggest_int("n", -20, 20)?;
            let k = trial.suggest_step_int("k", 0, 100, 10)?;
            let kind = trial.suggest_categorical("kind", ["bad", "good", "worse"])?;
            assert!((-20..=20).contains(&n));
            assert_eq!(k % 10, 0);
            let penalty = match kind.as_str() {
                "good" => 0.0,
                "bad" => 100.0,
                _ => 200.0,
            };
            Ok::<_, Error>((n - 4).pow(2) as f64 + (k - 30).abs() as f64 + penalty)
        })
        .unwrap();

    let params = study.get_best_params().unwrap();
    assert_eq!(params["kind"], ParamValue::Categorical("good".into()));
    let best = study.get_best_value().unwrap();
    assert!(best < 100.0, "best value {best} should come from the good category");

    let good = study
        .get_trials()
        .unwrap()
        .iter()
        .skip(30)
        .filter(|t| t.param("kind").is_some_and(|p| p.as_str() == Some("good")))
        .count();
    assert!(good > 15, "TPE should favour the good category, got {good}/30");
}

#[test]
fn test_tpe_log_and_discrete_stay_in_domain() {
    let study = Study::builder()
        .sampler(TpeSampler::builder().n_startup_trials(3).seed(9).build().unwrap())
        .build()
        .unwrap();

    study
        .optimize(40, |trial: &Trial| {
            let lr = trial.suggest_loguniform("lr", 1e-5, 1.0)?;
            let q = trial.suggest_discrete_uniform("q", -1.0, 1.0, 0.25)?;
            assert!((1e-5..=1.0).contains(&lr), "lr {lr} out of range");
            assert!((-1.0..=1.0).contains(&q), "q {q} out of range");
            let k = ((q + 1.0) / 0.25).round();
            assert!((q - (-1.0 + k * 0.25)).abs() < 1e-9, "q {q} is off the grid");
            Ok::<_, Error>((lr.ln() - 1e-3_f64.ln()).powi(2) + q * q)
        })
        .unwrap();
}

#[test]
fn test_tpe_learns_from_pruned_trials() {
    let study = Study::builder()
        .sampler(TpeSampler::builder().n_startup_trials(5).seed(21).build().unwrap())
        .build()
        .unwrap();

    // Every second trial is pruned after reporting a value
    study
        .optimize(30, |trial: &Trial| {
            let x = trial.suggest_uniform("x", -5.0, 5.0)?;
            let v = x * x;
            trial.report(1, v)?;
            if trial.number() % 2 == 1 {
                return Err(Error::TrialPruned);
            }
            Ok::<_, Error>(v)
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    assert_eq!(trials.len(), 30);
    let pruned = trials
        .iter()
        .filter(|t| t.state == TrialState::Pruned)
        .count();
    assert_eq!(pruned, 15);
}

#[test]
fn test_tpe_invalid_configuration() {
    assert!(matches!(
        TpeSampler::builder().n_ei_candidates(0).build(),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        TpeSampler::builder().prior_weight(0.0).build(),
        Err(Error::InvalidConfig(_))
    ));
}
