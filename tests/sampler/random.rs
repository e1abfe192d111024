use hypertune::prelude::*;

#[test]
fn test_random_sampler_uniform_float_distribution() {
    let study = Study::builder()
        .sampler(RandomSampler::with_seed(42))
        .build()
        .expect("study should build");

    let n_samples = 1000;
    study
        .optimize(n_samples, |trial: &Trial| {
            let x = trial.suggest_uniform("x", 0.0, 1.0)?;
            Ok::<_, Error>(x)
        })
        .unwrap();

    let mut samples: Vec<f64> = study
        .get_trials()
        .unwrap()
        .iter()
        .map(|t| t.value.expect("completed trials have a value"))
        .collect();
    for &s in &samples {
        assert!((0.0..1.0).contains(&s), "sample {s} out of range [0, 1)");
    }

    // Check distribution is roughly uniform by looking at quartiles
    samples.sort_by(f64::total_cmp);
    let q1 = samples[n_samples / 4];
    let q2 = samples[n_samples / 2];
    let q3 = samples[3 * n_samples / 4];
    assert!((q1 - 0.25).abs() < 0.1, "Q1 {q1} should be close to 0.25");
    assert!((q2 - 0.5).abs() < 0.1, "Q2 (median) {q2} should be close to 0.5");
    assert!((q3 - 0.75).abs() < 0.1, "Q3 {q3} should be close to 0.75");
}

#[test]
fn test_random_sampler_uniform_int_distribution() {
    let study = Study::builder()
        .sampler(RandomSampler::with_seed(123))
        .build()
        .unwrap();

    let n_samples = 5000;
    study
        .optimize(n_samples, |trial: &Trial| {
            let n = trial.suggest_int("n", 1, 10)?;
            assert!((1..=10).contains(&n), "sample {n} out of range [1, 10]");
            Ok::<_, Error>(n as f64)
        })
        .unwrap();

    let mut counts = [0u32; 10];
    for t in study.get_trials().unwrap() {
        counts[(t.value.unwrap() - 1.0) as usize] += 1;
    }
    let expected = n_samples as f64 / 10.0;
    for (i, &c) in counts.iter().enumerate() {
        let deviation = (f64::from(c) - expected).abs() / expected;
        assert!(
            deviation < 0.2,
            "value {} drawn {c} times, expected about {expected}",
            i + 1
        );
    }
}

#[test]
fn test_random_sampler_covers_every_distribution() {
    let study = Study::builder()
        .sampler(RandomSampler::with_seed(7))
        .build()
        .unwrap();

    study
        .optimize(200, |trial: &Trial| {
            let lr = trial.suggest_loguniform("lr", 1e-5, 1e-1)?;
            assert!((1e-5..=1e-1).contains(&lr), "lr {lr} out of range");

            let dropout = trial.suggest_discrete_uniform("dropout", 0.0, 0.5, 0.1)?;
            let k = (dropout / 0.1).round();
            assert!((dropout - k * 0.1).abs() < 1e-9, "{dropout} is off the grid");

            let units = trial.suggest_step_int("units", 32, 256, 32)?;
            assert_eq!(units % 32, 0);
            assert!((32..=256).contains(&units));

            let optimizer = trial.suggest_categorical("optimizer", ["adam", "sgd", "rmsprop"])?;
            assert!(["adam", "sgd", "rmsprop"].contains(&optimizer.as_str()));

            Ok::<_, Error>(lr)
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    let mut seen: Vec<String> = trials
        .iter()
        .filter_map(|t| t.param("optimizer"))
        .map(|p| p.to_string())
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3, "every category should be drawn in 200 trials");
}

#[test]
fn test_random_sampler_seed_reproducibility() {
    let run = |seed: u64| -> Vec<f64> {
        let study = Study::builder()
            .sampler(RandomSampler::with_seed(seed))
            .build()
            .unwrap();
        study
            .optimize(20, |trial: &Trial| {
                let x = trial.suggest_uniform("x", -5.0, 5.0)?;
                Ok::<_, Error>(x)
            })
            .unwrap();
        study
            .get_trials()
            .unwrap()
            .iter()
            .map(|t| t.value.unwrap())
            .collect()
    };

    assert_eq!(run(99), run(99));
    assert_ne!(run(99), run(100));
}

#[test]
fn test_random_sampler_single_point_domains() {
    let study = Study::builder()
        .sampler(RandomSampler::with_seed(0))
        .build()
        .unwrap();

    study
        .optimize(5, |trial: &Trial| {
            assert_eq!(trial.suggest_uniform("a", 1.5, 1.5)?, 1.5);
            assert_eq!(trial.suggest_int("b", 3, 3)?, 3);
            assert_eq!(trial.suggest_categorical("c", ["only"])?, "only");
            Ok::<_, Error>(0.0)
        })
        .unwrap();
}
