use hypertune::prelude::*;
use hypertune::sampler::sobol::{Engine, MAX_DIM};

#[test]
fn test_sobol_engine_reference_points() {
    let expected = [
        [0.5, 0.5, 0.5],
        [0.75, 0.25, 0.25],
        [0.25, 0.75, 0.75],
        [0.375, 0.375, 0.625],
        [0.875, 0.875, 0.125],
        [0.625, 0.125, 0.875],
        [0.125, 0.625, 0.375],
        [0.1875, 0.3125, 0.9375],
        [0.6875, 0.8125, 0.4375],
        [0.9375, 0.0625, 0.6875],
    ];

    let mut engine = Engine::new(3).unwrap();
    for (i, want) in expected.iter().enumerate() {
        let got = engine.draw();
        assert!(got.iter().all(|x| (0.0..1.0).contains(x)), "point {i} = {got:?}");
        assert_eq!(got, want.to_vec(), "point {i}");
    }
    assert_eq!(engine.n_drawn(), 10);
}

#[test]
fn test_sobol_engine_is_deterministic() {
    let mut a = Engine::new(MAX_DIM).unwrap();
    let mut b = Engine::new(MAX_DIM).unwrap();
    for _ in 0..500 {
        assert_eq!(a.draw(), b.draw());
    }

    // A lower-dimensional engine yields the leading coordinates of a higher one
    let mut small = Engine::new(4).unwrap();
    let mut large = Engine::new(10).unwrap();
    for _ in 0..100 {
        assert_eq!(small.draw(), large.draw()[..4].to_vec());
    }
}

#[test]
fn test_sobol_sampler_in_study() {
    let study = Study::builder()
        .relative_sampler(SobolSampler::new())
        .sampler(RandomSampler::with_seed(0))
        .build()
        .unwrap();

    study
        .optimize(32, |trial: &Trial| {
            let x = trial.suggest_uniform("x", -1.0, 1.0)?;
            let n = trial.suggest_int("n", 0, 7)?;
            let c = trial.suggest_categorical("c", ["a", "b", "c", "d"])?;
            assert!((0..=7).contains(&n));
            Ok::<_, Error>(x + n as f64 + if c == "a" { 0.0 } else { 1.0 })
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    // trial 0 is sampled independently, the next 31 walk the sequence
    let sobol = &trials[1..];

    // The first 31 points are a (0, 5, 2)-net without the origin: every cell
    // of width 1/32 holds one point except the one at zero.
    let mut n_counts = [0; 8];
    for t in sobol {
        let n = t.param("n").and_then(|p| p.as_i64()).unwrap();
        n_counts[n as usize] += 1;
    }
    assert_eq!(n_counts, [3, 4, 4, 4, 4, 4, 4, 4]);

    let mut c_counts = std::collections::BTreeMap::new();
    for t in sobol {
        *c_counts.entry(t.param("c").unwrap().to_string()).or_insert(0) += 1;
    }
    let c_counts: Vec<(String, i32)> = c_counts.into_iter().collect();
    assert_eq!(
        c_counts,
        vec![
            ("a".to_string(), 7),
            ("b".to_string(), 8),
            ("c".to_string(), 8),
            ("d".to_string(), 8)
        ]
    );
}

#[test]
fn test_sobol_sampler_skip_changes_the_points() {
    let first_x = |sampler: SobolSampler| {
        let study = Study::builder()
            .relative_sampler(sampler)
            .sampler(RandomSampler::with_seed(1))
            .build()
            .unwrap();
        study
            .optimize(2, |trial: &Trial| {
                let x = trial.suggest_uniform("x", 0.0, 1.0)?;
                Ok::<_, Error>(x)
            })
            .unwrap();
        study.get_trials().unwrap()[1].value.unwrap()
    };

    assert_eq!(first_x(SobolSampler::new()), 0.5);
    // skipping 4 points lands on the fifth: 0.875
    assert_eq!(first_x(SobolSampler::builder().skip_initial_points(5).build()), 0.875);
}

#[test]
fn test_sobol_sampler_too_many_parameters_falls_back() {
    let study = Study::builder()
        .relative_sampler(SobolSampler::new())
        .sampler(RandomSampler::with_seed(2))
        .build()
        .unwrap();

    let n_params = MAX_DIM + 1;
    study
        .optimize(3, |trial: &Trial| {
            let mut total = 0.0;
            for i in 0..n_params {
                total += trial.suggest_uniform(&format!("x{i}"), 0.0, 1.0)?;
            }
            Ok::<_, Error>(total)
        })
        .unwrap();

    assert_eq!(study.n_trials().unwrap(), 3);
}
