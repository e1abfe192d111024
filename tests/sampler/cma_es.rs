use std::collections::HashMap;

use hypertune::prelude::*;
use hypertune::sampler::cma_es::{GENERATION_ATTR_KEY, Optimizer, RestartStrategy, Solution};

fn quadratic(x: &[f64]) -> f64 {
    (x[0] - 3.0).powi(2) + (10.0 * (x[1] + 2.0)).powi(2)
}

fn run_generation(optimizer: &mut Optimizer, f: impl Fn(&[f64]) -> f64) {
    let solutions = (0..optimizer.population_size())
        .map(|_| {
            let x = optimizer.ask();
            let value = f(&x);
            Solution::new(x, value)
        })
        .collect();
    optimizer.tell(solutions).expect("tell should accept a full generation");
}

#[test]
fn test_optimizer_converges_on_ill_conditioned_quadratic() {
    let mut optimizer = Optimizer::builder(vec![1.0, 2.0], 1.3)
        .seed(0)
        .build()
        .unwrap();

    for _ in 0..50 {
        run_generation(&mut optimizer, quadratic);
    }
    assert_eq!(optimizer.generation(), 50);
    let mean = optimizer.mean();
    assert!(
        (mean[0] - 3.0).abs() < 1e-3 && (mean[1] + 2.0).abs() < 1e-3,
        "mean {mean:?} should be within 1e-3 of (3, -2) after 50 generations"
    );
}

#[test]
fn test_optimizer_repair_into_box() {
    let mut optimizer = Optimizer::builder(vec![0.0, -1.5], 1.3)
        .bounds(vec![(-1.0, 1.0), (-2.0, -1.0)])
        .seed(0)
        .build()
        .unwrap();

    let x = optimizer.ask();
    assert!(optimizer.is_feasible(&x), "ask should return a point in the box, got {x:?}");

    let mut x = vec![-1.5, 1.0];
    optimizer.repair_infeasible_params(&mut x).unwrap();
    assert_eq!(x, vec![-1.0, -1.0]);
}

#[test]
fn test_optimizer_repaired_points_are_feasible() {
    let optimizer = Optimizer::builder(vec![0.0, 0.0, 0.0], 1.0)
        .bounds(vec![(-1.0, 1.0), (0.0, 5.0), (-10.0, -9.0)])
        .seed(1)
        .build()
        .unwrap();

    let mut rng = fastrand::Rng::with_seed(17);
    for _ in 0..1000 {
        let mut x: Vec<f64> = (0..3).map(|_| (rng.f64() - 0.5) * 1e6).collect();
        optimizer.repair_infeasible_params(&mut x).unwrap();
        assert!(optimizer.is_feasible(&x), "{x:?} should be feasible after repair");
    }
}

#[test]
fn test_one_tell_per_population_advances_one_generation() {
    let mut optimizer = Optimizer::builder(vec![0.0; 4], 0.5)
        .population_size(10)
        .seed(8)
        .build()
        .unwrap();

    for expected in 1..=5 {
        run_generation(&mut optimizer, |x| x.iter().map(|v| v * v).sum());
        assert_eq!(optimizer.generation(), expected);
    }

    // A partial generation is rejected and does not advance the counter
    let partial = vec![Solution::new(optimizer.ask(), 0.0)];
    assert!(matches!(
        optimizer.tell(partial),
        Err(Error::TellSizeMismatch { expected: 10, got: 1 })
    ));
    assert_eq!(optimizer.generation(), 5);
}

#[test]
fn test_optimizer_seed_reproducibility() {
    let draw = |seed: u64| {
        let mut optimizer = Optimizer::builder(vec![0.0, 0.0], 1.0)
            .seed(seed)
            .build()
            .unwrap();
        (0..5).map(|_| optimizer.ask()).collect::<Vec<_>>()
    };
    assert_eq!(draw(4), draw(4));
    assert_ne!(draw(4), draw(5));
}

#[test]
fn test_optimizer_stops_on_flat_function() {
    let mut optimizer = Optimizer::builder(vec![0.0, 0.0], 1.0)
        .seed(2)
        .build()
        .unwrap();

    let mut stopped = false;
    for _ in 0..200 {
        run_generation(&mut optimizer, |_| 1.0);
        if optimizer.should_stop() {
            stopped = true;
            break;
        }
    }
    assert!(stopped, "a constant objective should trigger the tol_fun criterion");
}

#[test]
fn test_loose_tol_fun_stops_early() {
    let sphere = |x: &[f64]| x[0] * x[0] + x[1] * x[1];
    let build = |tol_fun: Option<f64>| {
        let builder = Optimizer::builder(vec![1.0, 1.0], 0.5)
            .population_size(6)
            .seed(0);
        match tol_fun {
            Some(tol) => builder.tol_fun(tol),
            None => builder,
        }
        .build()
        .unwrap()
    };
    let mut strict = build(None);
    let mut loose = build(Some(1e6));

    // Two dimensions with six candidates keep a 20 generation value history
    for _ in 0..20 {
        run_generation(&mut strict, sphere);
        run_generation(&mut loose, sphere);
    }
    assert!(!loose.should_stop(), "the value history is not full yet");

    run_generation(&mut strict, sphere);
    run_generation(&mut loose, sphere);
    assert!(loose.should_stop());
    assert!(!strict.should_stop());
}

#[test]
fn test_non_positive_tolerance_is_rejected() {
    let built = Optimizer::builder(vec![0.0, 0.0], 1.0).tol_fun(0.0).build();
    assert!(matches!(built, Err(Error::InvalidConfig(_))));
    let built = Optimizer::builder(vec![0.0, 0.0], 1.0)
        .tol_x(f64::NAN)
        .build();
    assert!(matches!(built, Err(Error::InvalidConfig(_))));
}

#[test]
fn test_cma_es_sampler_sphere() {
    let study = Study::builder()
        .relative_sampler(CmaEsSampler::with_seed(42))
        .sampler(RandomSampler::with_seed(42))
        .build()
        .unwrap();

    study
        .optimize(200, |trial: &Trial| {
            let x = trial.suggest_uniform("x", -5.0, 5.0)?;
            let y = trial.suggest_uniform("y", -5.0, 5.0)?;
            Ok::<_, Error>(x * x + y * y)
        })
        .unwrap();

    let best = study.get_best_value().unwrap();
    assert!(best < 0.1, "sphere best value should be < 0.1, got {best}");
}

#[test]
fn test_cma_es_sampler_tags_generations() {
    let sampler = CmaEsSampler::builder().population_size(4).seed(1).build();
    let study = Study::builder()
        .relative_sampler(sampler)
        .sampler(RandomSampler::with_seed(1))
        .build()
        .unwrap();

    study
        .optimize(13, |trial: &Trial| {
            let x = trial.suggest_uniform("x", -1.0, 1.0)?;
            let n = trial.suggest_int("n", -10, 10)?;
            Ok::<_, Error>(x * x + (n * n) as f64)
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    // The tag key is shared with stored studies written by other tools
    assert_eq!(GENERATION_ATTR_KEY, "goptuna:cmaes:generationId");
    assert!(trials[1].system_attrs.contains_key("goptuna:cmaes:generationId"));
    // The first trial has no search space to sample from yet
    assert!(!trials[0].system_attrs.contains_key(GENERATION_ATTR_KEY));

    let tags: Vec<&String> = trials[1..]
        .iter()
        .map(|t| {
            t.system_attrs
                .get(GENERATION_ATTR_KEY)
                .expect("relative trials carry a generation tag")
        })
        .collect();
    let generations: Vec<&str> = tags
        .iter()
        .map(|tag| tag.rsplit('-').next().unwrap())
        .collect();
    assert_eq!(
        generations,
        vec!["0", "0", "0", "0", "1", "1", "1", "1", "2", "2", "2", "2"]
    );

    for t in &trials {
        let n = t.param("n").and_then(|p| p.as_i64()).unwrap();
        assert!((-10..=10).contains(&n));
    }
}

#[test]
fn test_cma_es_sampler_maximize_with_log_parameter() {
    let study = Study::builder()
        .maximize()
        .relative_sampler(CmaEsSampler::with_seed(3))
        .sampler(RandomSampler::with_seed(3))
        .build()
        .unwrap();

    study
        .optimize(150, |trial: &Trial| {
            let lr = trial.suggest_loguniform("lr", 1e-4, 1.0)?;
            let x = trial.suggest_uniform("x", -3.0, 3.0)?;
            assert!((1e-4..=1.0).contains(&lr));
            Ok::<_, Error>(-(lr.log10() + 2.0).powi(2) - (x - 1.0).powi(2))
        })
        .unwrap();

    let params = study.get_best_params().unwrap();
    let lr = params["lr"].as_f64().unwrap();
    let x = params["x"].as_f64().unwrap();
    assert!((lr.log10() + 2.0).abs() < 0.3, "lr {lr} should be near 1e-2");
    assert!((x - 1.0).abs() < 0.3, "x {x} should be near 1");
}

#[test]
fn test_cma_es_sampler_falls_back_on_single_parameter() {
    let study = Study::builder()
        .relative_sampler(CmaEsSampler::with_seed(0))
        .sampler(RandomSampler::with_seed(0))
        .build()
        .unwrap();

    study
        .optimize(10, |trial: &Trial| {
            let x = trial.suggest_uniform("x", 0.0, 1.0)?;
            let c = trial.suggest_categorical("c", ["a", "b"])?;
            Ok::<_, Error>(x + if c == "a" { 0.0 } else { 1.0 })
        })
        .unwrap();

    let trials = study.get_trials().unwrap();
    assert_eq!(trials.len(), 10);
    assert!(
        trials
            .iter()
            .all(|t| !t.system_attrs.contains_key(GENERATION_ATTR_KEY)),
        "one numeric dimension is left to the independent sampler"
    );
}

#[test]
fn test_cma_es_sampler_with_user_start_point_and_restarts() {
    let sampler = CmaEsSampler::builder()
        .x0(HashMap::from([("x".to_string(), 2.0), ("y".to_string(), -2.0)]))
        .sigma0(0.5)
        .restart_strategy(RestartStrategy::Ipop)
        .seed(5)
        .build();
    let study = Study::builder()
        .relative_sampler(sampler)
        .sampler(RandomSampler::with_seed(5))
        .build()
        .unwrap();

    study
        .optimize(120, |trial: &Trial| {
            let x = trial.suggest_uniform("x", -5.0, 5.0)?;
            let y = trial.suggest_uniform("y", -5.0, 5.0)?;
            Ok::<_, Error>((x - 2.0).powi(2) + (y + 2.0).powi(2))
        })
        .unwrap();

    assert_eq!(study.n_trials().unwrap(), 120);
    let best = study.get_best_value().unwrap();
    assert!(best < 0.1, "best value {best} should be near 0");
}
