use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use symbios_evolve::variation::{directed_walk, random_walk, seeded};
use symbios_evolve::{
    CancelToken, ConfigError, Evaluation, EvolutionConfig, EvolutionDriver, EvolutionError,
    Oracle, OracleError, Pcg64, Stage, StopReason, VariationFallback,
};

// --- Mock Infrastructure for Edge Case Testing ---

/// Counts 'b' characters; mutation appends a 'b'. `fail` decides, from the
/// 1-based evaluation call number, how an evaluation goes wrong.
struct FlakyOracle {
    calls: AtomicUsize,
    fail: fn(usize) -> Option<Result<Evaluation, OracleError>>,
    cancel_after: Option<(usize, CancelToken)>,
}

impl FlakyOracle {
    fn new(fail: fn(usize) -> Option<Result<Evaluation, OracleError>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
            cancel_after: None,
        }
    }
}

impl Oracle<String> for FlakyOracle {
    fn mutate<R: Rng>(&self, g: &String, _rng: &mut R) -> Result<String, OracleError> {
        Ok(format!("{g}b"))
    }
    fn crossover<R: Rng>(&self, a: &String, b: &String, rng: &mut R) -> Result<String, OracleError> {
        Ok(if rng.random_bool(0.5) { a.clone() } else { b.clone() })
    }
    fn evaluate(&self, g: &String) -> Result<Evaluation, OracleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = &self.cancel_after {
            if call == *after {
                token.cancel();
            }
        }
        if let Some(outcome) = (self.fail)(call) {
            return outcome;
        }
        Ok(Evaluation::new(vec![g.matches('b').count() as f32]))
    }
    fn is_valid(&self, _g: &String) -> bool {
        true
    }
}

/// Every variation operator is rejected by the oracle.
struct BrokenOperators;

impl Oracle<String> for BrokenOperators {
    fn mutate<R: Rng>(&self, _g: &String, _rng: &mut R) -> Result<String, OracleError> {
        Err(OracleError::InvalidOperation("malformed genotype".into()))
    }
    fn crossover<R: Rng>(&self, _a: &String, _b: &String, _rng: &mut R) -> Result<String, OracleError> {
        Err(OracleError::InvalidOperation("incompatible parents".into()))
    }
    fn evaluate(&self, g: &String) -> Result<Evaluation, OracleError> {
        Ok(Evaluation::new(vec![g.len() as f32]))
    }
    fn is_valid(&self, _g: &String) -> bool {
        true
    }
}

fn seed_b<O>(_: &O, _: &mut Pcg64) -> Result<String, OracleError> {
    Ok("b".to_string())
}

fn config() -> EvolutionConfig {
    EvolutionConfig {
        population_size: 10,
        generation_limit: 6,
        mutation_rate: 0.7,
        crossover_rate: 0.3,
        ..EvolutionConfig::default()
    }
}

// ============================================================================
// Evaluation failures
// ============================================================================

#[test]
fn test_failed_evaluations_are_regenerated() {
    let oracle = FlakyOracle::new(|call| {
        (call % 5 == 0).then(|| Err(OracleError::EvaluationFailure("simulation crashed".into())))
    });
    let mut driver = EvolutionDriver::new(config(), oracle, seed_b).unwrap();
    let report = driver.run().unwrap();

    assert_eq!(report.generations, 6);
    assert_eq!(report.population.len(), 10);
    assert!(report.population.iter().all(|m| m.fitness.is_some()));

    let failures: u64 = report.summaries.iter().map(|s| s.evaluation_failures).sum();
    let evaluations: u64 = report.summaries.iter().map(|s| s.evaluations).sum();
    assert!(failures > 0);
    assert_eq!(evaluations as usize, driver.oracle().calls.load(Ordering::SeqCst));
}

#[test]
fn test_empty_criteria_count_as_failures() {
    let oracle = FlakyOracle::new(|call| (call % 3 == 0).then(|| Ok(Evaluation::new(vec![]))));
    let mut driver = EvolutionDriver::new(config(), oracle, seed_b).unwrap();
    let report = driver.run().unwrap();

    assert!(
        report
            .population
            .iter()
            .all(|m| m.fitness.as_ref().is_some_and(|f| !f.criteria().is_empty()))
    );
    assert!(report.summaries[0].evaluation_failures > 0);
}

#[test]
fn test_oracle_down_from_the_start_is_fatal() {
    let oracle = FlakyOracle::new(|_| Some(Err(OracleError::EvaluationFailure("timeout".into()))));
    let mut driver = EvolutionDriver::new(config(), oracle, seed_b).unwrap();
    let err = driver.run().unwrap_err();

    assert_eq!(err.stage, Stage::EvaluatingInitial);
    assert_eq!(err.last_generation, None);
    assert!(matches!(
        err.kind(),
        EvolutionError::OracleUnavailable {
            failures: 10,
            evaluations: 10
        }
    ));
}

#[test]
fn test_oracle_dying_mid_run_reports_last_generation() {
    // 10 initial + 9 offspring per generation: generations 1 and 2 complete,
    // generation 3 runs into the outage.
    let oracle = FlakyOracle::new(|call| {
        (call > 30).then(|| Err(OracleError::EvaluationFailure("connection lost".into())))
    });
    let config = EvolutionConfig {
        generation_limit: 20,
        ..config()
    };
    let mut driver = EvolutionDriver::new(config, oracle, seed_b).unwrap();
    let err = driver.run().unwrap_err();

    assert_eq!(err.stage, Stage::EvaluatingOffspring);
    assert_eq!(err.last_generation, Some(2));
    assert!(matches!(err.kind(), EvolutionError::OracleUnavailable { .. }));
    assert_eq!(driver.summaries().len(), 3);
}

#[test]
fn test_outage_after_long_healthy_run_is_detected_quickly() {
    let oracle = FlakyOracle::new(|call| {
        (call > 2000).then(|| Err(OracleError::EvaluationFailure("simulator died".into())))
    });
    let config = EvolutionConfig {
        generation_limit: 1000,
        ..config()
    };
    let mut driver = EvolutionDriver::new(config, oracle, seed_b).unwrap();
    let err = driver.run().unwrap_err();

    assert_eq!(err.stage, Stage::EvaluatingOffspring);
    assert!(matches!(err.kind(), EvolutionError::OracleUnavailable { .. }));
    let calls_after_outage = driver.oracle().calls.load(Ordering::SeqCst) - 2000;
    assert!(
        calls_after_outage <= 10,
        "dead oracle was called {calls_after_outage} more times"
    );
}

#[test]
fn test_nan_fitness_does_not_break_the_run() {
    let oracle = FlakyOracle::new(|call| (call % 2 == 0).then(|| Ok(Evaluation::new(vec![f32::NAN]))));
    let mut driver = EvolutionDriver::new(config(), oracle, seed_b).unwrap();
    let report = driver.run().unwrap();

    let best = report.best.unwrap();
    assert!(!best.fitness.unwrap().primary().is_nan());
    assert!(report.summaries.iter().all(|s| s.best.is_some_and(|b| !b.is_nan())));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_contradictory_configuration_is_fatal_before_any_generation() {
    let config = EvolutionConfig {
        population_size: 1,
        crossover_rate: 0.5,
        replacement: symbios_evolve::ReplacementPolicy::Generational { elitism: 0 },
        ..EvolutionConfig::default()
    };
    let err = match EvolutionDriver::new(config, BrokenOperators, seed_b) {
        Ok(_) => panic!("configuration should have been rejected"),
        Err(err) => err,
    };
    assert_eq!(err.stage, Stage::Init);
    assert_eq!(err.last_generation, None);
    assert!(matches!(
        err.kind(),
        EvolutionError::Configuration(ConfigError::CrossoverWithoutPartners(1))
    ));
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancellation_before_the_first_generation() {
    let mut driver = EvolutionDriver::new(config(), BrokenOperators, seed_b).unwrap();
    driver.cancel_token().cancel();
    let report = driver.run().unwrap();
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.generations, 0);
    assert!(report.population.iter().all(|m| m.fitness.is_some()));
}

#[test]
fn test_cancellation_lets_the_generation_finish() {
    let token = CancelToken::default();
    let mut oracle = FlakyOracle::new(|_| None);
    // Cancel in the middle of generation 1's offspring evaluation
    oracle.cancel_after = Some((14, token.clone()));
    let mut driver = EvolutionDriver::new(config(), oracle, seed_b)
        .unwrap()
        .with_cancel_token(token);
    let report = driver.run().unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.generations, 1);
    assert_eq!(driver.oracle().calls.load(Ordering::SeqCst), 19);
    assert!(report.population.iter().all(|m| m.fitness.is_some()));
}

// ============================================================================
// Variation failures
// ============================================================================

#[test]
fn test_substitute_parent_keeps_run_alive() {
    let config = EvolutionConfig {
        variation_fallback: VariationFallback::SubstituteParent,
        ..config()
    };
    let mut driver = EvolutionDriver::new(config, BrokenOperators, seed_b).unwrap();
    let report = driver.run().unwrap();
    assert_eq!(report.generations, 6);
    assert!(report.population.iter().all(|m| m.genotype == "b"));
}

#[test]
fn test_retry_fallback_exhausts_the_gate() {
    let config = EvolutionConfig {
        mutation_rate: 1.0,
        crossover_rate: 0.0,
        max_validity_retries: 5,
        ..config()
    };
    let mut driver = EvolutionDriver::new(config, BrokenOperators, seed_b).unwrap();
    let err = driver.run().unwrap_err();
    assert_eq!(err.stage, Stage::Varying);
    assert_eq!(err.last_generation, Some(0));
    assert!(matches!(
        err.kind(),
        EvolutionError::ExhaustedRetries { attempts: 5 }
    ));
}

// ============================================================================
// Random genotypes
// ============================================================================

#[test]
fn test_random_walk_rejects_invalid_start() {
    struct OnlyB;
    impl Oracle<String> for OnlyB {
        fn mutate<R: Rng>(&self, g: &String, rng: &mut R) -> Result<String, OracleError> {
            Ok(format!("{g}{}", if rng.random_bool(0.5) { 'b' } else { 'x' }))
        }
        fn crossover<R: Rng>(&self, a: &String, _: &String, _: &mut R) -> Result<String, OracleError> {
            Ok(a.clone())
        }
        fn evaluate(&self, g: &String) -> Result<Evaluation, OracleError> {
            Ok(Evaluation::new(vec![g.len() as f32]))
        }
        fn is_valid(&self, g: &String) -> bool {
            g.chars().all(|c| c == 'b')
        }
    }

    let mut rng = <Pcg64 as rand::SeedableRng>::seed_from_u64(1);
    assert!(matches!(
        random_walk(&OnlyB, &"x".to_string(), 10, &mut rng),
        Err(OracleError::InvalidOperation(_))
    ));

    let walked = random_walk(&OnlyB, &"b".to_string(), 40, &mut rng).unwrap();
    assert!(OnlyB.is_valid(&walked));
    assert!(walked.len() > 1);
}

#[test]
fn test_directed_walk_reaches_the_target() {
    // Mutation appends a 'b': 10 undirected steps reach length 11, the
    // directed half then grows to exactly 15 and refuses to overshoot.
    let oracle = FlakyOracle::new(|_| None);
    let mut rng = <Pcg64 as rand::SeedableRng>::seed_from_u64(1);
    let distance = |g: &String| Some(g.len().abs_diff(15) as f32);

    let walked = directed_walk(&oracle, &"b".to_string(), 20, distance, false, &mut rng).unwrap();
    assert_eq!(walked.len(), 15);
}

#[test]
fn test_directed_walk_miss_is_an_error_unless_best_effort() {
    // Length only grows, so a target of 8 is out of reach once the
    // undirected half has produced 11 characters.
    let oracle = FlakyOracle::new(|_| None);
    let mut rng = <Pcg64 as rand::SeedableRng>::seed_from_u64(1);
    let distance = |g: &String| Some(g.len().abs_diff(8) as f32);

    let missed = directed_walk(&oracle, &"b".to_string(), 20, distance, false, &mut rng);
    assert!(matches!(missed, Err(OracleError::InvalidOperation(_))));

    let closest = directed_walk(&oracle, &"b".to_string(), 20, distance, true, &mut rng).unwrap();
    assert_eq!(closest.len(), 11);
}

#[test]
fn test_seeded_initializer_grows_from_one_genotype() {
    let config = EvolutionConfig {
        generation_limit: 0,
        ..config()
    };
    let oracle = FlakyOracle::new(|_| None);
    let mut driver = EvolutionDriver::new(config, oracle, seeded("b".to_string(), 4)).unwrap();
    let report = driver.run().unwrap();
    // Every mutation appends a 'b' and every mutant is valid
    assert!(report.population.iter().all(|m| m.genotype == "bbbbb"));
}
