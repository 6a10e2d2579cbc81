use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use symbios_evolve::{Evaluation, EvolutionConfig, EvolutionDriver, Oracle, OracleError};

/// Slow oracle standing in for an external simulator.
#[derive(Default)]
struct HeavyOracle {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Oracle<Vec<f32>> for HeavyOracle {
    fn mutate<R: Rng>(&self, g: &Vec<f32>, rng: &mut R) -> Result<Vec<f32>, OracleError> {
        let mut g = g.clone();
        let i = rng.random_range(0..g.len());
        g[i] += rng.random_range(0.0..1.0);
        Ok(g)
    }
    fn crossover<R: Rng>(&self, a: &Vec<f32>, b: &Vec<f32>, rng: &mut R) -> Result<Vec<f32>, OracleError> {
        Ok(a.iter()
            .zip(b)
            .map(|(&x, &y)| if rng.random_bool(0.5) { x } else { y })
            .collect())
    }
    fn evaluate(&self, g: &Vec<f32>) -> Result<Evaluation, OracleError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // Simulate heavy physics work (2ms)
        std::thread::sleep(Duration::from_millis(2));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Evaluation::new(vec![g.iter().sum()]))
    }
    fn is_valid(&self, g: &Vec<f32>) -> bool {
        g.len() == 8
    }
}

fn heavy_config(workers: usize) -> EvolutionConfig {
    EvolutionConfig {
        population_size: 64,
        generation_limit: 4,
        evaluation_workers: workers,
        ..EvolutionConfig::default()
    }
}

fn zeros<O>(_: &O, _: &mut symbios_evolve::Pcg64) -> Result<Vec<f32>, OracleError> {
    Ok(vec![0.0; 8])
}

#[test]
fn stress_test_results_follow_their_individuals() {
    let mut driver = EvolutionDriver::new(heavy_config(4), HeavyOracle::default(), zeros).unwrap();
    let report = driver.run().unwrap();

    for member in &report.population {
        let expected: f32 = member.genotype.iter().sum();
        assert_eq!(member.primary_fitness(), Some(expected), "id {}", member.id);
    }
}

#[test]
fn stress_test_worker_count_does_not_change_the_run() {
    let run = |workers| {
        let mut driver =
            EvolutionDriver::new(heavy_config(workers), HeavyOracle::default(), zeros).unwrap();
        let report = driver.run().unwrap();
        report
            .population
            .into_iter()
            .map(|m| (m.id, m.genotype))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(1), run(4));
}

#[test]
fn stress_test_parallel_throughput() {
    // 64 initial + 4 generations of 63 offspring
    let evaluations = 64 + 4 * 63;

    println!("Starting Heavy Stress Test ({evaluations} evaluations @ 2ms sleep)...");
    let start = Instant::now();
    let mut driver = EvolutionDriver::new(heavy_config(4), HeavyOracle::default(), zeros).unwrap();
    driver.run().unwrap();
    let duration = start.elapsed();

    println!("Throughput: {} evals in {:?}", evaluations, duration);

    #[cfg(feature = "parallel")]
    {
        let peak = driver.oracle().peak.load(Ordering::SeqCst);
        assert!(peak > 1, "evaluations never overlapped");
        assert!(peak <= 4, "more evaluations in flight than workers: {peak}");

        // Sequential would be at least evaluations * 2ms
        let sequential_estimate_ms = evaluations as u64 * 2;
        let actual_ms = duration.as_millis() as u64;
        let speedup = sequential_estimate_ms as f64 / actual_ms.max(1) as f64;

        println!(
            "Sequential estimate: {}ms, Actual: {}ms, Speedup: {:.2}x",
            sequential_estimate_ms, actual_ms, speedup
        );

        // Require at least 1.5x speedup (conservative for CI environments)
        assert!(
            speedup > 1.5,
            "Parallel execution should provide speedup. Got {:.2}x (expected > 1.5x)",
            speedup
        );
    }

    #[cfg(not(feature = "parallel"))]
    assert_eq!(driver.oracle().peak.load(Ordering::SeqCst), 1);
}
