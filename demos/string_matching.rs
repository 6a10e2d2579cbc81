use rand::Rng;
use symbios_evolve::{
    Evaluation, EvolutionConfig, EvolutionDriver, Oracle, OracleError, Pcg64, ReplacementPolicy,
    SelectionPolicy, StopReason,
};

const TARGET: &str = "Sovereign Symbiosis";
const MAX_LEN: usize = 40;

/// Variable-length printable strings. Fitness counts matching positions and
/// penalizes every byte of length mismatch.
struct StringOracle;

impl Oracle<Vec<u8>> for StringOracle {
    fn mutate<R: Rng>(&self, g: &Vec<u8>, rng: &mut R) -> Result<Vec<u8>, OracleError> {
        let mut g = g.clone();
        match rng.random_range(0..4) {
            0 if !g.is_empty() => {
                g.remove(rng.random_range(0..g.len()));
            }
            1 => {
                let at = rng.random_range(0..=g.len());
                g.insert(at, rng.random_range(32..126));
            }
            _ if !g.is_empty() => {
                let at = rng.random_range(0..g.len());
                g[at] = rng.random_range(32..126);
            }
            _ => return Err(OracleError::InvalidOperation("nothing to mutate".into())),
        }
        Ok(g)
    }

    fn crossover<R: Rng>(&self, a: &Vec<u8>, b: &Vec<u8>, rng: &mut R) -> Result<Vec<u8>, OracleError> {
        let split = rng.random_range(0..=a.len().min(b.len()));
        let mut child = a[..split].to_vec();
        child.extend_from_slice(&b[split..]);
        Ok(child)
    }

    fn evaluate(&self, g: &Vec<u8>) -> Result<Evaluation, OracleError> {
        let matches = g
            .iter()
            .zip(TARGET.as_bytes())
            .filter(|(a, b)| a == b)
            .count() as f32;
        let mismatch = g.len().abs_diff(TARGET.len()) as f32;
        Ok(Evaluation::new(vec![matches - mismatch]))
    }

    fn is_valid(&self, g: &Vec<u8>) -> bool {
        !g.is_empty() && g.len() <= MAX_LEN && g.iter().all(|b| (32..126).contains(b))
    }

    fn dissimilarity(&self, a: &Vec<u8>, b: &Vec<u8>) -> Result<f32, OracleError> {
        let differing = a.iter().zip(b).filter(|(x, y)| x != y).count();
        Ok((differing + a.len().abs_diff(b.len())) as f32)
    }
}

fn random_string(_: &StringOracle, rng: &mut Pcg64) -> Result<Vec<u8>, OracleError> {
    let len = rng.random_range(1..=MAX_LEN);
    Ok((0..len).map(|_| rng.random_range(32..126)).collect())
}

fn main() {
    let config = EvolutionConfig {
        population_size: 100,
        generation_limit: 2000,
        mutation_rate: 0.9,
        crossover_rate: 0.3,
        selection: SelectionPolicy::Tournament { size: 4 },
        replacement: ReplacementPolicy::Generational { elitism: 5 },
        fitness_threshold: Some(TARGET.len() as f32),
        ..EvolutionConfig::default()
    };

    let mut driver = match EvolutionDriver::new(config, StringOracle, random_string) {
        Ok(driver) => driver,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return;
        }
    };
    let report = match driver.run() {
        Ok(report) => report,
        Err(err) => {
            eprintln!("run failed: {err}");
            return;
        }
    };

    for summary in report.summaries.iter().step_by(50) {
        println!(
            "Gen {}: best {:?}, mean {:?} ({} evaluations)",
            summary.generation, summary.best, summary.mean, summary.evaluations
        );
    }

    if let Some(best) = report.best {
        println!(
            "Gen {}: [{}] (Fitness: {:?})",
            report.generations,
            String::from_utf8_lossy(&best.genotype),
            best.primary_fitness()
        );
    }
    if report.stop_reason == StopReason::ThresholdReached {
        println!("🎯 Target reached at Gen {}!", report.generations);
    }
}
