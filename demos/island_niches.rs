use rand::Rng;
use symbios_evolve::dissimilarity::{DissimilarityMethod, dissimilarity_matrix};
use symbios_evolve::variation::seeded;
use symbios_evolve::{Evaluation, EvolutionConfig, EvolutionDriver, Oracle, OracleError};

/// A point in the unit square. Rastrigin-like fitness, the position itself
/// is the behavioural descriptor.
struct Landscape;

impl Oracle<[f32; 2]> for Landscape {
    fn mutate<R: Rng>(&self, g: &[f32; 2], rng: &mut R) -> Result<[f32; 2], OracleError> {
        let mut g = *g;
        let axis = rng.random_range(0..2);
        g[axis] += rng.random_range(-0.1..0.1);
        Ok(g)
    }

    fn crossover<R: Rng>(&self, a: &[f32; 2], b: &[f32; 2], rng: &mut R) -> Result<[f32; 2], OracleError> {
        let t = rng.random::<f32>();
        Ok([a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])])
    }

    fn evaluate(&self, g: &[f32; 2]) -> Result<Evaluation, OracleError> {
        let x = g[0] * 10.0 - 5.0;
        let y = g[1] * 10.0 - 5.0;
        let fitness = -(20.0 + x * x + y * y
            - 10.0 * (x * 2.0 * std::f32::consts::PI).cos()
            - 10.0 * (y * 2.0 * std::f32::consts::PI).cos());
        Ok(Evaluation::new(vec![fitness]).with_descriptor(g.to_vec()))
    }

    fn is_valid(&self, g: &[f32; 2]) -> bool {
        g.iter().all(|v| (0.0..=1.0).contains(v))
    }

    fn dissimilarity(&self, a: &[f32; 2], b: &[f32; 2]) -> Result<f32, OracleError> {
        Ok(((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt())
    }
}

const CONFIG: &str = r#"{
    "population_size": 60,
    "generation_limit": 100,
    "mutation_rate": 0.9,
    "crossover_rate": 0.3,
    "selection": { "kind": "tournament", "size": 3 },
    "replacement": {
        "kind": "island",
        "islands": 3,
        "migration_interval": 10,
        "migrants": 2,
        "elitism": 2
    },
    "evaluation_workers": 4,
    "quality_diversity": { "resolution": 10 },
    "seed": 7
}"#;

fn main() {
    let config = match EvolutionConfig::from_json_str(CONFIG) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };

    let mut driver = match EvolutionDriver::new(config, Landscape, seeded([0.5, 0.5], 20)) {
        Ok(driver) => driver,
        Err(err) => {
            eprintln!("{err}");
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

    for summary in report.summaries.iter().step_by(10) {
        println!(
            "Gen {:>3}: best {:?}, niches {:?}",
            summary.generation, summary.best, summary.archive_size
        );
    }

    for island in 0..3 {
        let members: Vec<_> = report
            .population
            .iter()
            .filter(|m| m.island == island)
            .cloned()
            .collect();
        let spread = match dissimilarity_matrix(&Landscape, &members, DissimilarityMethod::Genetic) {
            Ok(matrix) => {
                let n = matrix.len().max(1);
                matrix.iter().flatten().sum::<f32>() / (n * n) as f32
            }
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };
        println!("Island {island}: {} members, mean distance {spread:.3}", members.len());
    }

    if let Some(archive) = &report.archive {
        println!("Archive: {} occupied cells", archive.len());
        if let Some(elite) = archive.best_by_fitness() {
            println!(
                "Best elite at ({:.3}, {:.3}) with fitness {:?}",
                elite.genotype[0],
                elite.genotype[1],
                elite.primary_fitness()
            );
        }
    }
}
