//! Per-generation records and the final run report.

use crate::driver::StopReason;
use crate::{EliteArchive, GateStats, Genotype, Individual};
use serde::{Deserialize, Serialize};

/// Statistics of one generation, suitable for logging.
///
/// Generation 0 describes the evaluated initial population. Fitness values
/// refer to the primary criterion; NaN criteria are left out of the
/// statistics, and all three are `None` when nothing has a usable fitness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u64,
    pub best: Option<f32>,
    pub mean: Option<f32>,
    pub worst: Option<f32>,
    /// Oracle evaluations performed during this generation.
    pub evaluations: u64,
    /// Evaluations that failed and were regenerated.
    pub evaluation_failures: u64,
    pub gate: GateStats,
    /// Occupied cells of the quality-diversity archive, if enabled.
    pub archive_size: Option<usize>,
}

impl GenerationSummary {
    pub fn from_members<'a, G, I>(generation: u64, members: I) -> Self
    where
        G: Genotype + 'a,
        I: IntoIterator<Item = &'a Individual<G>>,
    {
        let values: Vec<f32> = members
            .into_iter()
            .filter_map(Individual::primary_fitness)
            .filter(|f| !f.is_nan())
            .collect();
        let (best, mean, worst) = if values.is_empty() {
            (None, None, None)
        } else {
            let sum: f64 = values.iter().map(|&v| v as f64).sum();
            (
                values.iter().copied().reduce(f32::max),
                Some((sum / values.len() as f64) as f32),
                values.iter().copied().reduce(f32::min),
            )
        };
        Self {
            generation,
            best,
            mean,
            worst,
            evaluations: 0,
            evaluation_failures: 0,
            gate: GateStats::default(),
            archive_size: None,
        }
    }
}

/// Everything a finished run hands back.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "G: Genotype")]
pub struct RunReport<G: Genotype> {
    /// Best individual of the final population.
    pub best: Option<Individual<G>>,
    /// Final population, best-first within each island.
    pub population: Vec<Individual<G>>,
    /// Value of the generation counter at `Done`.
    pub generations: u64,
    pub stop_reason: StopReason,
    pub summaries: Vec<GenerationSummary>,
    /// Quality-diversity archive, if enabled.
    pub archive: Option<EliteArchive<G>>,
}
