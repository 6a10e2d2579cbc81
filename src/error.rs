//! Error taxonomy for oracles, configuration and runs.

use crate::driver::Stage;
use thiserror::Error;

/// Failures reported by an [`Oracle`](crate::Oracle) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The oracle rejected a malformed genotype during mutation or crossover.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// The oracle could not produce criteria for a genotype (crash, timeout, ...).
    #[error("evaluation failure: {0}")]
    EvaluationFailure(String),
}

/// Contradictory or out-of-range configuration, or a configuration file that
/// could not be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("population size must be at least 1")]
    EmptyPopulation,
    #[error("crossover needs at least 2 individuals per island, got {0}")]
    CrossoverWithoutPartners(usize),
    #[error("{name} must be within [0, 1], got {value}")]
    RateOutOfRange { name: &'static str, value: f32 },
    #[error("max_evaluation_failure_rate must be within [0, 1), got {0}")]
    FailureRateOutOfRange(f32),
    #[error("max_validity_retries must be at least 1")]
    ZeroRetries,
    #[error("evaluation_workers must be at least 1")]
    ZeroWorkers,
    #[error("tournament size must be at least 1")]
    EmptyTournament,
    #[error("elitism {elitism} must be smaller than the group size {size}")]
    ElitismTooLarge { elitism: usize, size: usize },
    #[error("steady-state replacement needs at least 1 offspring per generation")]
    NoOffspring,
    #[error("invalid island model: {0}")]
    InvalidIslands(String),
    #[error("quality-diversity resolution must be at least 1")]
    ZeroResolution,
    #[error("fitness threshold must not be NaN")]
    NanThreshold,
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage-level fatal errors.
#[derive(Debug, Error)]
pub enum EvolutionError {
    /// The validity gate spent its whole attempt budget without a valid genotype.
    #[error("no valid genotype after {attempts} attempts")]
    ExhaustedRetries { attempts: usize },
    /// Evaluation failures recurred beyond the configured failure rate.
    #[error("oracle unavailable: {failures} of {evaluations} evaluations failed")]
    OracleUnavailable { failures: u64, evaluations: u64 },
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

/// A fatal error that aborted a run, with the stage that failed and the last
/// generation that completed (`None` if the initial population never finished
/// evaluating).
#[derive(Debug, Error)]
#[error("run aborted during {stage} (last completed generation: {last_generation:?}): {source}")]
pub struct RunError {
    pub stage: Stage,
    pub last_generation: Option<u64>,
    #[source]
    pub source: EvolutionError,
}

impl RunError {
    pub fn kind(&self) -> &EvolutionError {
        &self.source
    }
}
