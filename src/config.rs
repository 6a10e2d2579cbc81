//! Run configuration.
//!
//! Every field has a default, so a JSON document only needs the values it
//! changes:
//!
//! ```rust
//! use symbios_evolve::{EvolutionConfig, ReplacementPolicy};
//!
//! let config = EvolutionConfig::from_json_str(
//!     r#"{
//!         "population_size": 40,
//!         "replacement": { "kind": "island", "islands": 4, "migration_interval": 5,
//!                          "migrants": 1, "elitism": 1 }
//!     }"#,
//! )
//! .unwrap();
//! assert_eq!(config.replacement.islands(), 4);
//! assert_eq!(config.generation_limit, 100);
//! ```

use crate::{ConfigError, ReplacementPolicy, SelectionPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do when the oracle fails a mutation or crossover.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariationFallback {
    /// Discard the attempt; the validity gate tries again.
    #[default]
    Retry,
    /// Keep the parent genotype instead (a random parent for crossover).
    SubstituteParent,
}

/// Descriptor grid used for niche-preserving replacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityDiversity {
    /// Bins per descriptor dimension.
    pub resolution: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generation_limit: u64,
    pub mutation_rate: f32,
    pub crossover_rate: f32,
    pub selection: SelectionPolicy,
    pub replacement: ReplacementPolicy,
    /// Stop as soon as the best primary fitness reaches this value.
    pub fitness_threshold: Option<f32>,
    /// Attempt budget of the validity gate.
    pub max_validity_retries: usize,
    pub evaluation_workers: usize,
    /// Fraction of failed evaluations (over the whole run) tolerated before
    /// the oracle is declared unavailable.
    pub max_evaluation_failure_rate: f32,
    pub variation_fallback: VariationFallback,
    pub quality_diversity: Option<QualityDiversity>,
    pub seed: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            generation_limit: 100,
            mutation_rate: 0.8,
            crossover_rate: 0.2,
            selection: SelectionPolicy::default(),
            replacement: ReplacementPolicy::default(),
            fitness_threshold: None,
            max_validity_retries: 100,
            evaluation_workers: 1,
            max_evaluation_failure_rate: 0.5,
            variation_fallback: VariationFallback::default(),
            quality_diversity: None,
            seed: 42,
        }
    }
}

impl EvolutionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Size of one island (the whole population without an island model).
    pub fn group_size(&self) -> usize {
        self.population_size / self.replacement.islands().max(1)
    }

    /// Rejects contradictory or out-of-range settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        for (name, value) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RateOutOfRange { name, value });
            }
        }
        if !(0.0..1.0).contains(&self.max_evaluation_failure_rate) {
            return Err(ConfigError::FailureRateOutOfRange(
                self.max_evaluation_failure_rate,
            ));
        }
        if self.max_validity_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if self.evaluation_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.fitness_threshold.is_some_and(f32::is_nan) {
            return Err(ConfigError::NanThreshold);
        }
        if let SelectionPolicy::Tournament { size: 0 } = self.selection {
            return Err(ConfigError::EmptyTournament);
        }
        if let Some(QualityDiversity { resolution: 0 }) = self.quality_diversity {
            return Err(ConfigError::ZeroResolution);
        }

        match self.replacement {
            ReplacementPolicy::Generational { elitism } => {
                check_elitism(elitism, self.population_size)?;
            }
            ReplacementPolicy::SteadyState { offspring } => {
                if offspring == 0 {
                    return Err(ConfigError::NoOffspring);
                }
            }
            ReplacementPolicy::Island {
                islands,
                migration_interval,
                migrants,
                elitism,
            } => {
                if islands == 0 {
                    return Err(ConfigError::InvalidIslands(
                        "at least one island is required".to_string(),
                    ));
                }
                if self.population_size % islands != 0 {
                    return Err(ConfigError::InvalidIslands(format!(
                        "population size {} is not divisible by {islands} islands",
                        self.population_size
                    )));
                }
                if migration_interval == 0 {
                    return Err(ConfigError::InvalidIslands(
                        "migration interval must be at least 1".to_string(),
                    ));
                }
                let group = self.population_size / islands;
                if migrants >= group {
                    return Err(ConfigError::InvalidIslands(format!(
                        "{migrants} migrants do not fit islands of {group}"
                    )));
                }
                check_elitism(elitism, group)?;
            }
        }

        let group = self.group_size();
        if self.crossover_rate > 0.0 && group < 2 {
            return Err(ConfigError::CrossoverWithoutPartners(group));
        }
        Ok(())
    }
}

fn check_elitism(elitism: usize, size: usize) -> Result<(), ConfigError> {
    if elitism >= size {
        return Err(ConfigError::ElitismTooLarge { elitism, size });
    }
    Ok(())
}
