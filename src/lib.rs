//! # Symbios Evolve
//!
//! A generational evolution driver over an opaque genotype oracle.
//!
//! The oracle owns the genetic representation: it mutates, crosses, validates
//! and evaluates genotypes the driver never looks inside. The driver owns
//! everything around it:
//!
//! - a **validity gate** that keeps regenerating genotypes until the oracle
//!   accepts one, within a bounded attempt budget
//! - a **population manager** with pluggable selection (tournament,
//!   proportional, uniform) and replacement (generational, steady-state,
//!   island model)
//! - an optional **MAP-Elites archive** that makes replacement niche-aware
//! - parallel evaluation with results re-associated by individual id
//!
//! ## Quick Start
//!
//! ```rust
//! use rand::Rng;
//! use symbios_evolve::{
//!     Evaluation, EvolutionConfig, EvolutionDriver, Oracle, OracleError,
//! };
//!
//! struct Shortest;
//! impl Oracle<String> for Shortest {
//!     fn mutate<R: Rng>(&self, g: &String, rng: &mut R) -> Result<String, OracleError> {
//!         let mut g = g.clone();
//!         if rng.random_bool(0.5) || g.is_empty() {
//!             g.push('x');
//!         } else {
//!             g.pop();
//!         }
//!         Ok(g)
//!     }
//!     fn crossover<R: Rng>(&self, a: &String, b: &String, _: &mut R) -> Result<String, OracleError> {
//!         Ok(format!("{a}{b}").chars().take(10).collect())
//!     }
//!     fn evaluate(&self, g: &String) -> Result<Evaluation, OracleError> {
//!         Ok(Evaluation::new(vec![-(g.len() as f32)]))
//!     }
//!     fn is_valid(&self, g: &String) -> bool {
//!         !g.is_empty()
//!     }
//! }
//!
//! let config = EvolutionConfig {
//!     population_size: 10,
//!     generation_limit: 20,
//!     ..EvolutionConfig::default()
//! };
//! let mut driver =
//!     EvolutionDriver::new(config, Shortest, |_, _| Ok("xxxxxxxxxx".to_string())).unwrap();
//! let report = driver.run().unwrap();
//! assert!(report.best.unwrap().genotype.len() <= 10);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub mod config;
pub mod dissimilarity;
pub mod driver;
pub mod error;
pub mod evaluation;
pub mod gate;
pub mod population;
pub mod summary;
pub mod variation;

pub mod algorithms {
    pub mod map_elites;
    pub mod replacement;
    pub mod selection;
}

pub use algorithms::map_elites::EliteArchive;
pub use algorithms::replacement::ReplacementPolicy;
pub use algorithms::selection::SelectionPolicy;
pub use config::{EvolutionConfig, QualityDiversity, VariationFallback};
pub use driver::{CancelToken, EvolutionDriver, Stage, StopReason};
pub use error::{ConfigError, EvolutionError, OracleError, RunError};
pub use gate::{GateStats, ValidityGate};
pub use population::PopulationManager;
pub use rand_pcg::Pcg64;
pub use summary::{GenerationSummary, RunReport};

/// The 'DNA' handled by the driver.
/// Opaque: only the oracle knows what is inside.
pub trait Genotype: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync {}

impl<T> Genotype for T where T: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync {}

/// Compare two f32 values, treating NaN as less than all other values.
/// This ensures NaN fitness individuals sort to the end (lowest priority).
pub(crate) fn cmp_f32_nan_last(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Ordered tuple of evaluation criteria. Higher is better.
///
/// Fitness values compare lexicographically, criterion by criterion, with NaN
/// ranking below every number. The first criterion is the *primary* one:
/// it drives summaries and the early-stop threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fitness(pub Vec<f32>);

impl Fitness {
    pub fn criteria(&self) -> &[f32] {
        &self.0
    }

    /// The first criterion, or NaN when there is none.
    pub fn primary(&self) -> f32 {
        self.0.first().copied().unwrap_or(f32::NAN)
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            match cmp_f32_nan_last(*a, *b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// What the oracle reports for one genotype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Ordered criteria; an empty list counts as a failed evaluation.
    pub criteria: Vec<f32>,
    /// N-dimensional position in the behaviour space (used by MAP-Elites).
    pub descriptor: Vec<f32>,
}

impl Evaluation {
    pub fn new(criteria: Vec<f32>) -> Self {
        Self {
            criteria,
            descriptor: vec![],
        }
    }

    pub fn with_descriptor(mut self, descriptor: Vec<f32>) -> Self {
        self.descriptor = descriptor;
        self
    }
}

/// A genotype admitted to the population, with its cached evaluation.
///
/// There is no validity flag: validity is guaranteed by construction.
/// Individuals are only created from genotypes that passed the
/// [`ValidityGate`], so every member of a population is valid.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "G: Genotype")]
pub struct Individual<G: Genotype> {
    /// Unique within a run; parallel results are matched back by this id.
    pub id: u64,
    pub genotype: G,
    /// `None` until evaluated. Set once, never re-evaluated.
    pub fitness: Option<Fitness>,
    pub descriptor: Vec<f32>,
    /// Island the individual lives on (always 0 without an island model).
    pub island: usize,
}

impl<G: Genotype> Individual<G> {
    pub fn primary_fitness(&self) -> Option<f32> {
        self.fitness.as_ref().map(Fitness::primary)
    }

    /// Ranking order: unevaluated individuals come last, then by fitness.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        match (&self.fitness, &other.fitness) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.compare(b),
        }
    }
}

/// The external collaborator that knows how to vary, validate and evaluate
/// genotypes: a simulator behind an FFI bridge, an RPC client, or plain Rust.
///
/// Every call may block and may fail. Evaluation is not assumed to be
/// deterministic: the driver evaluates each individual exactly once.
///
/// The same oracle is shared by all evaluation workers, hence `Sync`. If the
/// underlying session is not safe for concurrent calls, the implementation
/// must synchronize internally or `evaluation_workers` must stay at 1.
pub trait Oracle<G: Genotype>: Send + Sync {
    fn mutate<R: Rng>(&self, genotype: &G, rng: &mut R) -> Result<G, OracleError>;

    fn crossover<R: Rng>(&self, a: &G, b: &G, rng: &mut R) -> Result<G, OracleError>;

    /// Express the genotype and measure it.
    /// This is where the 'Physics' or 'Logic' happens.
    fn evaluate(&self, genotype: &G) -> Result<Evaluation, OracleError>;

    fn is_valid(&self, genotype: &G) -> bool;

    /// Genetic dissimilarity of two genotypes, when the oracle can measure it.
    fn dissimilarity(&self, _a: &G, _b: &G) -> Result<f32, OracleError> {
        Err(OracleError::InvalidOperation(
            "dissimilarity is not supported by this oracle".to_string(),
        ))
    }
}
