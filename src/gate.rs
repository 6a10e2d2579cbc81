//! Validity gate: nothing enters a population without the oracle's approval.

use crate::{EvolutionError, Genotype, Oracle, OracleError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Counters accumulated by a [`ValidityGate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    /// Factory invocations.
    pub attempts: u64,
    /// Genotypes produced but refused by `is_valid`.
    pub rejected: u64,
    /// Factory calls that failed inside the oracle.
    pub invalid_operations: u64,
}

impl GateStats {
    fn absorb(&mut self, other: GateStats) {
        self.attempts += other.attempts;
        self.rejected += other.rejected;
        self.invalid_operations += other.invalid_operations;
    }
}

/// Repeatedly asks a factory for genotypes until the oracle accepts one.
///
/// The attempt budget is a safeguard against factories that never produce
/// anything valid; running out is fatal for the run.
#[derive(Debug, Clone)]
pub struct ValidityGate {
    max_attempts: usize,
    stats: GateStats,
    total: GateStats,
}

impl ValidityGate {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            stats: GateStats::default(),
            total: GateStats::default(),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Invokes `factory` until it yields a genotype the oracle deems valid.
    ///
    /// Factory errors consume an attempt and are retried.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::ExhaustedRetries`] once `max_attempts` attempts have
    /// produced nothing valid.
    pub fn produce_valid<G, O, F>(&mut self, oracle: &O, mut factory: F) -> Result<G, EvolutionError>
    where
        G: Genotype,
        O: Oracle<G>,
        F: FnMut() -> Result<G, OracleError>,
    {
        for attempt in 1..=self.max_attempts {
            self.stats.attempts += 1;
            match factory() {
                Ok(genotype) if oracle.is_valid(&genotype) => return Ok(genotype),
                Ok(_) => {
                    self.stats.rejected += 1;
                    debug!(attempt, "genotype rejected by validity check");
                }
                Err(err) => {
                    self.stats.invalid_operations += 1;
                    debug!(attempt, error = %err, "genotype factory failed");
                }
            }
        }
        warn!(
            attempts = self.max_attempts,
            "validity gate exhausted its attempt budget"
        );
        Err(EvolutionError::ExhaustedRetries {
            attempts: self.max_attempts,
        })
    }

    /// Counters since the last call to `take_stats`.
    pub fn stats(&self) -> GateStats {
        self.stats
    }

    /// Counters over the gate's whole lifetime.
    pub fn total(&self) -> GateStats {
        let mut total = self.total;
        total.absorb(self.stats);
        total
    }

    /// Returns the counters since the previous call and resets them.
    pub fn take_stats(&mut self) -> GateStats {
        let stats = std::mem::take(&mut self.stats);
        self.total.absorb(stats);
        stats
    }
}
