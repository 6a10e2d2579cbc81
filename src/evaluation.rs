//! Batch evaluation of everything that still lacks a fitness.
//!
//! Results come back keyed by individual id, never by position, so callers
//! can re-associate them no matter in which order workers finish.

use crate::{Evaluation, Genotype, Individual, Oracle, OracleError};
use std::collections::BTreeMap;
use tracing::warn;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub type BatchResults = BTreeMap<u64, Result<Evaluation, OracleError>>;

/// Evaluates individuals on the calling thread or on a dedicated worker pool.
pub struct BatchEvaluator {
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl BatchEvaluator {
    /// Evaluator using `workers` threads. One worker means the calling thread.
    pub fn new(workers: usize) -> Self {
        #[cfg(feature = "parallel")]
        {
            let pool = (workers > 1)
                .then(|| {
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(workers)
                        .thread_name(|i| format!("evaluation-{i}"))
                        .build()
                })
                .transpose()
                .unwrap_or_else(|err| {
                    warn!(error = %err, "cannot build evaluation pool, evaluating sequentially");
                    None
                });
            Self { pool }
        }
        #[cfg(not(feature = "parallel"))]
        {
            if workers > 1 {
                warn!(workers, "built without the `parallel` feature, evaluating sequentially");
            }
            Self {}
        }
    }

    pub fn workers(&self) -> usize {
        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            return pool.current_num_threads();
        }
        1
    }

    /// Evaluates every individual of `batch` whose fitness is `None`.
    ///
    /// Blocks until the whole batch is done. Already evaluated individuals
    /// are skipped and have no entry in the result.
    pub fn evaluate<G, O>(&self, oracle: &O, batch: &[Individual<G>]) -> BatchResults
    where
        G: Genotype,
        O: Oracle<G>,
    {
        let pending: Vec<(u64, &G)> = batch
            .iter()
            .filter(|i| i.fitness.is_none())
            .map(|i| (i.id, &i.genotype))
            .collect();

        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            return pool.install(|| {
                pending
                    .into_par_iter()
                    .map(|(id, genotype)| (id, oracle.evaluate(genotype)))
                    .collect()
            });
        }

        pending
            .into_iter()
            .map(|(id, genotype)| (id, oracle.evaluate(genotype)))
            .collect()
    }
}
