//! The evolution driver: a generational state machine over an oracle.
//!
//! ```text
//! INIT → EVALUATING_INITIAL → CHECK_TERMINATION
//!                                  ↓ (continue)          ↑
//!        SELECTING → VARYING → EVALUATING_OFFSPRING → REPLACING
//!                                  ↓ (stop)
//!                                 DONE
//! ```
//!
//! Evaluation failures are recoverable: the failed individual is dropped and
//! regenerated through the validity gate. Only when failures recur beyond the
//! configured rate, measured over the last `population_size` evaluations,
//! does the run stop with
//! [`EvolutionError::OracleUnavailable`]. Cancellation is observed at
//! `CHECK_TERMINATION` only, so in-flight evaluations always complete.

use crate::evaluation::BatchEvaluator;
use crate::variation::{self, VariationRates};
use crate::{
    EliteArchive, EvolutionConfig, EvolutionError, Fitness, GenerationSummary, Genotype,
    Individual, Oracle, OracleError, PopulationManager, RunError, RunReport, ValidityGate,
};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// States of the generational loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Init,
    EvaluatingInitial,
    Selecting,
    Varying,
    EvaluatingOffspring,
    Replacing,
    CheckTermination,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "INIT",
            Stage::EvaluatingInitial => "EVALUATING_INITIAL",
            Stage::Selecting => "SELECTING",
            Stage::Varying => "VARYING",
            Stage::EvaluatingOffspring => "EVALUATING_OFFSPRING",
            Stage::Replacing => "REPLACING",
            Stage::CheckTermination => "CHECK_TERMINATION",
            Stage::Done => "DONE",
        })
    }
}

/// Why a run reached `Done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    GenerationLimit,
    ThresholdReached,
    Cancelled,
}

/// External stop signal, observed at generation boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a batch came from, i.e. how to replace a member whose evaluation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Initial,
    Offspring,
}

#[derive(Debug, Default)]
struct Counters {
    evaluations: u64,
    failures: u64,
    run_evaluations: u64,
    run_failures: u64,
    /// Outcomes of the most recent evaluations, `true` for a failure.
    recent: VecDeque<bool>,
}

impl Counters {
    fn record(&mut self, failed: bool, window: usize) {
        self.evaluations += 1;
        self.run_evaluations += 1;
        if failed {
            self.failures += 1;
            self.run_failures += 1;
        }
        if self.recent.len() == window {
            self.recent.pop_front();
        }
        self.recent.push_back(failed);
    }

    /// Failure rate over the window, once the window is full.
    fn recent_failure_rate(&self, window: usize) -> Option<f64> {
        (self.recent.len() >= window).then(|| {
            let failed = self.recent.iter().filter(|&&f| f).count();
            failed as f64 / self.recent.len().max(1) as f64
        })
    }
}

pub struct EvolutionDriver<G: Genotype, O: Oracle<G>, I> {
    config: EvolutionConfig,
    oracle: O,
    initializer: I,
    population: PopulationManager<G>,
    gate: ValidityGate,
    evaluator: BatchEvaluator,
    archive: Option<EliteArchive<G>>,
    rng: Pcg64,
    stage: Stage,
    generation: u64,
    completed: Option<u64>,
    mating_pools: Vec<Vec<usize>>,
    offspring: Vec<Individual<G>>,
    summaries: Vec<GenerationSummary>,
    counters: Counters,
    stop_reason: Option<StopReason>,
    cancel: CancelToken,
}

impl<G, O, I> EvolutionDriver<G, O, I>
where
    G: Genotype,
    O: Oracle<G>,
    I: FnMut(&O, &mut Pcg64) -> Result<G, OracleError>,
{
    /// Creates a driver in the `Init` stage.
    ///
    /// `initializer` produces candidate genotypes for the initial population
    /// (and replacements for initial individuals whose evaluation fails);
    /// every candidate goes through the validity gate.
    /// [`variation::seeded`] builds one from a single seed genotype.
    ///
    /// # Errors
    ///
    /// A configuration error, reported at stage `Init` with no completed
    /// generation.
    pub fn new(config: EvolutionConfig, oracle: O, initializer: I) -> Result<Self, RunError> {
        config.validate().map_err(|err| RunError {
            stage: Stage::Init,
            last_generation: None,
            source: err.into(),
        })?;
        Ok(Self {
            population: PopulationManager::new(config.replacement.islands()),
            gate: ValidityGate::new(config.max_validity_retries),
            evaluator: BatchEvaluator::new(config.evaluation_workers),
            archive: config
                .quality_diversity
                .map(|qd| EliteArchive::new(qd.resolution)),
            rng: Pcg64::seed_from_u64(config.seed),
            config,
            oracle,
            initializer,
            stage: Stage::Init,
            generation: 0,
            completed: None,
            mating_pools: vec![],
            offspring: vec![],
            summaries: vec![],
            counters: Counters::default(),
            stop_reason: None,
            cancel: CancelToken::default(),
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn population(&self) -> &PopulationManager<G> {
        &self.population
    }

    pub fn summaries(&self) -> &[GenerationSummary] {
        &self.summaries
    }

    pub fn archive(&self) -> Option<&EliteArchive<G>> {
        self.archive.as_ref()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// A handle that stops the run at the next generation boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Uses an existing token, e.g. one already handed to the oracle or to
    /// a signal handler.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the state machine to `Done` and reports the result.
    pub fn run(&mut self) -> Result<RunReport<G>, RunError> {
        while self.stage != Stage::Done {
            self.advance()?;
        }
        Ok(self.report())
    }

    /// Executes the current stage and moves to the next one, which is
    /// returned. `Done` is absorbing.
    ///
    /// After an error the driver stays in the failed stage; it should be
    /// dropped.
    pub fn advance(&mut self) -> Result<Stage, RunError> {
        let stage = self.stage;
        let next = match stage {
            Stage::Init => self.initialize().map(|()| Stage::EvaluatingInitial),
            Stage::EvaluatingInitial => self.evaluate_initial().map(|()| Stage::CheckTermination),
            Stage::Selecting => {
                self.select_parents();
                Ok(Stage::Varying)
            }
            Stage::Varying => self.vary().map(|()| Stage::EvaluatingOffspring),
            Stage::EvaluatingOffspring => self.evaluate_offspring().map(|()| Stage::Replacing),
            Stage::Replacing => {
                self.replace();
                Ok(Stage::CheckTermination)
            }
            Stage::CheckTermination => Ok(self.check_termination()),
            Stage::Done => Ok(Stage::Done),
        };
        match next {
            Ok(next) => {
                self.stage = next;
                Ok(next)
            }
            Err(source) => Err(RunError {
                stage,
                last_generation: self.completed,
                source,
            }),
        }
    }

    fn report(&self) -> RunReport<G> {
        RunReport {
            best: self.population.best().cloned(),
            population: self.population.members().cloned().collect(),
            generations: self.generation,
            stop_reason: self.stop_reason.unwrap_or(StopReason::GenerationLimit),
            summaries: self.summaries.clone(),
            archive: self.archive.clone(),
        }
    }

    fn initialize(&mut self) -> Result<(), EvolutionError> {
        let Self {
            config,
            oracle,
            initializer,
            population,
            gate,
            evaluator,
            rng,
            ..
        } = self;
        let oracle = &*oracle;
        population.initialize(config.population_size, oracle, gate, || {
            initializer(oracle, rng)
        })?;
        info!(
            population = population.len(),
            islands = population.island_count(),
            workers = evaluator.workers(),
            "initial population created"
        );
        Ok(())
    }

    fn evaluate_initial(&mut self) -> Result<(), EvolutionError> {
        let batch = self.population.take_all();
        let batch = self.evaluate_batch(batch, Origin::Initial)?;
        self.population.restore(batch);
        self.completed = Some(0);
        self.record_summary();
        Ok(())
    }

    fn select_parents(&mut self) {
        let islands = self.population.island_count();
        self.mating_pools = (0..islands)
            .map(|island| {
                let size = self.population.island(island).len();
                let k = self.config.replacement.offspring_count(size);
                self.population
                    .select(island, k, &self.config.selection, &mut self.rng)
            })
            .collect();
    }

    fn vary(&mut self) -> Result<(), EvolutionError> {
        let mut offspring = Vec::new();
        for island in 0..self.mating_pools.len() {
            for _ in 0..self.mating_pools[island].len() {
                let genotype = self.breed(island)?;
                offspring.push(self.population.admit(genotype, island));
            }
        }
        debug!(generation = self.generation, offspring = offspring.len(), "offspring bred");
        self.offspring = offspring;
        Ok(())
    }

    fn evaluate_offspring(&mut self) -> Result<(), EvolutionError> {
        let batch = std::mem::take(&mut self.offspring);
        self.offspring = self.evaluate_batch(batch, Origin::Offspring)?;
        Ok(())
    }

    fn replace(&mut self) {
        let offspring = std::mem::take(&mut self.offspring);
        let niches = self.config.quality_diversity.map(|qd| qd.resolution);
        self.population
            .replace(offspring, &self.config.replacement, niches);
        self.generation += 1;
        if let Some(migrants) = self.config.replacement.migrants_after(self.generation) {
            self.population.migrate(migrants);
            debug!(generation = self.generation, migrants, "islands exchanged migrants");
        }
        self.mating_pools.clear();
        self.completed = Some(self.generation);
        self.record_summary();
    }

    fn check_termination(&mut self) -> Stage {
        let best = self
            .population
            .best()
            .and_then(Individual::primary_fitness);
        let reason = if self.cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self
            .config
            .fitness_threshold
            .is_some_and(|threshold| best.is_some_and(|b| b >= threshold))
        {
            Some(StopReason::ThresholdReached)
        } else if self.generation >= self.config.generation_limit {
            Some(StopReason::GenerationLimit)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                info!(
                    ?reason,
                    generations = self.generation,
                    best = ?best,
                    "run finished"
                );
                self.stop_reason = Some(reason);
                Stage::Done
            }
            None => Stage::Selecting,
        }
    }

    /// Evaluates every unevaluated member of `batch`, regenerating the ones
    /// whose evaluation fails until the whole batch carries a fitness.
    fn evaluate_batch(
        &mut self,
        mut batch: Vec<Individual<G>>,
        origin: Origin,
    ) -> Result<Vec<Individual<G>>, EvolutionError> {
        loop {
            let mut results = self.evaluator.evaluate(&self.oracle, &batch);
            if results.is_empty() {
                break;
            }
            let mut failed = Vec::new();
            for (slot, individual) in batch.iter_mut().enumerate() {
                let Some(result) = results.remove(&individual.id) else {
                    continue;
                };
                let window = self.config.population_size;
                match result {
                    Ok(evaluation) if !evaluation.criteria.is_empty() => {
                        self.counters.record(false, window);
                        individual.fitness = Some(Fitness(evaluation.criteria));
                        individual.descriptor = evaluation.descriptor;
                    }
                    outcome => {
                        let error = outcome.err().unwrap_or_else(|| {
                            OracleError::EvaluationFailure("no criteria returned".to_string())
                        });
                        self.counters.record(true, window);
                        warn!(
                            id = individual.id,
                            generation = self.generation,
                            %error,
                            "evaluation failed, regenerating individual"
                        );
                        failed.push(slot);
                    }
                }
            }
            self.check_failure_rate()?;
            for slot in failed {
                let island = batch[slot].island;
                let genotype = match origin {
                    Origin::Initial => self.spawn()?,
                    Origin::Offspring => self.breed(island)?,
                };
                batch[slot] = self.population.admit(genotype, island);
            }
        }

        if let Some(archive) = &mut self.archive {
            for individual in &batch {
                archive.insert(individual);
            }
        }
        Ok(batch)
    }

    /// Escalates when the failure rate over the last `population_size`
    /// evaluations exceeds the configured maximum.
    fn check_failure_rate(&self) -> Result<(), EvolutionError> {
        let rate = self
            .counters
            .recent_failure_rate(self.config.population_size);
        if rate.is_some_and(|rate| rate > self.config.max_evaluation_failure_rate as f64) {
            return Err(EvolutionError::OracleUnavailable {
                failures: self.counters.run_failures,
                evaluations: self.counters.run_evaluations,
            });
        }
        Ok(())
    }

    /// A fresh gate-approved genotype from the initializer.
    fn spawn(&mut self) -> Result<G, EvolutionError> {
        let Self {
            oracle,
            initializer,
            gate,
            rng,
            ..
        } = self;
        let oracle = &*oracle;
        gate.produce_valid(oracle, || initializer(oracle, rng))
    }

    /// A gate-approved offspring genotype bred from an island's mating pool.
    fn breed(&mut self, island: usize) -> Result<G, EvolutionError> {
        let Self {
            config,
            oracle,
            population,
            gate,
            rng,
            mating_pools,
            ..
        } = self;
        let oracle = &*oracle;
        let members = population.island(island);
        let pool = mating_pools.get(island).map_or(&[][..], Vec::as_slice);
        let rates = VariationRates {
            mutation: config.mutation_rate,
            crossover: config.crossover_rate,
        };
        let fallback = config.variation_fallback;
        gate.produce_valid(oracle, || {
            variation::breed(oracle, members, pool, rates, fallback, rng)
        })
    }

    fn record_summary(&mut self) {
        let mut summary = GenerationSummary::from_members(self.generation, self.population.members());
        summary.evaluations = std::mem::take(&mut self.counters.evaluations);
        summary.evaluation_failures = std::mem::take(&mut self.counters.failures);
        summary.gate = self.gate.take_stats();
        summary.archive_size = self.archive.as_ref().map(EliteArchive::len);
        info!(
            generation = summary.generation,
            best = ?summary.best,
            mean = ?summary.mean,
            worst = ?summary.worst,
            evaluations = summary.evaluations,
            evaluation_failures = summary.evaluation_failures,
            rejected = summary.gate.rejected,
            "generation complete"
        );
        self.summaries.push(summary);
    }
}
