//! Population manager: owns the current generation, split into islands.
//!
//! Without an island model there is exactly one island. Each generation is
//! replaced wholesale; individuals are never edited in place once evaluated.

use crate::{
    EvolutionError, Genotype, Individual, Oracle, OracleError, ReplacementPolicy,
    SelectionPolicy, ValidityGate,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "G: Genotype")]
pub struct PopulationManager<G: Genotype> {
    islands: Vec<Vec<Individual<G>>>,
    next_id: u64,
}

impl<G: Genotype> PopulationManager<G> {
    /// Creates an empty manager with `islands` groups (at least one).
    pub fn new(islands: usize) -> Self {
        Self {
            islands: vec![vec![]; islands.max(1)],
            next_id: 0,
        }
    }

    /// Fills the population with `size` valid individuals, spread over the
    /// islands in contiguous blocks. Any previous content is discarded.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::ExhaustedRetries`] when the gate cannot get a valid
    /// genotype out of `factory`.
    pub fn initialize<O, F>(
        &mut self,
        size: usize,
        oracle: &O,
        gate: &mut ValidityGate,
        mut factory: F,
    ) -> Result<(), EvolutionError>
    where
        O: Oracle<G>,
        F: FnMut() -> Result<G, OracleError>,
    {
        let count = self.islands.len();
        let per_island = size.div_ceil(count);
        let mut islands = vec![Vec::with_capacity(per_island); count];
        for slot in 0..size {
            let genotype = gate.produce_valid(oracle, &mut factory)?;
            let island = (slot / per_island).min(count - 1);
            islands[island].push(self.admit(genotype, island));
        }
        self.islands = islands;
        Ok(())
    }

    /// Wraps a gate-approved genotype into a fresh, unevaluated individual.
    pub fn admit(&mut self, genotype: G, island: usize) -> Individual<G> {
        let id = self.next_id;
        self.next_id += 1;
        Individual {
            id,
            genotype,
            fitness: None,
            descriptor: vec![],
            island,
        }
    }

    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    pub fn island(&self, island: usize) -> &[Individual<G>] {
        self.islands.get(island).map_or(&[], Vec::as_slice)
    }

    pub fn members(&self) -> impl Iterator<Item = &Individual<G>> {
        self.islands.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.islands.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best evaluated individual across all islands.
    pub fn best(&self) -> Option<&Individual<G>> {
        self.members()
            .filter(|m| m.fitness.is_some())
            .max_by(|a, b| a.rank_cmp(b))
    }

    /// Draws `k` parent indices from one island.
    pub fn select<R: Rng>(
        &self,
        island: usize,
        k: usize,
        policy: &SelectionPolicy,
        rng: &mut R,
    ) -> Vec<usize> {
        policy.select(self.island(island), k, rng)
    }

    /// Removes every individual, e.g. to evaluate them outside the manager.
    pub fn take_all(&mut self) -> Vec<Individual<G>> {
        self.islands.iter_mut().flat_map(std::mem::take).collect()
    }

    /// Puts individuals back on the islands they are tagged with.
    pub fn restore(&mut self, individuals: Vec<Individual<G>>) {
        let last = self.islands.len() - 1;
        for individual in individuals {
            let island = individual.island.min(last);
            self.islands[island].push(individual);
        }
    }

    /// Produces the next generation from the current one and `offspring`.
    ///
    /// Offspring are routed to their own island; each island keeps its size.
    pub fn replace(
        &mut self,
        offspring: Vec<Individual<G>>,
        policy: &ReplacementPolicy,
        niche_resolution: Option<usize>,
    ) {
        let count = self.islands.len();
        let mut incoming: Vec<Vec<Individual<G>>> = vec![vec![]; count];
        for child in offspring {
            let island = child.island.min(count - 1);
            incoming[island].push(child);
        }
        let current = std::mem::take(&mut self.islands);
        self.islands = current
            .into_iter()
            .zip(incoming)
            .map(|(parents, children)| {
                let size = parents.len();
                policy.replace(parents, children, size, niche_resolution)
            })
            .collect();
    }

    /// Ring migration: copies of the best `migrants` of island `i` replace the
    /// worst `migrants` of island `i + 1`. Copies get fresh ids.
    pub fn migrate(&mut self, migrants: usize) {
        let count = self.islands.len();
        if count < 2 || migrants == 0 {
            return;
        }
        for island in &mut self.islands {
            island.sort_by(|a, b| b.rank_cmp(a));
        }
        let emigrants: Vec<Vec<Individual<G>>> = self
            .islands
            .iter()
            .map(|island| island.iter().take(migrants).cloned().collect())
            .collect();
        for (from, group) in emigrants.into_iter().enumerate() {
            let to = (from + 1) % count;
            let keep = self.islands[to].len().saturating_sub(group.len());
            self.islands[to].truncate(keep);
            for mut migrant in group {
                migrant.id = self.next_id;
                self.next_id += 1;
                migrant.island = to;
                self.islands[to].push(migrant);
            }
        }
        for island in &mut self.islands {
            island.sort_by(|a, b| b.rank_cmp(a));
        }
    }
}
