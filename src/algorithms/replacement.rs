//! Replacement policies: parents × offspring → next generation.

use crate::algorithms::map_elites::cell_index;
use crate::{Genotype, Individual};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How the next generation is assembled from parents and offspring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplacementPolicy {
    /// The best `elitism` parents survive, offspring fill the rest.
    Generational { elitism: usize },
    /// `offspring` children per generation compete with their parents; the
    /// best `population_size` of both survive.
    SteadyState { offspring: usize },
    /// Generational replacement inside `islands` isolated groups, with the
    /// best `migrants` of each island copied over the worst of the next one
    /// (ring) every `migration_interval` generations.
    Island {
        islands: usize,
        migration_interval: u64,
        migrants: usize,
        elitism: usize,
    },
}

impl Default for ReplacementPolicy {
    fn default() -> Self {
        ReplacementPolicy::Generational { elitism: 1 }
    }
}

impl ReplacementPolicy {
    /// Number of independent groups the population is split into.
    pub fn islands(&self) -> usize {
        match self {
            ReplacementPolicy::Island { islands, .. } => *islands,
            _ => 1,
        }
    }

    /// Parents that survive unconditionally, per group.
    pub fn elitism(&self) -> usize {
        match self {
            ReplacementPolicy::Generational { elitism }
            | ReplacementPolicy::Island { elitism, .. } => *elitism,
            ReplacementPolicy::SteadyState { .. } => 0,
        }
    }

    /// Offspring to breed per generation for a group of `group_size`.
    pub fn offspring_count(&self, group_size: usize) -> usize {
        match self {
            ReplacementPolicy::SteadyState { offspring } => *offspring,
            _ => group_size.saturating_sub(self.elitism()),
        }
    }

    /// Migrants to exchange after `generation` completes, if it is a
    /// migration generation.
    pub fn migrants_after(&self, generation: u64) -> Option<usize> {
        match self {
            ReplacementPolicy::Island {
                islands,
                migration_interval,
                migrants,
                ..
            } if *islands > 1 && *migrants > 0 && *migration_interval > 0 => {
                (generation % migration_interval == 0).then_some(*migrants)
            }
            _ => None,
        }
    }

    /// Builds the next generation of one group.
    ///
    /// Without `niche_resolution` the survivors are, in priority order:
    /// - generational / island: the best `elitism` parents, the offspring
    ///   best-first, then the remaining parents best-first
    /// - steady state: parents and offspring ranked together
    ///
    /// With `niche_resolution`, after the elites the best candidate of every
    /// descriptor cell survives before any second candidate of a cell that
    /// is already represented; the rest is filled in priority order.
    ///
    /// The result is truncated to `size` and sorted best-first. Replacing
    /// with no offspring keeps the parent set.
    pub fn replace<G: Genotype>(
        &self,
        mut parents: Vec<Individual<G>>,
        mut offspring: Vec<Individual<G>>,
        size: usize,
        niche_resolution: Option<usize>,
    ) -> Vec<Individual<G>> {
        parents.sort_by(|a, b| b.rank_cmp(a));
        offspring.sort_by(|a, b| b.rank_cmp(a));

        let elites = self.elitism().min(parents.len());
        let priority: Vec<Individual<G>> = match self {
            ReplacementPolicy::SteadyState { .. } => {
                parents.extend(offspring);
                parents.sort_by(|a, b| b.rank_cmp(a));
                parents
            }
            _ => {
                let rest = parents.split_off(elites);
                parents.extend(offspring);
                parents.extend(rest);
                parents
            }
        };

        let mut next = match niche_resolution {
            Some(resolution) => niche_first(priority, elites, size, resolution),
            None => {
                let mut priority = priority;
                priority.truncate(size);
                priority
            }
        };
        next.sort_by(|a, b| b.rank_cmp(a));
        next
    }
}

/// Keeps the first `keep` candidates, then one per unrepresented cell in rank
/// order, then fills up in candidate order.
fn niche_first<G: Genotype>(
    candidates: Vec<Individual<G>>,
    keep: usize,
    size: usize,
    resolution: usize,
) -> Vec<Individual<G>> {
    let n = candidates.len();
    let keep = keep.min(n).min(size);
    let mut order: Vec<usize> = (0..keep).collect();
    let mut chosen = vec![false; n];
    let mut seen = BTreeSet::new();
    for &i in &order {
        chosen[i] = true;
        seen.insert(cell_index(&candidates[i].descriptor, resolution));
    }

    let mut by_rank: Vec<usize> = (keep..n).collect();
    by_rank.sort_by(|&a, &b| candidates[b].rank_cmp(&candidates[a]));
    for i in by_rank {
        if order.len() == size {
            break;
        }
        if candidates[i].fitness.is_some()
            && seen.insert(cell_index(&candidates[i].descriptor, resolution))
        {
            chosen[i] = true;
            order.push(i);
        }
    }
    for i in 0..n {
        if order.len() == size {
            break;
        }
        if !chosen[i] {
            chosen[i] = true;
            order.push(i);
        }
    }

    let mut slots: Vec<Option<Individual<G>>> = candidates.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
