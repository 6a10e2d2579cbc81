//! MAP-Elites archive for quality-diversity runs.
//!
//! MAP-Elites (Multi-dimensional Archive of Phenotypic Elites) keeps, for every
//! cell of a discretized behaviour space, the best individual found so far.
//! Here the archive decorates the ordinary generational loop instead of
//! replacing it: every evaluated individual is offered to the archive, and
//! replacement can use the same cell mapping to keep one survivor per niche
//! before filling up by fitness (see
//! [`ReplacementPolicy::replace`](crate::ReplacementPolicy::replace)).
//!
//! # Key Concepts
//!
//! - **Behavioral Descriptor**: A vector of values (typically in `[0.0, 1.0]`) that
//!   characterizes *how* a solution behaves, not just *how well* it performs
//! - **Resolution**: The number of bins per descriptor dimension
//!
//! # References
//!
//! Mouret, J.-B., & Clune, J. (2015). Illuminating search spaces by mapping elites.
//! arXiv preprint arXiv:1504.04909.

use crate::{Genotype, Individual};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Maps a behavioral descriptor to cell indices.
///
/// Descriptor values are clamped to `[0.0, 1.0]` and discretized into
/// `resolution` bins. NaN lands in bin 0.
///
/// # Example
///
/// ```rust
/// use symbios_evolve::algorithms::map_elites::cell_index;
/// assert_eq!(cell_index(&[0.25, 0.75], 10), vec![2, 7]);
/// assert_eq!(cell_index(&[1.0, -3.0], 10), vec![9, 0]);
/// ```
pub fn cell_index(descriptor: &[f32], resolution: usize) -> Vec<usize> {
    descriptor
        .iter()
        .map(|&v| {
            let v = if v.is_nan() { 0.0 } else { v };
            let scaled = v.clamp(0.0, 1.0) * resolution as f32;
            (scaled.floor() as usize).min(resolution.saturating_sub(1))
        })
        .collect()
}

/// Archive of elites indexed by descriptor cell.
///
/// # Determinism
///
/// Cells live in a [`BTreeMap`], so iteration order is the sorted cell order
/// and does not depend on insertion history.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "G: Genotype")]
pub struct EliteArchive<G: Genotype> {
    archive: BTreeMap<Vec<usize>, Individual<G>>,
    resolution: usize,
}

impl<G: Genotype> EliteArchive<G> {
    /// Creates an empty archive.
    ///
    /// # Panics
    ///
    /// Panics if `resolution` is 0. Configuration validation rejects that
    /// value before a driver ever builds an archive.
    pub fn new(resolution: usize) -> Self {
        assert!(resolution > 0, "resolution must be greater than 0");
        Self {
            archive: BTreeMap::new(),
            resolution,
        }
    }

    /// Returns the resolution (bins per descriptor dimension).
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn map_to_index(&self, descriptor: &[f32]) -> Vec<usize> {
        cell_index(descriptor, self.resolution)
    }

    /// Offers an individual to its cell.
    ///
    /// Unevaluated individuals are ignored. An occupied cell only changes
    /// hands for strictly better fitness. Returns whether the archive changed.
    pub fn insert(&mut self, individual: &Individual<G>) -> bool {
        if individual.fitness.is_none() {
            return false;
        }
        let idx = self.map_to_index(&individual.descriptor);
        if self
            .archive
            .get(&idx)
            .is_none_or(|existing| individual.rank_cmp(existing) == Ordering::Greater)
        {
            self.archive.insert(idx, individual.clone());
            true
        } else {
            false
        }
    }

    /// Returns the number of occupied cells, not the total grid size.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Gets the elite of a cell, or `None` if the cell is empty.
    pub fn get(&self, key: &[usize]) -> Option<&Individual<G>> {
        self.archive.get(key)
    }

    /// Returns an iterator over all (cell, elite) pairs in sorted cell order.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<usize>, &Individual<G>)> {
        self.archive.iter()
    }

    /// Returns the elite with the highest fitness across all cells.
    pub fn best_by_fitness(&self) -> Option<&Individual<G>> {
        self.archive.values().max_by(|a, b| a.rank_cmp(b))
    }
}
