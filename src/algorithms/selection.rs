//! Parent selection policies.
//!
//! A policy maps a group of individuals to `k` parent indices (drawn with
//! replacement). Selection never evaluates anything: unevaluated members rank
//! below every evaluated one.

use crate::{Genotype, Individual};
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::prelude::IndexedRandom;
use serde::{Deserialize, Serialize};

/// How parents are drawn from a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Best of `size` distinct random contestants (clamped to the group size).
    Tournament { size: usize },
    /// Roulette wheel over primary fitness, shifted so the worst evaluated
    /// member still has a small chance.
    Proportional,
    /// Every member is equally likely.
    Uniform,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::Tournament { size: 5 }
    }
}

impl SelectionPolicy {
    /// Draws `k` parent indices into `members`.
    ///
    /// Returns an empty vector when `members` is empty.
    pub fn select<G: Genotype, R: Rng>(
        &self,
        members: &[Individual<G>],
        k: usize,
        rng: &mut R,
    ) -> Vec<usize> {
        if members.is_empty() {
            return vec![];
        }
        match self {
            SelectionPolicy::Tournament { size } => {
                let indices: Vec<usize> = (0..members.len()).collect();
                // Graceful handling of small groups
                let tournament_size = (*size).clamp(1, members.len());
                (0..k)
                    .filter_map(|_| {
                        indices
                            .choose_multiple(rng, tournament_size)
                            .copied()
                            .max_by(|&a, &b| members[a].rank_cmp(&members[b]))
                    })
                    .collect()
            }
            SelectionPolicy::Proportional => match roulette_weights(members) {
                Some(wheel) => (0..k).map(|_| wheel.sample(rng)).collect(),
                None => uniform(members.len(), k, rng),
            },
            SelectionPolicy::Uniform => uniform(members.len(), k, rng),
        }
    }
}

fn uniform<R: Rng>(n: usize, k: usize, rng: &mut R) -> Vec<usize> {
    (0..k).map(|_| rng.random_range(0..n)).collect()
}

/// Builds the roulette wheel, or `None` when no member has a usable weight.
///
/// Weights are computed in `f64`, so any spread of finite `f32` fitness stays
/// finite. Members at `+inf` share the whole wheel.
fn roulette_weights<G: Genotype>(members: &[Individual<G>]) -> Option<WeightedIndex<f64>> {
    let primaries: Vec<Option<f64>> = members
        .iter()
        .map(|m| m.primary_fitness().filter(|f| !f.is_nan()).map(f64::from))
        .collect();

    if primaries.contains(&Some(f64::INFINITY)) {
        let weights = primaries
            .iter()
            .map(|p| if *p == Some(f64::INFINITY) { 1.0 } else { 0.0 });
        return WeightedIndex::new(weights).ok();
    }

    let finite = primaries.iter().flatten().copied().filter(|f| f.is_finite());
    let worst = finite.clone().reduce(f64::min)?;
    let best = finite.reduce(f64::max)?;
    // The worst member keeps a share proportional to the spread
    let floor = ((best - worst) * 0.01).max(f64::EPSILON);
    let weights: Vec<f64> = primaries
        .iter()
        .map(|p| match p {
            Some(f) if f.is_finite() => f - worst + floor,
            _ => 0.0,
        })
        .collect();
    if !weights.iter().sum::<f64>().is_finite() {
        return None;
    }
    WeightedIndex::new(weights).ok()
}
