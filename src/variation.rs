//! Offspring production through the oracle's variation operators.

use crate::{Genotype, Individual, Oracle, OracleError, VariationFallback};
use rand::Rng;
use rand_pcg::Pcg64;
use tracing::warn;

/// Probabilities applied to every offspring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VariationRates {
    pub mutation: f32,
    pub crossover: f32,
}

/// Breeds one offspring genotype from a mating pool.
///
/// The first parent is drawn uniformly from `pool` (indices into `members`;
/// the pool already carries the selection pressure). With probability
/// `rates.crossover` it is crossed with a second pool member, then mutated
/// with probability `rates.mutation`. An offspring nobody varied is a copy of
/// its parent.
///
/// With [`VariationFallback::SubstituteParent`], an `InvalidOperation` from
/// the oracle is logged and the parent (a random one for crossover) is kept;
/// any other failure is returned for the validity gate to retry.
pub fn breed<G, O, R>(
    oracle: &O,
    members: &[Individual<G>],
    pool: &[usize],
    rates: VariationRates,
    fallback: VariationFallback,
    rng: &mut R,
) -> Result<G, OracleError>
where
    G: Genotype,
    O: Oracle<G>,
    R: Rng,
{
    let first = pick(members, pool, rng)?;
    let mut child = if rng.random::<f32>() < rates.crossover {
        let second = pick(members, pool, rng)?;
        match oracle.crossover(&first.genotype, &second.genotype, rng) {
            Ok(child) => child,
            Err(OracleError::InvalidOperation(reason))
                if fallback == VariationFallback::SubstituteParent =>
            {
                warn!(
                    parents = ?(first.id, second.id),
                    %reason,
                    "crossover failed, substituting a random parent"
                );
                if rng.random_bool(0.5) {
                    first.genotype.clone()
                } else {
                    second.genotype.clone()
                }
            }
            Err(err) => return Err(err),
        }
    } else {
        first.genotype.clone()
    };

    if rng.random::<f32>() < rates.mutation {
        match oracle.mutate(&child, rng) {
            Ok(mutant) => child = mutant,
            Err(OracleError::InvalidOperation(reason))
                if fallback == VariationFallback::SubstituteParent =>
            {
                warn!(parent = first.id, %reason, "mutation failed, keeping the original genotype");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(child)
}

fn pick<'a, G: Genotype, R: Rng>(
    members: &'a [Individual<G>],
    pool: &[usize],
    rng: &mut R,
) -> Result<&'a Individual<G>, OracleError> {
    if pool.is_empty() {
        return Err(OracleError::InvalidOperation("empty mating pool".to_string()));
    }
    pool.get(rng.random_range(0..pool.len()))
        .and_then(|&i| members.get(i))
        .ok_or_else(|| OracleError::InvalidOperation("mating pool out of range".to_string()))
}

/// Builds a random genotype by a chain of `steps` mutations from `start`,
/// accepting only mutants the oracle deems valid.
///
/// # Errors
///
/// `InvalidOperation` if `start` itself is invalid. Failed or invalid
/// mutations along the way are skipped.
pub fn random_walk<G, O, R>(oracle: &O, start: &G, steps: usize, rng: &mut R) -> Result<G, OracleError>
where
    G: Genotype,
    O: Oracle<G>,
    R: Rng,
{
    if !oracle.is_valid(start) {
        return Err(OracleError::InvalidOperation(
            "random walk started from an invalid genotype".to_string(),
        ));
    }
    let mut current = start.clone();
    for _ in 0..steps {
        if let Ok(next) = oracle.mutate(&current, rng) {
            if oracle.is_valid(&next) {
                current = next;
            }
        }
    }
    Ok(current)
}

/// Two-phase random walk towards a target region.
///
/// The first half of `iterations` is an undirected [`random_walk`]. The
/// second half only accepts valid mutants whose `distance` to the target is
/// no larger than the best so far. `distance` returns `None` for genotypes it
/// cannot measure; a distance of `0.0` or less means the target is reached.
///
/// # Errors
///
/// `InvalidOperation` if `start` is invalid, or if the walk ends outside the
/// target and `best_effort` is false. With `best_effort` the closest genotype
/// found is returned instead.
pub fn directed_walk<G, O, R, F>(
    oracle: &O,
    start: &G,
    iterations: usize,
    distance: F,
    best_effort: bool,
    rng: &mut R,
) -> Result<G, OracleError>
where
    G: Genotype,
    O: Oracle<G>,
    R: Rng,
    F: Fn(&G) -> Option<f32>,
{
    let undirected = iterations / 2;
    let mut current = random_walk(oracle, start, undirected, rng)?;
    let mut best = distance(&current).unwrap_or(f32::INFINITY);
    for _ in undirected..iterations {
        let Ok(next) = oracle.mutate(&current, rng) else {
            continue;
        };
        if !oracle.is_valid(&next) {
            continue;
        }
        if let Some(d) = distance(&next).filter(|&d| d <= best) {
            current = next;
            best = d;
        }
    }

    if best <= 0.0 || best_effort {
        Ok(current)
    } else {
        Err(OracleError::InvalidOperation(format!(
            "random walk ended at distance {best} from the target after {iterations} mutations"
        )))
    }
}

/// Initializer for [`EvolutionDriver::new`](crate::EvolutionDriver::new)
/// that grows every initial genotype from `start` by a [`random_walk`] of
/// `steps` mutations.
pub fn seeded<G, O>(start: G, steps: usize) -> impl FnMut(&O, &mut Pcg64) -> Result<G, OracleError>
where
    G: Genotype,
    O: Oracle<G>,
{
    move |oracle, rng| random_walk(oracle, &start, steps, rng)
}
