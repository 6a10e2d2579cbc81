//! Pairwise dissimilarity between individuals.
//!
//! Used for diversity diagnostics: the matrix is square, its diagonal is
//! zero, and it is expected (but not required) to be symmetric.

use crate::{Genotype, Individual, Oracle, OracleError};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DissimilarityMethod {
    /// Whatever [`Oracle::dissimilarity`] measures on the genotypes.
    Genetic,
    /// Absolute difference of primary fitness (unevaluated counts as NaN).
    Fitness,
    /// Euclidean distance between behavioural descriptors.
    Descriptor,
}

/// Computes the `n × n` dissimilarity matrix of `individuals`.
///
/// Asymmetry is tolerated but reported with a warning naming the number of
/// asymmetric pairs and the largest discrepancy.
///
/// # Errors
///
/// Propagates oracle failures for [`DissimilarityMethod::Genetic`], and
/// returns `InvalidOperation` if the oracle reports a non-zero
/// self-dissimilarity.
pub fn dissimilarity_matrix<G, O>(
    oracle: &O,
    individuals: &[Individual<G>],
    method: DissimilarityMethod,
) -> Result<Vec<Vec<f32>>, OracleError>
where
    G: Genotype,
    O: Oracle<G>,
{
    let n = individuals.len();
    let mut matrix = vec![vec![0.0f32; n]; n];
    for (i, a) in individuals.iter().enumerate() {
        for (j, b) in individuals.iter().enumerate() {
            matrix[i][j] = match method {
                DissimilarityMethod::Genetic => oracle.dissimilarity(&a.genotype, &b.genotype)?,
                DissimilarityMethod::Fitness => {
                    if i == j {
                        0.0
                    } else {
                        let fa = a.primary_fitness().unwrap_or(f32::NAN);
                        let fb = b.primary_fitness().unwrap_or(f32::NAN);
                        (fa - fb).abs()
                    }
                }
                DissimilarityMethod::Descriptor => euclidean(&a.descriptor, &b.descriptor),
            };
        }
    }

    for (i, row) in matrix.iter().enumerate() {
        if row[i] != 0.0 {
            return Err(OracleError::InvalidOperation(format!(
                "not a dissimilarity matrix: entry ({i}, {i}) is {}",
                row[i]
            )));
        }
    }

    let mut asymmetric = 0usize;
    let mut max_difference = 0.0f32;
    for i in 0..n {
        for j in (i + 1)..n {
            let difference = (matrix[i][j] - matrix[j][i]).abs();
            if difference > 0.0 {
                asymmetric += 1;
                max_difference = max_difference.max(difference);
            }
        }
    }
    if asymmetric > 0 {
        warn!(
            asymmetric,
            pairs = n * (n - 1) / 2,
            max_difference,
            "dissimilarity matrix is not symmetric"
        );
    }
    Ok(matrix)
}

/// Euclidean distance; missing dimensions of the shorter descriptor count as 0.
fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().max(b.len());
    (0..len)
        .map(|k| {
            let d = a.get(k).copied().unwrap_or(0.0) - b.get(k).copied().unwrap_or(0.0);
            d * d
        })
        .sum::<f32>()
        .sqrt()
}
