//! Cluster validity and agreement measures.
//!
//! | Metric | Input | Range | Best | Used for |
//! |--------|-------|-------|------|----------|
//! | [`silhouette`] | distances + hard labels | [-1, 1] | 1 | choosing the cluster count |
//! | [`partition_coefficient`] | fuzzy memberships | [1/c, 1] | 1 | fuzziness diagnostics |
//! | [`ari`] | two labelings | [-1, 1] | 1 | comparing against a reference |
//!
//! # References
//!
//! - Rousseeuw (1987). "Silhouettes: a graphical aid to the interpretation
//!   and validation of cluster analysis"
//! - Bezdek (1981). "Pattern Recognition with Fuzzy Objective Function Algorithms"
//! - Hubert & Arabie (1985). "Comparing partitions" (ARI)

use ndarray::{Array2, ArrayView2};
use std::collections::HashMap;

/// Mean silhouette width of a hard partition.
///
/// For object `i` in cluster `A`, with `a(i)` the mean distance to the other
/// members of `A` and `b(i)` the smallest mean distance to any other cluster:
///
/// ```text
/// s(i) = (b(i) - a(i)) / max(a(i), b(i))
/// ```
///
/// Members of singleton clusters score 0. Partitions with fewer than two
/// clusters score 0.
///
/// # Example
///
/// ```rust
/// use isogloss::metrics::silhouette;
/// use ndarray::array;
///
/// let d = array![
///     [0.0, 1.0, 9.0, 9.0],
///     [1.0, 0.0, 9.0, 9.0],
///     [9.0, 9.0, 0.0, 1.0],
///     [9.0, 9.0, 1.0, 0.0],
/// ];
/// assert!(silhouette(d.view(), &[0, 0, 1, 1]) > 0.8);
/// ```
pub fn silhouette(distances: ArrayView2<'_, f64>, labels: &[usize]) -> f64 {
    let n = labels.len();
    if n == 0 || distances.nrows() != n || distances.ncols() != n {
        return 0.0;
    }
    let k = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut sums = vec![0.0; k];
    for i in 0..n {
        let own = labels[i];
        if sizes[own] < 2 {
            continue;
        }
        sums.iter_mut().for_each(|s| *s = 0.0);
        for j in 0..n {
            if j != i {
                sums[labels[j]] += distances[[i, j]];
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

/// Bezdek's partition coefficient `Σᵢ Σₖ uᵢₖ² / n` of an `n × c`
/// membership matrix.
///
/// 1 for a hard partition, `1/c` for uniform memberships.
pub fn partition_coefficient(memberships: &Array2<f64>) -> f64 {
    let n = memberships.nrows();
    if n == 0 {
        return 0.0;
    }
    memberships.iter().map(|u| u * u).sum::<f64>() / n as f64
}

/// Adjusted Rand Index between two labelings.
///
/// ARI adjusts the Rand Index for chance agreement:
///
/// ```text
/// ARI = (RI - E[RI]) / (max(RI) - E[RI])
/// ```
///
/// 1 for identical partitions (up to label permutation), around 0 for
/// random ones.
///
/// ```rust
/// use isogloss::metrics::ari;
///
/// assert!((ari(&[0, 0, 1, 1], &[1, 1, 0, 0]) - 1.0).abs() < 1e-12);
/// ```
pub fn ari(pred: &[usize], truth: &[usize]) -> f64 {
    if pred.len() != truth.len() || pred.is_empty() {
        return 0.0;
    }

    let mut joint: HashMap<(usize, usize), usize> = HashMap::new();
    let mut row_sums: HashMap<usize, usize> = HashMap::new();
    let mut col_sums: HashMap<usize, usize> = HashMap::new();
    for (&p, &t) in pred.iter().zip(truth) {
        *joint.entry((p, t)).or_insert(0) += 1;
        *row_sums.entry(p).or_insert(0) += 1;
        *col_sums.entry(t).or_insert(0) += 1;
    }

    let sum_comb_ij: f64 = joint.values().map(|&c| comb2(c)).sum();
    let sum_comb_a: f64 = row_sums.values().map(|&a| comb2(a)).sum();
    let sum_comb_b: f64 = col_sums.values().map(|&b| comb2(b)).sum();
    let comb_n = comb2(pred.len());
    if comb_n == 0.0 {
        return 1.0;
    }

    let expected = sum_comb_a * sum_comb_b / comb_n;
    let max_index = (sum_comb_a + sum_comb_b) / 2.0;
    let denom = max_index - expected;
    if denom.abs() < 1e-10 {
        return 1.0;
    }
    (sum_comb_ij - expected) / denom
}

fn comb2(n: usize) -> f64 {
    if n < 2 {
        0.0
    } else {
        (n * (n - 1) / 2) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_silhouette_prefers_true_partition() {
        let d = array![
            [0.0, 1.0, 1.0, 8.0, 8.0],
            [1.0, 0.0, 1.0, 8.0, 8.0],
            [1.0, 1.0, 0.0, 8.0, 8.0],
            [8.0, 8.0, 8.0, 0.0, 1.0],
            [8.0, 8.0, 8.0, 1.0, 0.0],
        ];
        let good = silhouette(d.view(), &[0, 0, 0, 1, 1]);
        let bad = silhouette(d.view(), &[0, 1, 0, 1, 0]);
        assert!(good > 0.8);
        assert!(bad < good);
    }

    #[test]
    fn test_silhouette_degenerate_inputs() {
        let d = array![[0.0, 1.0], [1.0, 0.0]];
        assert_eq!(silhouette(d.view(), &[0, 0]), 0.0);
        // Singleton clusters contribute 0.
        assert_eq!(silhouette(d.view(), &[0, 1]), 0.0);
        assert_eq!(silhouette(d.view(), &[0]), 0.0);
    }

    #[test]
    fn test_partition_coefficient_bounds() {
        let hard = array![[1.0, 0.0], [0.0, 1.0]];
        let uniform = array![[0.5, 0.5], [0.5, 0.5]];
        assert!((partition_coefficient(&hard) - 1.0).abs() < 1e-12);
        assert!((partition_coefficient(&uniform) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ari_label_permutation() {
        assert!((ari(&[0, 0, 1, 1, 2], &[2, 2, 0, 0, 1]) - 1.0).abs() < 1e-12);
        assert!(ari(&[0, 1, 0, 1], &[0, 0, 1, 1]) < 0.1);
        assert_eq!(ari(&[0], &[0, 1]), 0.0);
    }
}
