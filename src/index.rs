//! Exact inner-product index over L2-normalized vectors.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::error::{Error, Result};

/// A row of the index with its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Brute-force nearest-neighbor index.
///
/// Rows are stored normalized, row-major, in one flat buffer. The index is
/// immutable once built; rebuild it to change its contents.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    data: Vec<f32>,
    dimension: usize,
    len: usize,
}

impl VectorIndex {
    /// Normalize and store `vectors`. Row `i` of the index is `vectors[i]`.
    ///
    /// Fails on an empty input, on inconsistent dimensions, and on vectors
    /// that are zero or contain non-finite values.
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = vectors.first().map(Vec::len).ok_or(Error::EmptyIndex)?;
        if dimension == 0 {
            return Err(Error::InvalidVector {
                row: 0,
                reason: "vector has no components",
            });
        }

        let len = vectors.len();
        let mut data = Vec::with_capacity(len * dimension);
        for (row, mut vector) in vectors.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            normalize(&mut vector, row)?;
            data.extend_from_slice(&vector);
        }

        Ok(Self {
            data,
            dimension,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The normalized vector stored at `row`.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        (row < self.len)
            .then(|| &self.data[row * self.dimension..(row + 1) * self.dimension])
    }

    /// Return the `min(top_k, len)` rows most similar to `query`, by
    /// descending score; equal scores order by lower row first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(Error::InvalidTopK);
        }
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query, 0)?;

        let mut hits: Vec<SearchHit> = self
            .data
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, stored)| SearchHit {
                row,
                score: dot(stored, &query),
            })
            .collect();

        let k = top_k.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank_order);
            hits.truncate(k);
        }
        hits.sort_by(rank_order);

        Ok(hits)
    }
}

/// Higher score first, then lower row.
fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.row.cmp(&b.row))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale `vector` to unit L2 norm in place.
///
/// `row` only labels the error.
pub fn normalize(vector: &mut [f32], row: usize) -> Result<()> {
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(Error::InvalidVector {
            row,
            reason: "vector contains NaN or infinite values",
        });
    }

    // Squares of finite f32 values neither overflow nor underflow in f64.
    let norm = vector
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 {
        return Err(Error::InvalidVector {
            row,
            reason: "vector has zero norm",
        });
    }

    for x in vector.iter_mut() {
        *x = (f64::from(*x) / norm) as f32;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn build_normalizes_rows() {
        let index = VectorIndex::build(vec![vec![3.0, 4.0], vec![0.0, 2.0]])
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 2);

        let row = index.row(0).unwrap();
        assert!((row[0] - 0.6).abs() < EPS);
        assert!((row[1] - 0.8).abs() < EPS);
        assert!(index.row(2).is_none());
    }

    #[test]
    fn build_rejects_empty_input() {
        assert!(matches!(VectorIndex::build(vec![]), Err(Error::EmptyIndex)));
    }

    #[test]
    fn build_rejects_mixed_dimensions() {
        let err =
            VectorIndex::build(vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]])
                .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn build_rejects_zero_vector() {
        let err = VectorIndex::build(vec![vec![1.0, 0.0], vec![0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidVector { row: 1, .. }));
    }

    #[test]
    fn build_rejects_nan() {
        let err = VectorIndex::build(vec![vec![f32::NAN, 1.0]]).unwrap_err();
        assert!(matches!(err, Error::InvalidVector { row: 0, .. }));
    }

    #[test]
    fn extreme_magnitudes_normalize() {
        for scale in [1e20f32, 1e-30, f32::MAX, f32::MIN_POSITIVE / 4.0] {
            let mut v = vec![scale, 0.0];
            normalize(&mut v, 0).unwrap();
            assert_eq!(v, vec![1.0, 0.0], "scale {scale:e}");

            let mut v = vec![-scale, scale];
            normalize(&mut v, 0).unwrap();
            assert!((v[0] + std::f32::consts::FRAC_1_SQRT_2).abs() < EPS);
            assert!((v[1] - std::f32::consts::FRAC_1_SQRT_2).abs() < EPS);
        }

        let index =
            VectorIndex::build(vec![vec![1e20, 0.0], vec![0.0, 1e-30]]).unwrap();
        let hits = index.search(&[1e-30, 0.0], 2).unwrap();
        assert_eq!(hits[0].row, 0);
        assert!((hits[0].score - 1.0).abs() < EPS);
        assert!(hits[1].score.abs() < EPS);
    }

    #[test]
    fn search_ranks_by_cosine() {
        let index = VectorIndex::build(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
        ])
        .unwrap();

        let hits = index.search(&[10.0, 0.0, 0.0], 3).unwrap();
        let rows: Vec<_> = hits.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![0, 2, 1]);
        assert!((hits[0].score - 1.0).abs() < EPS);
        assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < EPS);
        assert!(hits[2].score.abs() < EPS);
    }

    #[test]
    fn search_breaks_ties_by_lower_row() {
        let index = VectorIndex::build(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 5.0],
            vec![1.0, 0.0],
        ])
        .unwrap();

        let hits = index.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(hits[0].row, 0);
        assert_eq!(hits[1].row, 2);

        let hits = index.search(&[1.0, 0.0], 4).unwrap();
        let rows: Vec<_> = hits.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![1, 3, 0, 2]);
    }

    #[test]
    fn search_top_k_larger_than_index_returns_all() {
        let index =
            VectorIndex::build(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(index.search(&[1.0, 1.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn search_validates_arguments() {
        let index = VectorIndex::build(vec![vec![1.0, 0.0]]).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 0),
            Err(Error::InvalidTopK)
        ));
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            index.search(&[0.0, 0.0], 1),
            Err(Error::InvalidVector { .. })
        ));
    }

    #[test]
    fn opposite_vector_scores_minus_one() {
        let index = VectorIndex::build(vec![vec![1.0, 2.0]]).unwrap();
        let hits = index.search(&[-1.0, -2.0], 1).unwrap();
        assert!((hits[0].score + 1.0).abs() < EPS);
    }

    fn vectors(n: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Vec<f32>>> {
        (1usize..6).prop_flat_map(move |d| {
            proptest::collection::vec(
                proptest::collection::vec(-10.0f32..10.0, d)
                    .prop_filter("non-zero", |v| v.iter().any(|x| x.abs() > 0.01)),
                n.clone(),
            )
        })
    }

    proptest! {
        #[test]
        fn search_returns_min_k_n_sorted(
            rows in vectors(1..40),
            k in 1usize..50,
            pick in 0usize..40,
        ) {
            let n = rows.len();
            let query = rows[pick % n].clone();
            let index = VectorIndex::build(rows).unwrap();
            let hits = index.search(&query, k).unwrap();

            prop_assert_eq!(hits.len(), k.min(n));
            for pair in hits.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].row < pair[1].row);
                }
            }
        }

        #[test]
        fn self_query_scores_one(rows in vectors(1..30), pick in 0usize..30) {
            let n = rows.len();
            let i = pick % n;
            let query = rows[i].clone();
            let index = VectorIndex::build(rows).unwrap();
            let hits = index.search(&query, 1).unwrap();

            prop_assert!((hits[0].score - 1.0).abs() < 1e-4);
            // Another row may point the same way, so check row i by lookup.
            let all = index.search(&query, n).unwrap();
            let own = all.iter().find(|h| h.row == i).unwrap();
            prop_assert!((own.score - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn distinct_self_query_returns_own_row() {
        let rows = vec![
            vec![1.0, 0.2, 0.0],
            vec![0.1, 1.0, 0.3],
            vec![0.0, 0.4, 1.0],
            vec![0.5, 0.5, 0.5],
        ];
        let index = VectorIndex::build(rows.clone()).unwrap();
        for (i, row) in rows.iter().enumerate() {
            let hits = index.search(row, 1).unwrap();
            assert_eq!(hits[0].row, i);
            assert!((hits[0].score - 1.0).abs() < EPS);
        }
    }
}
