//! In-memory exact nearest-neighbour index over chunk embeddings.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::warn;

use crate::error::IndexError;
use crate::models::{Chunk, EmbeddingRecord, Metric, ScoredChunk};

/// Immutable index built from one upload's embedding records.
///
/// Vectors are stored row-wise in a matrix; for [`Metric::Cosine`] the rows are
/// normalized at build time so a query is a single matrix-vector product.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    vectors: Array2<f32>,
    metric: Metric,
}

impl VectorIndex {
    /// Build an index. All records must share one non-zero dimension.
    pub fn build(records: Vec<EmbeddingRecord>, metric: Metric) -> Result<Self, IndexError> {
        let dimension = records.first().map_or(0, |r| r.dimension());
        if !records.is_empty() && dimension == 0 {
            return Err(IndexError::EmptyVector(0));
        }

        let mut chunks = Vec::with_capacity(records.len());
        let mut flat = Vec::with_capacity(records.len() * dimension);

        for (position, record) in records.into_iter().enumerate() {
            if record.dimension() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    actual: record.dimension(),
                });
            }
            match metric {
                Metric::Cosine => flat.extend(normalize(&record.vector)),
                Metric::L2 => flat.extend_from_slice(&record.vector),
            }
            chunks.push(record.chunk);
        }

        let vectors = Array2::from_shape_vec((chunks.len(), dimension), flat).map_err(|_| {
            IndexError::DimensionMismatch {
                position: 0,
                expected: dimension,
                actual: 0,
            }
        })?;

        Ok(Self {
            chunks,
            vectors,
            metric,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Vector dimension, 0 for an empty index.
    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Return the `k` chunks most similar to `query`, best first.
    ///
    /// Never fails: an empty index, `k == 0`, or a query of the wrong
    /// dimension yields an empty result. Equal scores keep insertion order.
    pub fn query(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }
        if query.len() != self.dimension() {
            warn!(
                expected = self.dimension(),
                actual = query.len(),
                "query vector dimension does not match index"
            );
            return Vec::new();
        }

        let scores: Array1<f32> = match self.metric {
            Metric::Cosine => self.vectors.dot(&Array1::from(normalize(query))),
            Metric::L2 => {
                let query = ArrayView1::from(query);
                self.vectors
                    .axis_iter(Axis(0))
                    .map(|row| {
                        let distance = (&row - &query).mapv(|x| x * x).sum().sqrt();
                        1.0 / (1.0 + distance)
                    })
                    .collect()
            }
        };

        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        // Stable sort keeps insertion order among ties
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        ranked
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }
}

/// Scale `v` to unit length; the zero vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn record(text: &str, index: u32, vector: Vec<f32>) -> EmbeddingRecord {
        let doc = Document::new("doc.txt", "content");
        EmbeddingRecord::new(Chunk::new(&doc, text.to_string(), index, 0, None), vector)
    }

    fn texts(results: &[ScoredChunk]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.text.as_str()).collect()
    }

    #[test]
    fn test_cosine_ranking() {
        let index = VectorIndex::build(
            vec![
                record("A", 0, vec![1.0, 0.0]),
                record("B", 1, vec![0.0, 1.0]),
                record("C", 2, vec![0.7, 0.7]),
            ],
            Metric::Cosine,
        )
        .unwrap();

        let results = index.query(&[1.0, 0.1], 2);
        assert_eq!(texts(&results), vec!["A", "C"]);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_build_keeps_chunks_in_order() {
        let index = VectorIndex::build(
            vec![record("A", 0, vec![1.0, 0.0, 0.0]), record("B", 1, vec![0.0, 1.0, 0.0])],
            Metric::L2,
        )
        .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 3);
        assert_eq!(index.metric(), Metric::L2);
        let texts: Vec<&str> = index.chunks().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn test_cosine_scale_invariant() {
        let index = VectorIndex::build(
            vec![record("A", 0, vec![2.0, 0.0]), record("B", 1, vec![0.0, 5.0])],
            Metric::Cosine,
        )
        .unwrap();

        let results = index.query(&[10.0, 0.0], 1);
        assert_eq!(texts(&results), vec!["A"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_ranking_and_score() {
        let index = VectorIndex::build(
            vec![record("near", 0, vec![1.0, 1.0]), record("far", 1, vec![4.0, 5.0])],
            Metric::L2,
        )
        .unwrap();

        let results = index.query(&[1.0, 1.0], 2);
        assert_eq!(texts(&results), vec!["near", "far"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[1].score - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = VectorIndex::build(
            vec![record("A", 0, vec![1.0, 0.0]), record("B", 1, vec![0.0, 1.0])],
            Metric::Cosine,
        )
        .unwrap();
        assert_eq!(index.query(&[1.0, 0.0], 10).len(), 2);
        assert!(index.query(&[1.0, 0.0], 0).is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = VectorIndex::build(
            vec![
                record("first", 0, vec![1.0, 0.0]),
                record("second", 1, vec![1.0, 0.0]),
                record("third", 2, vec![1.0, 0.0]),
            ],
            Metric::Cosine,
        )
        .unwrap();
        let results = index.query(&[1.0, 0.0], 3);
        assert_eq!(texts(&results), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::build(Vec::new(), Metric::Cosine).unwrap();
        assert!(index.is_empty());
        assert!(index.query(&[1.0, 0.0], 3).is_empty());
    }

    #[test]
    fn test_wrong_query_dimension_returns_nothing() {
        let index = VectorIndex::build(vec![record("A", 0, vec![1.0, 0.0])], Metric::Cosine)
            .unwrap();
        assert!(index.query(&[1.0, 0.0, 0.0], 3).is_empty());
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let result = VectorIndex::build(
            vec![record("A", 0, vec![1.0, 0.0]), record("B", 1, vec![1.0])],
            Metric::Cosine,
        );
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                position: 1,
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(normalize(&[3.0, 4.0]), vec![0.6, 0.8]);
    }

    #[test]
    fn test_build_rejects_empty_vectors() {
        let result = VectorIndex::build(vec![record("A", 0, vec![])], Metric::L2);
        assert!(matches!(result, Err(IndexError::EmptyVector(0))));
    }
}
