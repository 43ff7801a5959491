//! Flat in-process vector store used by the recipe corpus.
//!
//! Vectors are normalized on insert and stored in one contiguous matrix, so
//! a query is a parallel dot-product sweep plus a bounded heap. Cosine is
//! the only metric; it must stay consistent within a request.
#![forbid(unsafe_code)]

use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::Path;

type Float = f32;

/// A ranked query result: stored id plus cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: Float,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    embedding_dim: usize,
    ids: Vec<String>,
    #[serde(with = "base64_matrix")]
    matrix: Vec<Float>,
}

mod base64_matrix {
    use super::*;
    use bytemuck::cast_slice;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(vec: &[Float], serializer: S) -> Result<S::Ok, S::Error> {
        let b64 = general_purpose::STANDARD.encode(cast_slice(vec));
        serializer.serialize_str(&b64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Float>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| Float::from_le_bytes(chunk.try_into().expect("chunk of 4")))
            .collect())
    }
}

#[derive(Debug)]
pub struct VectorStore {
    embedding_dim: usize,
    ids: Vec<String>,
    matrix: Vec<Float>,
}

#[derive(PartialEq)]
struct ScoredIndex {
    score: Float,
    index: usize,
}

impl Eq for ScoredIndex {}

impl PartialOrd for ScoredIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the default max-heap behaves as a min-heap on score,
        // keeping the K largest. NaN sorts below any real score.
        other.score.partial_cmp(&self.score).unwrap_or_else(|| {
            if self.score.is_nan() && !other.score.is_nan() {
                Ordering::Less
            } else if !self.score.is_nan() && other.score.is_nan() {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
    }
}

impl VectorStore {
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            ids: Vec::new(),
            matrix: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Inserts a batch of vectors. Vectors are normalized here; duplicate
    /// ids are rejected rather than upserted since the corpus is read-only
    /// after build.
    pub fn add_batch(&mut self, ids: &[String], vectors: &[Vec<Float>]) -> Result<()> {
        if ids.len() != vectors.len() {
            anyhow::bail!(
                "ids and vectors count mismatch: {} vs {}",
                ids.len(),
                vectors.len()
            );
        }
        for (id, vector) in ids.iter().zip(vectors.iter()) {
            if vector.len() != self.embedding_dim {
                anyhow::bail!(
                    "embedding dimension mismatch for '{}': expected {}, got {}",
                    id,
                    self.embedding_dim,
                    vector.len()
                );
            }
            if self.ids.contains(id) {
                anyhow::bail!("duplicate vector id: {}", id);
            }
            self.matrix.extend_from_slice(&normalize(vector));
            self.ids.push(id.clone());
        }
        Ok(())
    }

    /// Returns up to `top_k` nearest entries by cosine similarity, highest
    /// first. An empty store yields an empty result, not an error.
    pub fn query(&self, query: &[Float], top_k: usize) -> Vec<SearchHit> {
        if self.ids.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query_norm = normalize(query);
        let dim = self.embedding_dim;

        let scores: Vec<Float> = self
            .matrix
            .par_chunks_exact(dim)
            .map(|row| dot(row, &query_norm))
            .collect();

        let mut heap = BinaryHeap::with_capacity(top_k + 1);
        for (index, &score) in scores.iter().enumerate() {
            heap.push(ScoredIndex { score, index });
            if heap.len() > top_k {
                heap.pop();
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|si| SearchHit {
                id: self.ids[si.index].clone(),
                score: si.score,
            })
            .collect()
    }

    /// Persists the store as JSON with a base64-packed matrix.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            embedding_dim: self.embedding_dim,
            ids: self.ids.clone(),
            matrix: self.matrix.clone(),
        };
        fs::write(path, serde_json::to_string(&snapshot)?)?;
        Ok(())
    }

    pub fn load(path: &Path, expected_dim: usize) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        if snapshot.embedding_dim != expected_dim {
            anyhow::bail!(
                "embedding dimension mismatch: store has {}, expected {}",
                snapshot.embedding_dim,
                expected_dim
            );
        }
        let expected_len = snapshot.ids.len() * snapshot.embedding_dim;
        if snapshot.matrix.len() != expected_len {
            anyhow::bail!(
                "matrix size mismatch: expected {}, got {}",
                expected_len,
                snapshot.matrix.len()
            );
        }
        Ok(Self {
            embedding_dim: snapshot.embedding_dim,
            ids: snapshot.ids,
            matrix: snapshot.matrix,
        })
    }
}

#[inline]
fn dot(a: &[Float], b: &[Float]) -> Float {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalizes to unit length; a zero vector stays zero rather than dividing
/// by zero.
pub fn normalize(vector: &[Float]) -> Vec<Float> {
    let norm_sq: Float = vector.iter().map(|&x| x * x).sum();
    if norm_sq == 0.0 {
        return vec![0.0; vector.len()];
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    vector.iter().map(|&x| x * inv_norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn store_with(entries: &[(&str, Vec<Float>)]) -> VectorStore {
        let dim = entries[0].1.len();
        let mut store = VectorStore::new(dim);
        let ids: Vec<String> = entries.iter().map(|(id, _)| id.to_string()).collect();
        let vectors: Vec<Vec<Float>> = entries.iter().map(|(_, v)| v.clone()).collect();
        store.add_batch(&ids, &vectors).unwrap();
        store
    }

    #[test]
    fn query_ranks_by_cosine_descending() {
        let store = store_with(&[
            ("a", vec![1.0, 0.0, 0.0]),
            ("b", vec![0.0, 1.0, 0.0]),
            ("c", vec![0.9, 0.1, 0.0]),
        ]);
        let hits = store.query(&[1.0, 0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "c");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn query_on_empty_store_is_empty() {
        let store = VectorStore::new(4);
        assert!(store.query(&[1.0, 0.0, 0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn rejects_dimension_mismatch_and_duplicates() {
        let mut store = VectorStore::new(3);
        assert!(store
            .add_batch(&["x".to_string()], &[vec![1.0, 2.0]])
            .is_err());
        store
            .add_batch(&["x".to_string()], &[vec![1.0, 2.0, 3.0]])
            .unwrap();
        assert!(store
            .add_batch(&["x".to_string()], &[vec![1.0, 2.0, 3.0]])
            .is_err());
    }

    #[test]
    fn save_and_load_round_trip() -> Result<()> {
        let store = store_with(&[("a", vec![3.0, 4.0]), ("b", vec![0.0, 1.0])]);
        let file = NamedTempFile::new()?;
        store.save(file.path())?;

        let loaded = VectorStore::load(file.path(), 2)?;
        assert_eq!(loaded.len(), 2);
        let hits = loaded.query(&[3.0, 4.0], 1);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > 0.99);

        assert!(VectorStore::load(file.path(), 5).is_err());
        Ok(())
    }

    #[test]
    fn random_vector_is_its_own_nearest_neighbor() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let dim = 32;
        let vectors: Vec<Vec<Float>> = (0..50)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        let ids: Vec<String> = (0..50).map(|i| format!("r{i}")).collect();

        let mut store = VectorStore::new(dim);
        store.add_batch(&ids, &vectors).unwrap();

        let hits = store.query(&vectors[17], 1);
        assert_eq!(hits[0].id, "r17");
    }

    #[test]
    fn normalize_handles_zero_vector() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
        let n = normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
    }
}
