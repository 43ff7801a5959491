use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::info;

use crate::corpus::recipe::Recipe;
use crate::corpus::vector_db::{SearchHit, VectorStore};
use crate::embedding::Embedder;

/// Read-only indexed recipe collection: id lookup plus nearest-neighbor
/// search over precomputed embeddings.
pub struct RecipeCorpus {
    recipes: Vec<Recipe>,
    by_id: HashMap<String, usize>,
    store: VectorStore,
}

impl RecipeCorpus {
    /// Builds the index by embedding every recipe. Embeddings are computed
    /// once at construction; the corpus never changes afterwards.
    pub fn build(recipes: Vec<Recipe>, embedder: &dyn Embedder) -> Result<Self> {
        if recipes.is_empty() {
            anyhow::bail!("cannot build a corpus index from zero recipes");
        }

        let texts: Vec<String> = recipes.iter().map(Recipe::embedding_text).collect();
        info!(count = texts.len(), "embedding recipe corpus");
        let embeddings = embedder
            .embed(&texts)
            .context("failed to embed recipe corpus")?;

        let ids: Vec<String> = recipes.iter().map(|r| r.id.clone()).collect();
        let mut store = VectorStore::new(embedder.dimension());
        store
            .add_batch(&ids, &embeddings)
            .context("failed to populate corpus vector store")?;

        let by_id = recipes
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        Ok(Self {
            recipes,
            by_id,
            store,
        })
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.by_id.get(id).map(|&i| &self.recipes[i])
    }

    /// Nearest recipes to the query embedding, highest similarity first.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<SearchHit> {
        self.store.query(query_embedding, top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic embedder: maps text onto a fixed-dimension bag of
    /// character buckets, so similar strings land near each other.
    pub struct HashEmbedder {
        dim: usize,
    }

    impl HashEmbedder {
        pub fn new(dim: usize) -> Self {
            Self { dim }
        }
    }

    impl Embedder for HashEmbedder {
        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; self.dim];
                    for token in text.to_lowercase().split_whitespace() {
                        let mut h: usize = 7;
                        for b in token.bytes() {
                            h = h.wrapping_mul(31).wrapping_add(b as usize);
                        }
                        v[h % self.dim] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn recipe(id: &str, title: &str, ner: &[&str]) -> Recipe {
        Recipe {
            id: id.to_string(),
            title: title.to_string(),
            ingredients: ner.iter().map(|n| format!("1 cup {}", n)).collect(),
            directions: "Combine and cook.".to_string(),
            ner: ner.iter().map(|n| n.to_string()).collect(),
            source: None,
            link: None,
        }
    }

    #[test]
    fn search_returns_closest_recipe_first() -> Result<()> {
        let embedder = HashEmbedder::new(64);
        let corpus = RecipeCorpus::build(
            vec![
                recipe("0", "Chickpea Curry", &["chickpeas", "rice"]),
                recipe("1", "Beef Stew", &["beef", "potatoes"]),
            ],
            &embedder,
        )?;

        let query = embedder.embed_one("chickpeas rice curry")?;
        let hits = corpus.search(&query, 2);
        assert_eq!(hits[0].id, "0");
        assert!(hits[0].score > hits[1].score);
        Ok(())
    }

    #[test]
    fn get_by_id() -> Result<()> {
        let embedder = HashEmbedder::new(32);
        let corpus = RecipeCorpus::build(vec![recipe("7", "Toast", &["bread"])], &embedder)?;
        assert_eq!(corpus.get("7").unwrap().title, "Toast");
        assert!(corpus.get("8").is_none());
        Ok(())
    }

    #[test]
    fn empty_corpus_rejected() {
        let embedder = HashEmbedder::new(32);
        assert!(RecipeCorpus::build(vec![], &embedder).is_err());
    }
}
