use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::WorkflowConfig;
use crate::constraints::NormalizedConstraints;
use crate::corpus::{Recipe, RecipeCorpus};
use crate::embedding::Embedder;
use crate::planning::SearchPlan;

/// Candidate surviving retrieval: recipe plus the scores computed here.
/// Nutrition is filled in by the enricher later.
#[derive(Debug, Clone)]
pub struct RetrievedCandidate {
    pub recipe: Recipe,
    pub semantic_score: f32,
    pub pantry_match_score: f32,
    /// Pantry item names matched against this recipe; reused downstream for
    /// the pantry-utilization list rather than recomputed.
    pub pantry_hits: Vec<String>,
    pub combined_score: f32,
}

/// Case-insensitive fuzzy containment, tolerant of trailing plurals so
/// "peanuts" matches "peanut butter".
pub fn fuzzy_contains(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    let singular = needle.trim_end_matches('s');
    if singular.is_empty() {
        return false;
    }
    haystack.contains(singular)
}

/// Ingredient-family keywords that violate a diet tag. Checked against NER
/// tags; unknown diet tags fall through as soft constraints carried by the
/// semantic query instead.
fn forbidden_for_diet(diet: &str) -> &'static [&'static str] {
    const MEAT_AND_FISH: &[&str] = &[
        "chicken", "beef", "pork", "bacon", "ham", "lamb", "turkey", "sausage", "fish", "salmon",
        "tuna", "shrimp", "anchovy", "gelatin",
    ];
    const ANIMAL_PRODUCTS: &[&str] = &[
        "chicken", "beef", "pork", "bacon", "ham", "lamb", "turkey", "sausage", "fish", "salmon",
        "tuna", "shrimp", "anchovy", "gelatin", "milk", "butter", "cheese", "cream", "yogurt",
        "egg", "honey",
    ];
    const MEAT_ONLY: &[&str] = &[
        "chicken", "beef", "pork", "bacon", "ham", "lamb", "turkey", "sausage",
    ];
    match diet {
        "vegan" => ANIMAL_PRODUCTS,
        "vegetarian" => MEAT_AND_FISH,
        "pescatarian" => MEAT_ONLY,
        _ => &[],
    }
}

fn violates_diet(recipe: &Recipe, diet: Option<&str>) -> bool {
    let Some(diet) = diet else { return false };
    let forbidden = forbidden_for_diet(diet);
    recipe
        .ner
        .iter()
        .any(|tag| forbidden.iter().any(|f| fuzzy_contains(tag, f)))
}

/// A recipe is excluded when any excluded term fuzzily appears in its NER
/// tags or raw ingredient lines. This is the safety filter; it is never
/// relaxed.
fn contains_excluded(recipe: &Recipe, constraints: &NormalizedConstraints) -> bool {
    constraints.excluded_ingredients.iter().any(|excluded| {
        recipe.ner.iter().any(|tag| fuzzy_contains(tag, excluded))
            || recipe
                .ingredients
                .iter()
                .any(|line| fuzzy_contains(line, excluded))
    })
}

/// Pantry match: fraction of recipe ingredients present in the pantry,
/// fuzzy containment in either direction.
fn pantry_match(recipe: &Recipe, pantry: &[String]) -> (f32, Vec<String>) {
    if recipe.ingredients.is_empty() || pantry.is_empty() {
        return (0.0, Vec::new());
    }
    let mut hits: Vec<String> = Vec::new();
    let mut matched_lines = 0usize;
    for line in &recipe.ingredients {
        let matched: Vec<&String> = pantry
            .iter()
            .filter(|item| fuzzy_contains(line, item) || fuzzy_contains(item, line))
            .collect();
        if !matched.is_empty() {
            matched_lines += 1;
            for item in matched {
                if !hits.contains(item) {
                    hits.push(item.clone());
                }
            }
        }
    }
    (matched_lines as f32 / recipe.ingredients.len() as f32, hits)
}

/// Semantic search plus hard filtering plus pantry scoring over the corpus.
pub struct RetrievalEngine<'a> {
    corpus: &'a RecipeCorpus,
    embedder: &'a dyn Embedder,
    config: &'a WorkflowConfig,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(
        corpus: &'a RecipeCorpus,
        embedder: &'a dyn Embedder,
        config: &'a WorkflowConfig,
    ) -> Self {
        Self {
            corpus,
            embedder,
            config,
        }
    }

    /// Executes the plan: embed the query, take the nearest `semantic_top_k`
    /// recipes, drop diet/exclusion violators, score pantry overlap, rank by
    /// the strategy-weighted combination, truncate.
    ///
    /// An empty result is a normal outcome handled by the quality gate, not
    /// an error.
    pub fn retrieve(
        &self,
        plan: &SearchPlan,
        constraints: &NormalizedConstraints,
        pantry: &[String],
    ) -> Result<Vec<RetrievedCandidate>> {
        let query_embedding = self
            .embedder
            .embed_one(&plan.search_query)
            .with_context(|| format!("failed to embed search query '{}'", plan.search_query))?;

        let pool = if plan.top_k == 0 {
            self.config.semantic_top_k
        } else {
            plan.top_k
        };
        let hits = self.corpus.search(&query_embedding, pool);
        debug!(hits = hits.len(), query = %plan.search_query, "semantic search done");

        let (semantic_weight, pantry_weight) = plan.strategy.weights();
        let mut candidates: Vec<RetrievedCandidate> = Vec::new();

        for hit in hits {
            let Some(recipe) = self.corpus.get(&hit.id) else {
                continue;
            };
            if violates_diet(recipe, constraints.diet_type.as_deref()) {
                continue;
            }
            if contains_excluded(recipe, constraints) {
                continue;
            }
            // Scores from the store are cosine in [-1, 1]; clamp to [0, 1].
            let semantic_score = hit.score.clamp(0.0, 1.0);
            let (pantry_match_score, pantry_hits) = pantry_match(recipe, pantry);
            candidates.push(RetrievedCandidate {
                recipe: recipe.clone(),
                semantic_score,
                pantry_match_score,
                pantry_hits,
                combined_score: semantic_weight * semantic_score
                    + pantry_weight * pantry_match_score,
            });
        }

        candidates.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.config.retrieval_cap);

        info!(
            survivors = candidates.len(),
            strategy = ?plan.strategy,
            "retrieval complete"
        );
        Ok(candidates)
    }
}
