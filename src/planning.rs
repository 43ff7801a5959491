use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api_connection::endpoints::{object_schema, JsonSchemaDefinition, JsonSchemaProperty};
use crate::constraints::NormalizedConstraints;
use crate::llm::{complete_structured, CompletionClient};

/// Retrieval strategy: which score dominates the candidate ranking.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    PantryFirst,
    SemanticFirst,
    Balanced,
}

impl SearchStrategy {
    /// `(semantic_weight, pantry_weight)` for the combined ranking score.
    pub fn weights(self) -> (f32, f32) {
        match self {
            SearchStrategy::PantryFirst => (0.4, 0.6),
            SearchStrategy::SemanticFirst => (0.8, 0.2),
            SearchStrategy::Balanced => (0.6, 0.4),
        }
    }
}

pub const DEFAULT_TOP_K: usize = 100;

/// Search plan consumed by the retrieval engine.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchPlan {
    /// Overrides the normalized semantic query when the planner rephrases it.
    pub search_query: String,
    pub strategy: SearchStrategy,
    /// Constraint dimensions the planner considers hard (informational; the
    /// exclusion and diet filters are always hard regardless).
    pub hard_constraints: Vec<String>,
    /// Nearest-neighbor pool size for the semantic search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl SearchPlan {
    /// Safe default when the planner cannot produce a valid plan: query
    /// unchanged, everything hard, balanced ranking.
    pub fn fallback(constraints: &NormalizedConstraints) -> Self {
        let mut hard = Vec::new();
        if constraints.calorie_range.is_some() {
            hard.push("calories".to_string());
        }
        if constraints.macro_targets.is_some() {
            hard.push("macros".to_string());
        }
        if constraints.diet_type.is_some() {
            hard.push("diet".to_string());
        }
        if !constraints.excluded_ingredients.is_empty() {
            hard.push("excluded_ingredients".to_string());
        }
        Self {
            search_query: constraints.semantic_query.clone(),
            strategy: SearchStrategy::Balanced,
            hard_constraints: hard,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Strategy selector seam. The LLM adapter is the production
/// implementation; tests use a deterministic stub.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        constraints: &NormalizedConstraints,
        pantry_item_names: &[String],
    ) -> SearchPlan;
}

pub struct LlmPlanner<'a> {
    client: &'a dyn CompletionClient,
}

impl<'a> LlmPlanner<'a> {
    pub fn new(client: &'a dyn CompletionClient) -> Self {
        Self { client }
    }

    fn schema() -> JsonSchemaDefinition {
        object_schema(
            "search_plan",
            vec![
                (
                    "search_query",
                    JsonSchemaProperty::string(
                        "Optimized semantic query for recipe retrieval.",
                    ),
                ),
                (
                    "strategy",
                    JsonSchemaProperty::string_enum(
                        "Ranking emphasis for candidate ordering.",
                        &["pantry_first", "semantic_first", "balanced"],
                    ),
                ),
                (
                    "hard_constraints",
                    JsonSchemaProperty::string_array(
                        "Constraint dimensions that must not be violated.",
                    ),
                ),
                (
                    "top_k",
                    JsonSchemaProperty::integer(
                        "Nearest-neighbor pool size for semantic search, 10 to 200.",
                    ),
                ),
            ],
            &["search_query", "strategy", "hard_constraints"],
        )
    }
}

const PLANNER_SYSTEM_PROMPT: &str = "/no_thinking
You are a meal planning strategist who determines optimal recipe search strategies.
Given normalized meal constraints and the user's pantry, decide:
- the best semantic search query (rephrase for recipe retrieval, keep diet and cuisine terms),
- the ranking strategy: 'pantry_first' when the pantry is well stocked and the user \
seems to want to cook from it, 'semantic_first' when the request is specific, \
'balanced' otherwise,
- which constraint dimensions are hard.
Respond ONLY with a JSON object matching the provided schema.";

#[async_trait]
impl<'a> Planner for LlmPlanner<'a> {
    async fn plan(
        &self,
        constraints: &NormalizedConstraints,
        pantry_item_names: &[String],
    ) -> SearchPlan {
        let user_prompt = format!(
            "Normalized constraints:\n{}\n\nPantry items: {}\n\nProduce the search plan.",
            serde_json::to_string_pretty(constraints).unwrap_or_else(|_| "{}".to_string()),
            if pantry_item_names.is_empty() {
                "(none)".to_string()
            } else {
                pantry_item_names.join(", ")
            }
        );

        match complete_structured::<SearchPlan>(
            self.client,
            PLANNER_SYSTEM_PROMPT,
            &user_prompt,
            &Self::schema(),
        )
        .await
        {
            Ok(mut plan) => {
                if plan.search_query.trim().is_empty() {
                    plan.search_query = constraints.semantic_query.clone();
                }
                plan.top_k = plan.top_k.clamp(10, 200);
                info!(strategy = ?plan.strategy, query = %plan.search_query, "search plan ready");
                plan
            }
            Err(e) => {
                warn!(error = %e, "planner failed twice, using fallback plan");
                SearchPlan::fallback(constraints)
            }
        }
    }
}
