use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::api_connection::endpoints::{object_schema, JsonSchemaDefinition, JsonSchemaProperty};
use crate::config::WorkflowConfig;
use crate::constraints::NormalizedConstraints;
use crate::llm::{complete_structured, CompletionClient};

/// One applied relaxation: the loosened constraints plus a human-readable
/// description for the relaxation log.
#[derive(Debug, Clone)]
pub struct Relaxation {
    pub constraints: NormalizedConstraints,
    pub description: String,
}

/// Loosens constraints after an empty result. Implementations must never
/// touch excluded ingredients or the diet type; the orchestrator enforces
/// this on top. `None` means nothing left to relax.
#[async_trait]
pub trait Relaxer: Send + Sync {
    async fn relax(
        &self,
        constraints: &NormalizedConstraints,
        retry_count: u32,
    ) -> Option<Relaxation>;
}

fn widen_calories(
    constraints: &NormalizedConstraints,
    config: &WorkflowConfig,
) -> Option<Relaxation> {
    let range = constraints.calorie_range?;
    let widened = range.widened(config.calorie_relax_step);
    let mut next = constraints.clone();
    next.calorie_range = Some(widened);
    Some(Relaxation {
        constraints: next,
        description: format!(
            "widened calorie range from {}-{} to {}-{}",
            range.min, range.max, widened.min, widened.max
        ),
    })
}

/// Drops the macro with the smallest gram target, the one a recipe is least
/// likely to land inside at a fixed percentage tolerance.
fn drop_strictest_macro(constraints: &NormalizedConstraints) -> Option<Relaxation> {
    let macros = constraints.macro_targets.as_ref()?;
    let candidates = [
        ("protein", macros.protein),
        ("carbs", macros.carbs),
        ("fat", macros.fat),
    ];
    let (name, _) = candidates
        .iter()
        .filter_map(|(name, target)| target.map(|t| (*name, t)))
        .min_by_key(|(_, target)| *target)?;

    let mut next = constraints.clone();
    if let Some(m) = next.macro_targets.as_mut() {
        match name {
            "protein" => m.protein = None,
            "carbs" => m.carbs = None,
            _ => m.fat = None,
        }
        if m.is_empty() {
            next.macro_targets = None;
        }
    }
    Some(Relaxation {
        constraints: next,
        description: format!("dropped the {name} target"),
    })
}

/// Broadens the query by cutting trailing qualifier words, keeping the head
/// of the phrase. A single-word query cannot be broadened further.
fn broaden_query(constraints: &NormalizedConstraints) -> Option<Relaxation> {
    let words: Vec<&str> = constraints.semantic_query.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }
    let keep = (words.len() / 2).max(1);
    let broadened = words[..keep].join(" ");
    let mut next = constraints.clone();
    next.semantic_query = broadened.clone();
    Some(Relaxation {
        constraints: next,
        description: format!(
            "broadened search query from '{}' to '{}'",
            constraints.semantic_query, broadened
        ),
    })
}

/// Deterministic relaxation ladder: widen calories, then drop the strictest
/// macro, then broaden the query. Skips rungs that do not apply.
pub fn relax_deterministic(
    constraints: &NormalizedConstraints,
    config: &WorkflowConfig,
    retry_count: u32,
) -> Option<Relaxation> {
    let ladder: [fn(&NormalizedConstraints, &WorkflowConfig) -> Option<Relaxation>; 3] = [
        widen_calories,
        |c, _| drop_strictest_macro(c),
        |c, _| broaden_query(c),
    ];
    ladder
        .iter()
        .cycle()
        .skip(retry_count as usize)
        .take(ladder.len())
        .find_map(|step| step(constraints, config))
}

#[derive(Debug, Deserialize)]
struct RelaxationSuggestion {
    action: String,
    #[serde(default)]
    broadened_query: String,
}

/// LLM-guided relaxer. The model only picks which rung of the ladder to
/// apply; the actual constraint mutation stays deterministic, so exclusions
/// and diet can never be loosened no matter what the model says.
pub struct LlmRelaxer<'a> {
    client: &'a dyn CompletionClient,
    config: &'a WorkflowConfig,
}

impl<'a> LlmRelaxer<'a> {
    pub fn new(client: &'a dyn CompletionClient, config: &'a WorkflowConfig) -> Self {
        Self { client, config }
    }

    fn schema() -> JsonSchemaDefinition {
        object_schema(
            "constraint_relaxation",
            vec![
                (
                    "action",
                    JsonSchemaProperty::string_enum(
                        "Which constraint to loosen.",
                        &["widen_calories", "drop_macro", "broaden_query"],
                    ),
                ),
                (
                    "broadened_query",
                    JsonSchemaProperty::string(
                        "Shorter, more general search query. Only used with broaden_query.",
                    ),
                ),
            ],
            &["action"],
        )
    }

    fn apply(&self, suggestion: &RelaxationSuggestion, constraints: &NormalizedConstraints) -> Option<Relaxation> {
        match suggestion.action.as_str() {
            "widen_calories" => widen_calories(constraints, self.config),
            "drop_macro" => drop_strictest_macro(constraints),
            "broaden_query" => {
                let proposed = suggestion.broadened_query.trim();
                if proposed.is_empty() || proposed == constraints.semantic_query {
                    broaden_query(constraints)
                } else {
                    let mut next = constraints.clone();
                    next.semantic_query = proposed.to_string();
                    Some(Relaxation {
                        constraints: next,
                        description: format!(
                            "broadened search query from '{}' to '{}'",
                            constraints.semantic_query, proposed
                        ),
                    })
                }
            }
            other => {
                warn!(action = %other, "unknown relaxation action from model");
                None
            }
        }
    }
}

const RELAXER_SYSTEM_PROMPT: &str = "/no_thinking
You are a nutrition constraint arbiter. A recipe search returned nothing under the \
given constraints. Pick ONE constraint to loosen so the next attempt can succeed: \
'widen_calories' when the calorie window looks too tight, 'drop_macro' when a gram \
target is unrealistic, 'broaden_query' when the search phrase is too specific. \
Allergies, excluded ingredients and diet type can NEVER be loosened and are not \
options. Respond ONLY with a JSON object matching the provided schema.";

#[async_trait]
impl<'a> Relaxer for LlmRelaxer<'a> {
    async fn relax(
        &self,
        constraints: &NormalizedConstraints,
        retry_count: u32,
    ) -> Option<Relaxation> {
        if retry_count >= self.config.max_retries {
            return None;
        }

        let user_prompt = format!(
            "Attempt {} of {} failed with zero results.\nCurrent constraints:\n{}\n\nChoose the relaxation.",
            retry_count + 1,
            self.config.max_retries,
            serde_json::to_string_pretty(constraints).unwrap_or_else(|_| "{}".to_string()),
        );

        let relaxation = match complete_structured::<RelaxationSuggestion>(
            self.client,
            RELAXER_SYSTEM_PROMPT,
            &user_prompt,
            &Self::schema(),
        )
        .await
        {
            Ok(suggestion) => self.apply(&suggestion, constraints),
            Err(e) => {
                warn!(error = %e, "relaxer model failed twice, using deterministic ladder");
                None
            }
        };

        let relaxation =
            relaxation.or_else(|| relax_deterministic(constraints, self.config, retry_count))?;

        // Safety constraints are immutable regardless of what was applied.
        debug_assert_eq!(
            relaxation.constraints.excluded_ingredients,
            constraints.excluded_ingredients
        );
        debug_assert_eq!(relaxation.constraints.diet_type, constraints.diet_type);

        info!(description = %relaxation.description, "constraints relaxed");
        Some(relaxation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use crate::constraints::{CalorieRange, MacroTargets};
    use std::collections::BTreeSet;

    fn constraints() -> NormalizedConstraints {
        NormalizedConstraints {
            calorie_range: Some(CalorieRange { min: 300, max: 350 }),
            macro_targets: Some(MacroTargets {
                protein: Some(40),
                carbs: Some(60),
                fat: Some(15),
            }),
            diet_type: Some("vegan".to_string()),
            excluded_ingredients: ["peanuts".to_string()].into_iter().collect(),
            prep_time_max_minutes: None,
            custom_constraints: Default::default(),
            semantic_query: "spicy thai green curry bowl".to_string(),
        }
    }

    #[test]
    fn ladder_widens_calories_first() {
        let config = WorkflowConfig::default();
        let relaxed = relax_deterministic(&constraints(), &config, 0).unwrap();
        assert_eq!(
            relaxed.constraints.calorie_range,
            Some(CalorieRange { min: 200, max: 450 })
        );
        assert_eq!(relaxed.constraints.macro_targets, constraints().macro_targets);
    }

    #[test]
    fn ladder_drops_smallest_macro_second() {
        let config = WorkflowConfig::default();
        let relaxed = relax_deterministic(&constraints(), &config, 1).unwrap();
        let macros = relaxed.constraints.macro_targets.unwrap();
        assert_eq!(macros.fat, None);
        assert_eq!(macros.protein, Some(40));
        assert_eq!(macros.carbs, Some(60));
    }

    #[test]
    fn ladder_skips_inapplicable_rungs() {
        let config = WorkflowConfig::default();
        let mut no_calories = constraints();
        no_calories.calorie_range = None;
        no_calories.macro_targets = None;

        let relaxed = relax_deterministic(&no_calories, &config, 0).unwrap();
        assert_eq!(relaxed.constraints.semantic_query, "spicy thai");
    }

    #[test]
    fn single_word_query_cannot_broaden() {
        let config = WorkflowConfig::default();
        let mut bare = constraints();
        bare.calorie_range = None;
        bare.macro_targets = None;
        bare.semantic_query = "curry".to_string();
        assert!(relax_deterministic(&bare, &config, 0).is_none());
    }

    struct FixedClient(String);

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _schema: &JsonSchemaDefinition,
        ) -> Result<String, ApiConnectionError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn llm_choice_is_applied_but_exclusions_survive() {
        let config = WorkflowConfig::default();
        let client = FixedClient(r#"{"action":"drop_macro"}"#.to_string());
        let relaxer = LlmRelaxer::new(&client, &config);

        let relaxed = relaxer.relax(&constraints(), 0).await.unwrap();
        assert_eq!(relaxed.constraints.macro_targets.unwrap().fat, None);
        let expected: BTreeSet<String> = ["peanuts".to_string()].into_iter().collect();
        assert_eq!(relaxed.constraints.excluded_ingredients, expected);
        assert_eq!(relaxed.constraints.diet_type.as_deref(), Some("vegan"));
    }

    #[tokio::test]
    async fn garbage_model_output_falls_back_to_ladder() {
        let config = WorkflowConfig::default();
        let client = FixedClient("not json".to_string());
        let relaxer = LlmRelaxer::new(&client, &config);

        let relaxed = relaxer.relax(&constraints(), 0).await.unwrap();
        assert_eq!(
            relaxed.constraints.calorie_range,
            Some(CalorieRange { min: 200, max: 450 })
        );
    }

    #[tokio::test]
    async fn refuses_past_retry_budget() {
        let config = WorkflowConfig::default();
        let client = FixedClient(r#"{"action":"widen_calories"}"#.to_string());
        let relaxer = LlmRelaxer::new(&client, &config);
        assert!(relaxer.relax(&constraints(), config.max_retries).await.is_none());
    }
}
