use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api_connection::endpoints::{object_schema, JsonSchemaDefinition, JsonSchemaProperty};
use crate::constraints::NormalizedConstraints;
use crate::llm::{complete_structured, CompletionClient};
use crate::nutrition::{EnrichedRecipe, NutritionInfo};

/// Final successful output for one recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealRecommendation {
    pub recipe_id: String,
    pub title: String,
    pub ingredients: Vec<String>,
    pub directions: String,
    pub nutrition: NutritionInfo,
    pub estimated_prep_minutes: u32,
    pub why_it_fits: String,
    #[serde(default)]
    pub ingredient_swaps: Vec<String>,
    /// Pantry items this recipe uses, from the retrieval intersection.
    #[serde(default)]
    pub pantry_utilization: Vec<String>,
}

/// Terminal failure output. Producing this never fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePayload {
    pub error_message: String,
    pub suggestions: Vec<String>,
    pub conflicting_constraints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExplanationDraft {
    why_it_fits: String,
    #[serde(default)]
    ingredient_swaps: Vec<String>,
}

/// Deterministic explanation built from the computed numbers alone.
fn fallback_explanation(recipe: &EnrichedRecipe, constraints: &NormalizedConstraints) -> String {
    let n = recipe.nutrition;
    let mut text = format!(
        "{} provides {} kcal with {} g protein, {} g carbs and {} g fat",
        recipe.candidate.recipe.title, n.calories, n.protein, n.carbs, n.fat
    );
    if let Some(range) = &constraints.calorie_range {
        text.push_str(&format!(", inside your {}-{} kcal target", range.min, range.max));
    }
    if let Some(diet) = &constraints.diet_type {
        text.push_str(&format!(" and compatible with a {diet} diet"));
    }
    text.push('.');
    text
}

/// Scans free text for calorie figures ("650 kcal", "650 calories") and
/// reports whether any of them disagree with the computed total by more
/// than 15%.
fn contradicts_calories(text: &str, computed: u32) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for window in tokens.windows(2) {
        let unit = window[1]
            .trim_matches(|c: char| !c.is_ascii_alphabetic())
            .to_lowercase();
        if unit != "kcal" && unit != "calories" && unit != "calorie" {
            continue;
        }
        let number: String = window[0].chars().filter(|c| c.is_ascii_digit()).collect();
        if let Ok(claimed) = number.parse::<f32>() {
            let computed = computed as f32;
            if computed > 0.0 && (claimed - computed).abs() / computed > 0.15 {
                return true;
            }
        }
    }
    false
}

const EXPLAINER_SYSTEM_PROMPT: &str = "/no_thinking
You are a nutrition coach explaining why a recipe fits a user's request. You are \
given the recipe and its COMPUTED nutrition totals; treat those numbers as ground \
truth and never invent different ones. Write two or three sentences on why it fits \
the constraints, and optionally suggest ingredient swaps that respect the user's \
exclusions. Respond ONLY with a JSON object matching the provided schema.";

/// Turns the top enriched recipe into the final recommendation.
pub struct ExplanationGenerator<'a> {
    client: &'a dyn CompletionClient,
}

impl<'a> ExplanationGenerator<'a> {
    pub fn new(client: &'a dyn CompletionClient) -> Self {
        Self { client }
    }

    fn schema() -> JsonSchemaDefinition {
        object_schema(
            "recommendation_explanation",
            vec![
                (
                    "why_it_fits",
                    JsonSchemaProperty::string(
                        "Two to three sentences grounded in the computed nutrition.",
                    ),
                ),
                (
                    "ingredient_swaps",
                    JsonSchemaProperty::string_array(
                        "Optional ingredient substitutions respecting the exclusions.",
                    ),
                ),
            ],
            &["why_it_fits"],
        )
    }

    pub async fn explain(
        &self,
        top: &EnrichedRecipe,
        constraints: &NormalizedConstraints,
    ) -> MealRecommendation {
        let recipe = &top.candidate.recipe;
        let user_prompt = format!(
            "Recipe: {}\nIngredients:\n{}\nComputed nutrition: {} kcal, {} g protein, \
             {} g carbs, {} g fat. Estimated prep: {} minutes.\n\nUser constraints:\n{}\n\n\
             Explain why this recipe fits.",
            recipe.title,
            recipe.ingredients.join("\n"),
            top.nutrition.calories,
            top.nutrition.protein,
            top.nutrition.carbs,
            top.nutrition.fat,
            top.estimated_prep_minutes,
            serde_json::to_string_pretty(constraints).unwrap_or_else(|_| "{}".to_string()),
        );

        let (why_it_fits, ingredient_swaps) = match complete_structured::<ExplanationDraft>(
            self.client,
            EXPLAINER_SYSTEM_PROMPT,
            &user_prompt,
            &Self::schema(),
        )
        .await
        {
            Ok(draft) if !contradicts_calories(&draft.why_it_fits, top.nutrition.calories) => {
                (draft.why_it_fits, draft.ingredient_swaps)
            }
            Ok(draft) => {
                warn!(
                    recipe = %recipe.title,
                    "explanation contradicts computed calories, using fallback text"
                );
                (fallback_explanation(top, constraints), draft.ingredient_swaps)
            }
            Err(e) => {
                warn!(error = %e, "explanation model failed twice, using fallback text");
                (fallback_explanation(top, constraints), Vec::new())
            }
        };

        info!(recipe = %recipe.title, "recommendation explained");
        MealRecommendation {
            recipe_id: recipe.id.clone(),
            title: recipe.title.clone(),
            ingredients: recipe.ingredients.clone(),
            directions: recipe.directions.clone(),
            nutrition: top.nutrition,
            estimated_prep_minutes: top.estimated_prep_minutes,
            why_it_fits,
            ingredient_swaps,
            pantry_utilization: top.candidate.pantry_hits.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FailureDraft {
    error_message: String,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    conflicting_constraints: Vec<String>,
}

/// Which constraint dimensions were active, and therefore candidates for
/// the conflict list when nothing satisfied them.
fn active_dimensions(constraints: &NormalizedConstraints) -> Vec<String> {
    let mut dims = Vec::new();
    if constraints.calorie_range.is_some() {
        dims.push("calorie_range".to_string());
    }
    if constraints.macro_targets.is_some() {
        dims.push("macro_targets".to_string());
    }
    if constraints.diet_type.is_some() {
        dims.push("diet_type".to_string());
    }
    if !constraints.excluded_ingredients.is_empty() {
        dims.push("excluded_ingredients".to_string());
    }
    if constraints.prep_time_max_minutes.is_some() {
        dims.push("prep_time".to_string());
    }
    dims
}

fn fallback_failure(
    constraints: &NormalizedConstraints,
    relaxation_log: &[String],
    retry_count: u32,
) -> FailurePayload {
    let mut suggestions = vec![
        "Try widening the calorie range further.".to_string(),
        "Remove one macro target and search again.".to_string(),
    ];
    for applied in relaxation_log {
        suggestions.push(format!("Already tried: {applied}."));
    }
    FailurePayload {
        error_message: format!(
            "No recipes satisfied your constraints after {retry_count} relaxation attempts."
        ),
        suggestions,
        conflicting_constraints: active_dimensions(constraints),
    }
}

const FAILURE_SYSTEM_PROMPT: &str = "/no_thinking
You are a helpful nutrition assistant. A recipe search exhausted its retry budget \
without finding anything. Given the constraints and the relaxations already applied, \
write a short apologetic error message, two or three actionable suggestions, and \
name the constraint dimensions most likely in conflict. Never suggest removing an \
allergy or diet restriction. Respond ONLY with a JSON object matching the provided \
schema.";

/// Produces the terminal failure payload. Falls back to a deterministic
/// message so this step can never itself fail.
pub struct FailureReporter<'a> {
    client: &'a dyn CompletionClient,
}

impl<'a> FailureReporter<'a> {
    pub fn new(client: &'a dyn CompletionClient) -> Self {
        Self { client }
    }

    fn schema() -> JsonSchemaDefinition {
        object_schema(
            "failure_report",
            vec![
                (
                    "error_message",
                    JsonSchemaProperty::string("Short, user-facing explanation of the failure."),
                ),
                (
                    "suggestions",
                    JsonSchemaProperty::string_array("Actionable ways to loosen the request."),
                ),
                (
                    "conflicting_constraints",
                    JsonSchemaProperty::string_array(
                        "Constraint dimensions that most likely conflict.",
                    ),
                ),
            ],
            &["error_message", "suggestions"],
        )
    }

    pub async fn report(
        &self,
        constraints: &NormalizedConstraints,
        relaxation_log: &[String],
        retry_count: u32,
    ) -> FailurePayload {
        let user_prompt = format!(
            "Constraints:\n{}\n\nRelaxations already applied:\n{}\n\nRetries used: {}.\n\n\
             Produce the failure report.",
            serde_json::to_string_pretty(constraints).unwrap_or_else(|_| "{}".to_string()),
            if relaxation_log.is_empty() {
                "(none)".to_string()
            } else {
                relaxation_log.join("\n")
            },
            retry_count,
        );

        match complete_structured::<FailureDraft>(
            self.client,
            FAILURE_SYSTEM_PROMPT,
            &user_prompt,
            &Self::schema(),
        )
        .await
        {
            Ok(draft) if !draft.error_message.trim().is_empty() => FailurePayload {
                error_message: draft.error_message,
                suggestions: if draft.suggestions.is_empty() {
                    fallback_failure(constraints, relaxation_log, retry_count).suggestions
                } else {
                    draft.suggestions
                },
                conflicting_constraints: if draft.conflicting_constraints.is_empty() {
                    active_dimensions(constraints)
                } else {
                    draft.conflicting_constraints
                },
            },
            Ok(_) => fallback_failure(constraints, relaxation_log, retry_count),
            Err(e) => {
                warn!(error = %e, "failure reporter model failed twice, using fallback report");
                fallback_failure(constraints, relaxation_log, retry_count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use crate::constraints::CalorieRange;
    use crate::corpus::Recipe;
    use crate::retrieval::RetrievedCandidate;
    use async_trait::async_trait;

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

    fn enriched(calories: u32) -> EnrichedRecipe {
        EnrichedRecipe {
            candidate: RetrievedCandidate {
                recipe: Recipe {
                    id: "7".to_string(),
                    title: "Chickpea Bowl".to_string(),
                    ingredients: vec!["1 can chickpeas".to_string()],
                    directions: "Combine and serve.".to_string(),
                    ner: vec!["chickpeas".to_string()],
                    source: None,
                    link: None,
                },
                semantic_score: 0.8,
                pantry_match_score: 1.0,
                pantry_hits: vec!["chickpeas".to_string()],
                combined_score: 0.9,
            },
            parsed_ingredients: vec![],
            nutrition: NutritionInfo {
                calories,
                protein: 20,
                carbs: 80,
                fat: 10,
            },
            estimated_prep_minutes: 15,
            unresolved_ingredients: vec![],
        }
    }

    fn constraints() -> NormalizedConstraints {
        NormalizedConstraints {
            calorie_range: Some(CalorieRange { min: 650, max: 750 }),
            macro_targets: None,
            diet_type: Some("vegan".to_string()),
            excluded_ingredients: Default::default(),
            prep_time_max_minutes: None,
            custom_constraints: Default::default(),
            semantic_query: "vegan bowl".to_string(),
        }
    }

    #[tokio::test]
    async fn consistent_explanation_is_kept() {
        let client = FixedClient(
            r#"{"why_it_fits":"At about 700 kcal this bowl lands inside your range.","ingredient_swaps":["swap rice for quinoa"]}"#
                .to_string(),
        );
        let generator = ExplanationGenerator::new(&client);
        let rec = generator.explain(&enriched(700), &constraints()).await;
        assert!(rec.why_it_fits.contains("700 kcal"));
        assert_eq!(rec.ingredient_swaps.len(), 1);
        assert_eq!(rec.pantry_utilization, vec!["chickpeas".to_string()]);
    }

    #[tokio::test]
    async fn contradictory_calorie_claim_is_replaced() {
        let client = FixedClient(
            r#"{"why_it_fits":"This light bowl has only 200 kcal, perfect for you."}"#.to_string(),
        );
        let generator = ExplanationGenerator::new(&client);
        let rec = generator.explain(&enriched(700), &constraints()).await;
        assert!(rec.why_it_fits.contains("700 kcal"));
        assert!(rec.why_it_fits.contains("650-750"));
    }

    #[tokio::test]
    async fn broken_explainer_still_yields_recommendation() {
        let client = FixedClient("not json".to_string());
        let generator = ExplanationGenerator::new(&client);
        let rec = generator.explain(&enriched(700), &constraints()).await;
        assert!(rec.why_it_fits.contains("Chickpea Bowl"));
        assert!(rec.why_it_fits.contains("vegan"));
    }

    #[test]
    fn calorie_contradiction_detection() {
        assert!(contradicts_calories("only 200 kcal here", 700));
        assert!(!contradicts_calories("about 680 kcal total", 700));
        assert!(!contradicts_calories("no figures at all", 700));
    }

    #[tokio::test]
    async fn failure_reporter_never_fails() {
        let client = FixedClient("garbage".to_string());
        let reporter = FailureReporter::new(&client);
        let log = vec!["widened calorie range from 300-350 to 200-450".to_string()];
        let payload = reporter.report(&constraints(), &log, 2).await;
        assert!(payload.error_message.contains("2 relaxation attempts"));
        assert!(!payload.suggestions.is_empty());
        assert!(payload
            .conflicting_constraints
            .contains(&"calorie_range".to_string()));
    }

    #[tokio::test]
    async fn failure_reporter_uses_model_message_when_valid() {
        let client = FixedClient(
            r#"{"error_message":"Nothing fit the 300-350 kcal window.","suggestions":["Allow up to 500 kcal"],"conflicting_constraints":["calorie_range"]}"#
                .to_string(),
        );
        let reporter = FailureReporter::new(&client);
        let payload = reporter.report(&constraints(), &[], 2).await;
        assert_eq!(payload.error_message, "Nothing fit the 300-350 kcal window.");
        assert_eq!(payload.suggestions, vec!["Allow up to 500 kcal".to_string()]);
    }
}
