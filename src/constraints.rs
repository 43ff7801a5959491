use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;

/// Macro gram targets (per meal).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct MacroTargets {
    pub protein: Option<u32>,
    pub carbs: Option<u32>,
    pub fat: Option<u32>,
}

impl MacroTargets {
    pub fn is_empty(&self) -> bool {
        self.protein.is_none() && self.carbs.is_none() && self.fat.is_none()
    }
}

/// Prep-time category as the client sends it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrepTimeCategory {
    Quick,
    Medium,
    Long,
}

impl PrepTimeCategory {
    /// Minute ceiling per category; `Long` is unbounded.
    pub fn max_minutes(self) -> Option<u32> {
        match self {
            PrepTimeCategory::Quick => Some(30),
            PrepTimeCategory::Medium => Some(60),
            PrepTimeCategory::Long => None,
        }
    }
}

/// Explicit constraints from the client, UI filters or chat-parsed.
/// Calorie fields are signed so malformed input can be rejected here rather
/// than silently truncated upstream.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FilterConstraints {
    pub calories: Option<i64>,
    /// Explicit [min, max]; takes precedence over the point target.
    pub calorie_range: Option<[i64; 2]>,
    pub macros: Option<MacroTargets>,
    pub diet: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    pub prep_time: Option<PrepTimeCategory>,
    pub meal_type: Option<String>,
    #[serde(default)]
    pub custom_constraints: BTreeMap<String, String>,
}

/// Pantry context; not a hard constraint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PantryItem {
    pub name: String,
    pub category: Option<String>,
    #[serde(default = "default_confirmed")]
    pub confirmed: bool,
}

fn default_confirmed() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Full workflow input, consumed once at entry.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MealRecommendationRequest {
    pub user_query: String,
    #[serde(default)]
    pub constraints: FilterConstraints,
    #[serde(default)]
    pub pantry_items: Vec<PantryItem>,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
}

impl Default for PantryItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: None,
            confirmed: true,
        }
    }
}

/// Closed calorie interval. Invariant: `min <= max`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CalorieRange {
    pub min: u32,
    pub max: u32,
}

impl CalorieRange {
    pub fn new(min: u32, max: u32) -> Result<Self, WorkflowError> {
        if min > max {
            return Err(WorkflowError::InvalidConstraint(format!(
                "calorie range lower bound {} exceeds upper bound {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, calories: u32) -> bool {
        calories >= self.min && calories <= self.max
    }

    /// Widens both sides by `step`, clamping the lower bound at zero.
    pub fn widened(&self, step: u32) -> Self {
        Self {
            min: self.min.saturating_sub(step),
            max: self.max.saturating_add(step),
        }
    }
}

/// Canonical constraints. Produced by [`normalize_constraints`], read-only
/// afterwards; relaxation clones into a new value rather than mutating.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NormalizedConstraints {
    pub calorie_range: Option<CalorieRange>,
    pub macro_targets: Option<MacroTargets>,
    pub diet_type: Option<String>,
    /// Case-normalized, deduplicated. Never relaxed.
    pub excluded_ingredients: BTreeSet<String>,
    pub prep_time_max_minutes: Option<u32>,
    pub custom_constraints: BTreeMap<String, String>,
    pub semantic_query: String,
}

const CUISINE_KEYWORDS: &[&str] = &[
    "italian",
    "mexican",
    "indian",
    "thai",
    "chinese",
    "japanese",
    "french",
    "greek",
    "mediterranean",
    "korean",
    "vietnamese",
    "spanish",
    "moroccan",
];

const MEAL_TYPE_KEYWORDS: &[&str] = &["breakfast", "lunch", "dinner", "snack", "dessert"];

const MOOD_KEYWORDS: &[&str] = &[
    "spicy", "comfort", "light", "hearty", "fresh", "creamy", "crunchy", "warming",
];

fn find_keyword(text: &str, keywords: &[&str]) -> Option<String> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .find(|k| lower.contains(*k))
        .map(|k| k.to_string())
}

fn validate_positive(value: i64, what: &str) -> Result<u32, WorkflowError> {
    if value <= 0 {
        return Err(WorkflowError::InvalidConstraint(format!(
            "{} must be positive, got {}",
            what, value
        )));
    }
    u32::try_from(value)
        .map_err(|_| WorkflowError::InvalidConstraint(format!("{} out of range: {}", what, value)))
}

/// Turns a raw request into canonical constraints.
///
/// Pure and deterministic: a point calorie target becomes a symmetric
/// window (no-op when a range is already supplied), prep-time categories
/// map to minute ceilings, exclusions are lowercased and deduplicated, and
/// cuisine/meal-type/mood terms are mined from the query and recent chat
/// turns into `custom_constraints`. Fails only on structurally invalid
/// input, which is fatal and never retried.
pub fn normalize_constraints(
    request: &MealRecommendationRequest,
    config: &WorkflowConfig,
) -> Result<NormalizedConstraints, WorkflowError> {
    let explicit = &request.constraints;

    let calorie_range = match (explicit.calorie_range, explicit.calories) {
        (Some([min, max]), _) => Some(CalorieRange::new(
            validate_positive(min, "calorie range minimum")?,
            validate_positive(max, "calorie range maximum")?,
        )?),
        (None, Some(target)) => {
            let target = validate_positive(target, "calorie target")?;
            Some(CalorieRange {
                min: target.saturating_sub(config.calorie_half_width),
                max: target.saturating_add(config.calorie_half_width),
            })
        }
        (None, None) => None,
    };

    let macro_targets = explicit.macros.clone().filter(|m| !m.is_empty());

    let excluded_ingredients: BTreeSet<String> = explicit
        .allergies
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();

    // Mine free text, then the latest user turns, for implicit constraints.
    let mut mined_text = request.user_query.clone();
    for turn in request.chat_history.iter().rev().take(4) {
        if turn.role == "user" {
            mined_text.push(' ');
            mined_text.push_str(&turn.content);
        }
    }

    let mut custom_constraints = explicit.custom_constraints.clone();
    if let Some(cuisine) = find_keyword(&mined_text, CUISINE_KEYWORDS) {
        custom_constraints.entry("cuisine".to_string()).or_insert(cuisine);
    }
    if let Some(meal_type) = explicit
        .meal_type
        .clone()
        .map(|m| m.to_lowercase())
        .or_else(|| find_keyword(&mined_text, MEAL_TYPE_KEYWORDS))
    {
        custom_constraints
            .entry("meal_type".to_string())
            .or_insert(meal_type);
    }
    if let Some(mood) = find_keyword(&mined_text, MOOD_KEYWORDS) {
        custom_constraints.entry("mood".to_string()).or_insert(mood);
    }

    let diet_type = explicit
        .diet
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_lowercase);

    // Search string: user text plus the extracted qualifiers and diet tag.
    let mut query_terms: Vec<String> = vec![request.user_query.trim().to_string()];
    for key in ["cuisine", "meal_type", "mood"] {
        if let Some(term) = custom_constraints.get(key) {
            if !request.user_query.to_lowercase().contains(term.as_str()) {
                query_terms.push(term.clone());
            }
        }
    }
    if let Some(diet) = &diet_type {
        if !request.user_query.to_lowercase().contains(diet.as_str()) {
            query_terms.push(diet.clone());
        }
    }
    let semantic_query = query_terms
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(NormalizedConstraints {
        calorie_range,
        macro_targets,
        diet_type,
        excluded_ingredients,
        prep_time_max_minutes: explicit.prep_time.and_then(PrepTimeCategory::max_minutes),
        custom_constraints,
        semantic_query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(constraints: FilterConstraints, query: &str) -> MealRecommendationRequest {
        MealRecommendationRequest {
            user_query: query.to_string(),
            constraints,
            pantry_items: vec![],
            chat_history: vec![],
        }
    }

    #[test]
    fn point_target_becomes_symmetric_range() {
        let config = WorkflowConfig::default();
        let req = request_with(
            FilterConstraints {
                calories: Some(700),
                ..Default::default()
            },
            "dinner",
        );
        let normalized = normalize_constraints(&req, &config).unwrap();
        assert_eq!(
            normalized.calorie_range,
            Some(CalorieRange { min: 650, max: 750 })
        );
    }

    #[test]
    fn explicit_range_wins_over_point_target() {
        let config = WorkflowConfig::default();
        let req = request_with(
            FilterConstraints {
                calories: Some(700),
                calorie_range: Some([600, 800]),
                ..Default::default()
            },
            "dinner",
        );
        let normalized = normalize_constraints(&req, &config).unwrap();
        assert_eq!(
            normalized.calorie_range,
            Some(CalorieRange { min: 600, max: 800 })
        );
    }

    #[test]
    fn negative_calorie_target_is_fatal() {
        let config = WorkflowConfig::default();
        let req = request_with(
            FilterConstraints {
                calories: Some(-200),
                ..Default::default()
            },
            "anything",
        );
        let err = normalize_constraints(&req, &config).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidConstraint(_)));
    }

    #[test]
    fn inverted_range_is_fatal() {
        let config = WorkflowConfig::default();
        let req = request_with(
            FilterConstraints {
                calorie_range: Some([800, 600]),
                ..Default::default()
            },
            "anything",
        );
        assert!(normalize_constraints(&req, &config).is_err());
    }

    #[test]
    fn exclusions_are_lowercased_and_deduplicated() {
        let config = WorkflowConfig::default();
        let req = request_with(
            FilterConstraints {
                allergies: vec![
                    "Peanuts".to_string(),
                    "peanuts ".to_string(),
                    "Shellfish".to_string(),
                    "".to_string(),
                ],
                ..Default::default()
            },
            "dinner",
        );
        let normalized = normalize_constraints(&req, &config).unwrap();
        let expected: BTreeSet<String> =
            ["peanuts", "shellfish"].iter().map(|s| s.to_string()).collect();
        assert_eq!(normalized.excluded_ingredients, expected);
    }

    #[test]
    fn prep_time_categories_map_to_minutes() {
        let config = WorkflowConfig::default();
        for (category, expected) in [
            (PrepTimeCategory::Quick, Some(30)),
            (PrepTimeCategory::Medium, Some(60)),
            (PrepTimeCategory::Long, None),
        ] {
            let req = request_with(
                FilterConstraints {
                    prep_time: Some(category),
                    ..Default::default()
                },
                "dinner",
            );
            let normalized = normalize_constraints(&req, &config).unwrap();
            assert_eq!(normalized.prep_time_max_minutes, expected);
        }
    }

    #[test]
    fn mines_cuisine_and_mood_from_query_and_chat() {
        let config = WorkflowConfig::default();
        let mut req = request_with(FilterConstraints::default(), "something spicy for dinner");
        req.chat_history = vec![
            ChatTurn {
                role: "assistant".to_string(),
                content: "How about italian food?".to_string(),
            },
            ChatTurn {
                role: "user".to_string(),
                content: "I love thai flavors".to_string(),
            },
        ];
        let normalized = normalize_constraints(&req, &config).unwrap();
        assert_eq!(normalized.custom_constraints.get("mood").unwrap(), "spicy");
        assert_eq!(normalized.custom_constraints.get("cuisine").unwrap(), "thai");
        assert_eq!(
            normalized.custom_constraints.get("meal_type").unwrap(),
            "dinner"
        );
        assert!(normalized.semantic_query.contains("thai"));
    }

    #[test]
    fn semantic_query_appends_diet_when_absent_from_text() {
        let config = WorkflowConfig::default();
        let req = request_with(
            FilterConstraints {
                diet: Some("Vegan".to_string()),
                ..Default::default()
            },
            "high protein bowl",
        );
        let normalized = normalize_constraints(&req, &config).unwrap();
        assert_eq!(normalized.diet_type.as_deref(), Some("vegan"));
        assert!(normalized.semantic_query.contains("vegan"));
    }

    /// Round-tripping a normalized output through the same mapping changes
    /// nothing.
    #[test]
    fn normalization_is_idempotent() {
        let config = WorkflowConfig::default();
        let first = normalize_constraints(
            &request_with(
                FilterConstraints {
                    calories: Some(700),
                    diet: Some("VEGAN".to_string()),
                    allergies: vec!["Peanuts".to_string(), "peanuts".to_string()],
                    prep_time: Some(PrepTimeCategory::Quick),
                    ..Default::default()
                },
                "spicy thai curry",
            ),
            &config,
        )
        .unwrap();

        // Re-express the normalized result as a request and normalize again.
        let range = first.calorie_range.unwrap();
        let round_trip_request = request_with(
            FilterConstraints {
                calorie_range: Some([i64::from(range.min), i64::from(range.max)]),
                diet: first.diet_type.clone(),
                allergies: first.excluded_ingredients.iter().cloned().collect(),
                prep_time: Some(PrepTimeCategory::Quick),
                custom_constraints: first.custom_constraints.clone(),
                ..Default::default()
            },
            "spicy thai curry",
        );
        let second = normalize_constraints(&round_trip_request, &config).unwrap();
        assert_eq!(first, second);
    }
}
