use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::WorkflowConfig;
use crate::constraints::NormalizedConstraints;
use crate::nutrition::parse::{parse_ingredient_line, quantity_in_grams, ParsedIngredient};
use crate::nutrition::resolver::{NutritionCache, NutritionResolver};
use crate::retrieval::RetrievedCandidate;

/// Whole-recipe nutrition totals, rounded to integers for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: u32,
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
}

/// A retrieval candidate that survived nutrition checks.
#[derive(Debug, Clone)]
pub struct EnrichedRecipe {
    pub candidate: RetrievedCandidate,
    pub parsed_ingredients: Vec<ParsedIngredient>,
    pub nutrition: NutritionInfo,
    pub estimated_prep_minutes: u32,
    /// Ingredient lines the resolver could not account for.
    pub unresolved_ingredients: Vec<String>,
}

/// Rough preparation time from the length of the directions text. Longer
/// directions never estimate shorter.
pub fn estimate_prep_minutes(directions: &str) -> u32 {
    let words = directions.split_whitespace().count() as u32;
    (10 + words / 15).min(180)
}

fn within_tolerance(actual: f32, target: u32, tolerance: f32) -> bool {
    let target = target as f32;
    actual >= target * (1.0 - tolerance) && actual <= target * (1.0 + tolerance)
}

/// Computes nutrition for retrieval candidates and drops the ones that miss
/// the constraints.
pub struct NutritionEnricher<'a> {
    resolver: &'a dyn NutritionResolver,
    cache: &'a NutritionCache,
    config: &'a WorkflowConfig,
}

impl<'a> NutritionEnricher<'a> {
    pub fn new(
        resolver: &'a dyn NutritionResolver,
        cache: &'a NutritionCache,
        config: &'a WorkflowConfig,
    ) -> Self {
        Self {
            resolver,
            cache,
            config,
        }
    }

    /// Sums per-ingredient contributions for one candidate. Returns `None`
    /// when too many ingredient lines could not be resolved to trust the
    /// total.
    fn enrich_one(&self, candidate: &RetrievedCandidate) -> Option<EnrichedRecipe> {
        let lines = &candidate.recipe.ingredients;
        if lines.is_empty() {
            return None;
        }

        let mut calories = 0.0f32;
        let mut protein = 0.0f32;
        let mut carbs = 0.0f32;
        let mut fat = 0.0f32;
        let mut unresolved = Vec::new();
        let mut parsed_ingredients = Vec::with_capacity(lines.len());

        for line in lines {
            let parsed = parse_ingredient_line(line);
            let grams = quantity_in_grams(&parsed);
            match self.cache.resolve_scaled(
                self.resolver,
                &parsed.ingredient,
                parsed.quantity,
                &parsed.unit,
                grams,
            ) {
                Some(contribution) => {
                    calories += contribution.calories;
                    protein += contribution.protein;
                    carbs += contribution.carbs;
                    fat += contribution.fat;
                }
                None => unresolved.push(line.clone()),
            }
            parsed_ingredients.push(parsed);
        }

        let unresolved_fraction = unresolved.len() as f32 / lines.len() as f32;
        if unresolved_fraction > self.config.max_unresolved_fraction {
            debug!(
                recipe = %candidate.recipe.title,
                unresolved = unresolved.len(),
                total = lines.len(),
                "dropping recipe with unreliable nutrition"
            );
            return None;
        }

        Some(EnrichedRecipe {
            candidate: candidate.clone(),
            parsed_ingredients,
            nutrition: NutritionInfo {
                calories: calories.round().max(0.0) as u32,
                protein: protein.round().max(0.0) as u32,
                carbs: carbs.round().max(0.0) as u32,
                fat: fat.round().max(0.0) as u32,
            },
            estimated_prep_minutes: estimate_prep_minutes(&candidate.recipe.directions),
            unresolved_ingredients: unresolved,
        })
    }

    fn passes_constraints(&self, enriched: &EnrichedRecipe, constraints: &NormalizedConstraints) -> bool {
        if let Some(range) = &constraints.calorie_range {
            if !range.contains(enriched.nutrition.calories) {
                return false;
            }
        }
        if let Some(macros) = &constraints.macro_targets {
            let tolerance = self.config.macro_tolerance;
            if let Some(target) = macros.protein {
                if !within_tolerance(enriched.nutrition.protein as f32, target, tolerance) {
                    return false;
                }
            }
            if let Some(target) = macros.carbs {
                if !within_tolerance(enriched.nutrition.carbs as f32, target, tolerance) {
                    return false;
                }
            }
            if let Some(target) = macros.fat {
                if !within_tolerance(enriched.nutrition.fat as f32, target, tolerance) {
                    return false;
                }
            }
        }
        if let Some(max_minutes) = constraints.prep_time_max_minutes {
            if enriched.estimated_prep_minutes > max_minutes {
                return false;
            }
        }
        true
    }

    /// Enriches candidates in rank order and keeps those inside the calorie
    /// range, macro tolerances, and prep-time ceiling, up to the configured
    /// cap. An empty result is a normal outcome for the quality gate.
    pub fn enrich(
        &self,
        candidates: &[RetrievedCandidate],
        constraints: &NormalizedConstraints,
    ) -> Vec<EnrichedRecipe> {
        let mut survivors = Vec::new();
        for candidate in candidates {
            if survivors.len() >= self.config.enriched_cap {
                break;
            }
            if let Some(enriched) = self.enrich_one(candidate) {
                if self.passes_constraints(&enriched, constraints) {
                    survivors.push(enriched);
                }
            }
        }
        info!(
            survivors = survivors.len(),
            candidates = candidates.len(),
            "nutrition enrichment complete"
        );
        survivors
    }
}
