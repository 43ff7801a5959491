pub mod enricher;
pub mod parse;
pub mod resolver;

pub use enricher::{EnrichedRecipe, NutritionEnricher, NutritionInfo};
pub use parse::ParsedIngredient;
pub use resolver::{NutritionCache, NutritionResolver, TableResolver};
