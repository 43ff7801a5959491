pub mod index;
pub mod recipe;
pub mod vector_db;

pub use index::RecipeCorpus;
pub use recipe::{load_recipe_corpus, Recipe};
