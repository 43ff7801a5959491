use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Recipe record from a RecipeNLG-shaped corpus file. Immutable; owned by
/// the corpus index.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Recipe {
    pub id: String,
    pub title: String,
    /// Raw ingredient lines, e.g. `"1 c. firmly packed brown sugar"`.
    pub ingredients: Vec<String>,
    pub directions: String,
    /// Named-entity ingredient tags precomputed by the corpus pipeline,
    /// used for diet/exclusion filtering without re-parsing free text.
    pub ner: Vec<String>,
    pub source: Option<String>,
    pub link: Option<String>,
}

const TITLE_COL: &str = "title";
const INGREDIENTS_COL: &str = "ingredients";
const DIRECTIONS_COL: &str = "directions";
const NER_COL: &str = "NER";
const SOURCE_COL: &str = "source";
const LINK_COL: &str = "link";

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| anyhow::anyhow!("Column '{}' not found in corpus CSV", name))
}

/// RecipeNLG stores list columns as JSON-encoded string arrays.
fn parse_list_cell(cell: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(cell).unwrap_or_else(|_| {
        if cell.trim().is_empty() {
            Vec::new()
        } else {
            vec![cell.trim().to_string()]
        }
    })
}

/// Loads the recipe corpus from CSV. Rows with an empty title are skipped;
/// an entirely empty corpus is an error since nothing downstream can work.
pub fn load_recipe_corpus(csv_path: &Path) -> Result<Vec<Recipe>> {
    if !csv_path.exists() {
        anyhow::bail!("Recipe corpus CSV not found at: {:?}", csv_path);
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open recipe corpus at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = rdr.headers()?.clone();
    let title_idx = column_index(&headers, TITLE_COL)?;
    let ingredients_idx = column_index(&headers, INGREDIENTS_COL)?;
    let directions_idx = column_index(&headers, DIRECTIONS_COL)?;
    let ner_idx = column_index(&headers, NER_COL)?;
    let source_idx = headers.iter().position(|h| h == SOURCE_COL);
    let link_idx = headers.iter().position(|h| h == LINK_COL);

    let mut recipes = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record =
            result.with_context(|| format!("Failed to read corpus row {}", row_index))?;

        let title = record
            .get(title_idx)
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() {
            continue;
        }

        let directions = parse_list_cell(record.get(directions_idx).unwrap_or_default())
            .join("\n");

        recipes.push(Recipe {
            id: row_index.to_string(),
            title,
            ingredients: parse_list_cell(record.get(ingredients_idx).unwrap_or_default()),
            directions,
            ner: parse_list_cell(record.get(ner_idx).unwrap_or_default()),
            source: source_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            link: link_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        });
    }

    if recipes.is_empty() {
        anyhow::bail!("No valid recipes loaded from {:?}", csv_path);
    }
    debug!(count = recipes.len(), "loaded recipe corpus");
    Ok(recipes)
}

impl Recipe {
    /// Text embedded for semantic retrieval: title plus NER tags gives a
    /// compact, ingredient-aware representation.
    pub fn embedding_text(&self) -> String {
        if self.ner.is_empty() {
            self.title.clone()
        } else {
            format!("{}: {}", self.title, self.ner.join(", "))
        }
    }
}
