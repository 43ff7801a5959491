use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use tracing::debug;

/// Nutrient content per 100 g of an ingredient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutrientProfile {
    pub calories: f32,
    pub protein: f32,
    pub carbs: f32,
    pub fat: f32,
}

impl NutrientProfile {
    /// Scales the per-100g profile to an actual quantity in grams.
    pub fn scaled(&self, grams: f32) -> NutrientProfile {
        let factor = grams / 100.0;
        NutrientProfile {
            calories: self.calories * factor,
            protein: self.protein * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
        }
    }
}

/// Maps an ingredient name to its per-100g nutrient profile. `None` means
/// the ingredient is unknown; callers decide how many unknowns they accept.
pub trait NutritionResolver: Send + Sync {
    fn resolve(&self, ingredient: &str) -> Option<NutrientProfile>;
}

/// Resolver backed by a flat CSV table with columns
/// `name,calories,protein,carbs,fat` (values per 100 g).
pub struct TableResolver {
    entries: Vec<(String, NutrientProfile)>,
}

impl TableResolver {
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open nutrition table {}", path.display()))?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = reader.headers()?.clone();
        let col = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| anyhow!("nutrition table missing column '{name}'"))
        };
        let name_col = col("name")?;
        let cal_col = col("calories")?;
        let protein_col = col("protein")?;
        let carbs_col = col("carbs")?;
        let fat_col = col("fat")?;

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let name = record
                .get(name_col)
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            if name.is_empty() {
                continue;
            }
            let field = |idx: usize| -> f32 {
                record
                    .get(idx)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0.0)
            };
            entries.push((
                name,
                NutrientProfile {
                    calories: field(cal_col),
                    protein: field(protein_col),
                    carbs: field(carbs_col),
                    fat: field(fat_col),
                },
            ));
        }
        if entries.is_empty() {
            return Err(anyhow!(
                "nutrition table {} contains no usable rows",
                path.display()
            ));
        }
        debug!(entries = entries.len(), "nutrition table loaded");
        Ok(Self { entries })
    }

    #[cfg(test)]
    pub fn from_entries(entries: Vec<(String, NutrientProfile)>) -> Self {
        Self { entries }
    }
}

impl NutritionResolver for TableResolver {
    /// Exact match first, then the longest table name that fuzzily matches
    /// the query in either direction, so "chopped onions" still finds
    /// "onion".
    fn resolve(&self, ingredient: &str) -> Option<NutrientProfile> {
        let query = ingredient.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        if let Some((_, profile)) = self.entries.iter().find(|(name, _)| *name == query) {
            return Some(*profile);
        }
        self.entries
            .iter()
            .filter(|(name, _)| {
                crate::retrieval::fuzzy_contains(&query, name)
                    || crate::retrieval::fuzzy_contains(name, &query)
            })
            .max_by_key(|(name, _)| name.len())
            .map(|(_, profile)| *profile)
    }
}

/// Memoizes resolved, scaled nutrient contributions per ingredient line.
/// Entries are immutable; stale ones are recomputed after the TTL lapses.
pub struct NutritionCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Option<NutrientProfile>)>>,
}

impl NutritionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(ingredient: &str, quantity: f32, unit: &str) -> String {
        format!("{ingredient}|{quantity:.3}|{unit}")
    }

    /// Looks up a scaled contribution, computing and caching it on a miss.
    pub fn resolve_scaled(
        &self,
        resolver: &dyn NutritionResolver,
        ingredient: &str,
        quantity: f32,
        unit: &str,
        grams: f32,
    ) -> Option<NutrientProfile> {
        let key = Self::key(ingredient, quantity, unit);
        {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((stored_at, value)) = entries.get(&key) {
                if stored_at.elapsed() < self.ttl {
                    return *value;
                }
            }
        }
        let value = resolver.resolve(ingredient).map(|p| p.scaled(grams));
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, (Instant::now(), value));
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    fn profile(calories: f32) -> NutrientProfile {
        NutrientProfile {
            calories,
            protein: 10.0,
            carbs: 20.0,
            fat: 5.0,
        }
    }

    #[test]
    fn loads_table_from_csv_and_resolves_exact() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "name,calories,protein,carbs,fat").unwrap();
        writeln!(file, "rice,130,2.7,28,0.3").unwrap();
        writeln!(file, "chickpeas,164,8.9,27.4,2.6").unwrap();
        file.flush().unwrap();

        let resolver = TableResolver::from_csv(file.path()).unwrap();
        let rice = resolver.resolve("rice").unwrap();
        assert!((rice.calories - 130.0).abs() < 1e-3);
        assert!(resolver.resolve("dragon fruit jam").is_none());
    }

    #[test]
    fn fuzzy_resolution_prefers_longest_name() {
        let resolver = TableResolver::from_entries(vec![
            ("butter".to_string(), profile(717.0)),
            ("peanut butter".to_string(), profile(588.0)),
        ]);
        let hit = resolver.resolve("2 tbsp peanut butter").unwrap();
        assert!((hit.calories - 588.0).abs() < 1e-3);
    }

    #[test]
    fn scaling_is_per_100g() {
        let scaled = profile(200.0).scaled(50.0);
        assert!((scaled.calories - 100.0).abs() < 1e-3);
        assert!((scaled.protein - 5.0).abs() < 1e-3);
    }

    #[test]
    fn cache_avoids_repeat_lookups() {
        struct CountingResolver(AtomicUsize);
        impl NutritionResolver for CountingResolver {
            fn resolve(&self, _ingredient: &str) -> Option<NutrientProfile> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Some(profile(100.0))
            }
        }

        let resolver = CountingResolver(AtomicUsize::new(0));
        let cache = NutritionCache::new(Duration::from_secs(60));
        for _ in 0..3 {
            let hit = cache
                .resolve_scaled(&resolver, "rice", 1.0, "cup", 240.0)
                .unwrap();
            assert!((hit.calories - 240.0).abs() < 1e-3);
        }
        assert_eq!(resolver.0.load(Ordering::SeqCst), 1);

        // A different quantity is a different cache entry.
        cache.resolve_scaled(&resolver, "rice", 2.0, "cup", 480.0);
        assert_eq!(resolver.0.load(Ordering::SeqCst), 2);
    }
}
