/// A raw ingredient line broken into the pieces nutrition lookup needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIngredient {
    pub ingredient: String,
    pub quantity: f32,
    pub unit: String,
    pub modifier: Option<String>,
}

/// Canonical unit spellings; lookup keys are lowercase with trailing dots
/// and plurals stripped.
fn normalize_unit(token: &str) -> Option<&'static str> {
    let cleaned = token.trim_end_matches('.').to_lowercase();
    let cleaned = cleaned.trim_end_matches('s');
    match cleaned {
        "c" | "cup" => Some("cup"),
        "tbsp" | "tablespoon" | "tb" => Some("tbsp"),
        "tsp" | "teaspoon" => Some("tsp"),
        "oz" | "ounce" => Some("oz"),
        "lb" | "pound" => Some("lb"),
        "g" | "gram" | "gr" => Some("g"),
        "kg" | "kilogram" => Some("kg"),
        "ml" | "milliliter" => Some("ml"),
        "l" | "liter" | "litre" => Some("l"),
        "can" | "jar" | "package" | "pkg" | "box" => Some("can"),
        "clove" => Some("clove"),
        "slice" => Some("slice"),
        "pinch" | "dash" => Some("pinch"),
        "serving" => Some("serving"),
        _ => None,
    }
}

/// Parses a numeric token: integer, decimal, or fraction ("1/2").
fn parse_number(token: &str) -> Option<f32> {
    if let Some((num, den)) = token.split_once('/') {
        let num: f32 = num.trim().parse().ok()?;
        let den: f32 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    token.parse().ok()
}

/// Turns a free-form ingredient line like "1 1/2 c. chopped onions" into a
/// structured record. Lines with no leading quantity default to one serving.
/// Parenthetical notes are dropped; a trailing comma clause becomes the
/// modifier ("2 carrots, diced").
pub fn parse_ingredient_line(line: &str) -> ParsedIngredient {
    let mut text = strip_parentheticals(line);

    let modifier = match text.split_once(',') {
        Some((head, tail)) if !tail.trim().is_empty() => {
            let tail = tail.trim().to_string();
            text = head.to_string();
            Some(tail)
        }
        _ => None,
    };

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut quantity: Option<f32> = None;
    let mut idx = 0;

    // Leading quantity, possibly a mixed number ("1 1/2").
    if let Some(first) = tokens.first().and_then(|t| parse_number(t)) {
        quantity = Some(first);
        idx = 1;
        if let Some(second) = tokens.get(1).and_then(|t| parse_number(t)) {
            if tokens[1].contains('/') {
                quantity = Some(first + second);
                idx = 2;
            }
        }
    }

    let mut unit = None;
    if let Some(u) = tokens.get(idx).and_then(|t| normalize_unit(t)) {
        unit = Some(u);
        idx += 1;
    }

    // "of" after a unit carries no information ("1 cup of rice").
    if tokens.get(idx).is_some_and(|t| t.eq_ignore_ascii_case("of")) {
        idx += 1;
    }

    let ingredient = tokens[idx..].join(" ").trim().to_lowercase();

    ParsedIngredient {
        ingredient: if ingredient.is_empty() {
            text.trim().to_lowercase()
        } else {
            ingredient
        },
        quantity: quantity.unwrap_or(1.0),
        unit: unit.unwrap_or("serving").to_string(),
        modifier,
    }
}

fn strip_parentheticals(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    for ch in line.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Approximate grams for a parsed quantity. Volume and count units use
/// standard kitchen conversions; unknown units fall back to a 100 g serving.
pub fn quantity_in_grams(parsed: &ParsedIngredient) -> f32 {
    let per_unit = match parsed.unit.as_str() {
        "g" => 1.0,
        "kg" => 1000.0,
        "oz" => 28.35,
        "lb" => 453.6,
        "cup" => 240.0,
        "tbsp" => 15.0,
        "tsp" => 5.0,
        "ml" => 1.0,
        "l" => 1000.0,
        "pinch" => 0.3,
        // Count-style or unknown units approximate one 100 g serving each.
        _ => 100.0,
    };
    parsed.quantity * per_unit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_quantity_unit_ingredient() {
        let parsed = parse_ingredient_line("2 cups flour");
        assert_eq!(parsed.quantity, 2.0);
        assert_eq!(parsed.unit, "cup");
        assert_eq!(parsed.ingredient, "flour");
        assert_eq!(parsed.modifier, None);
    }

    #[test]
    fn parses_mixed_number_and_dotted_unit() {
        let parsed = parse_ingredient_line("1 1/2 c. sugar");
        assert!((parsed.quantity - 1.5).abs() < 1e-6);
        assert_eq!(parsed.unit, "cup");
        assert_eq!(parsed.ingredient, "sugar");
    }

    #[test]
    fn parses_fraction_only() {
        let parsed = parse_ingredient_line("1/4 tsp. salt");
        assert!((parsed.quantity - 0.25).abs() < 1e-6);
        assert_eq!(parsed.unit, "tsp");
        assert_eq!(parsed.ingredient, "salt");
    }

    #[test]
    fn trailing_comma_clause_becomes_modifier() {
        let parsed = parse_ingredient_line("2 carrots, diced");
        assert_eq!(parsed.quantity, 2.0);
        assert_eq!(parsed.unit, "serving");
        assert_eq!(parsed.ingredient, "carrots");
        assert_eq!(parsed.modifier.as_deref(), Some("diced"));
    }

    #[test]
    fn missing_quantity_defaults_to_one_serving() {
        let parsed = parse_ingredient_line("salt to taste");
        assert_eq!(parsed.quantity, 1.0);
        assert_eq!(parsed.unit, "serving");
        assert_eq!(parsed.ingredient, "salt to taste");
    }

    #[test]
    fn parentheticals_are_dropped() {
        let parsed = parse_ingredient_line("1 can (15 oz) chickpeas");
        assert_eq!(parsed.quantity, 1.0);
        assert_eq!(parsed.unit, "can");
        assert_eq!(parsed.ingredient, "chickpeas");
    }

    #[test]
    fn gram_conversions() {
        let grams = |line: &str| quantity_in_grams(&parse_ingredient_line(line));
        assert!((grams("200 g rice") - 200.0).abs() < 1e-3);
        assert!((grams("1 cup rice") - 240.0).abs() < 1e-3);
        assert!((grams("1 pinch salt") - 0.3).abs() < 1e-3);
        assert!((grams("2 eggs") - 200.0).abs() < 1e-3);
    }
}
