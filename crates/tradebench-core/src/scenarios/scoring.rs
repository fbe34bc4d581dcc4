//! Accuracy heuristics for the voice scenarios. They are rough word and
//! field overlaps, not statistically meaningful measures.

use std::collections::BTreeMap;

use serde_json::Value;

/// Relative tolerance for numeric command fields.
const NUMERIC_TOLERANCE: f64 = 0.05;

/// Share of recognized words that appear in the expected text, over the
/// longer of the two word counts. Case-insensitive; 0 when either is empty.
pub fn text_similarity(expected: &str, actual: &str) -> f64 {
    let expected = expected.to_lowercase();
    let actual = actual.to_lowercase();
    let expected_words: Vec<&str> = expected.split_whitespace().collect();
    let actual_words: Vec<&str> = actual.split_whitespace().collect();
    if expected_words.is_empty() || actual_words.is_empty() {
        return 0.0;
    }
    let matches = actual_words
        .iter()
        .filter(|w| expected_words.contains(w))
        .count();
    matches as f64 / expected_words.len().max(actual_words.len()) as f64
}

/// Share of expected command fields reproduced by the parser.
///
/// 0 when either side is empty or the `type` fields differ. Numbers match
/// within 5% (`|e - a| / max(1, e)`); everything else compares as
/// case-insensitive text.
pub fn command_match(expected: &BTreeMap<String, Value>, parsed: &BTreeMap<String, Value>) -> f64 {
    if expected.is_empty() || parsed.is_empty() {
        return 0.0;
    }
    if expected.get("type") != parsed.get("type") {
        return 0.0;
    }
    let matches = expected
        .iter()
        .filter(|(key, want)| parsed.get(*key).is_some_and(|got| field_matches(want, got)))
        .count();
    matches as f64 / expected.len() as f64
}

fn field_matches(expected: &Value, actual: &Value) -> bool {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(e), Some(a)) => (e - a).abs() / e.max(1.0) < NUMERIC_TOLERANCE,
        _ => as_text(expected).to_lowercase() == as_text(actual).to_lowercase(),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
