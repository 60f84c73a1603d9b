//! Structured parsing of model output

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::session::CodedItem;

/// Parse model output as JSON, falling back to the outermost embedded object
///
/// # Errors
///
/// Returns the strict-parse error when neither attempt succeeds
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let strict = match serde_json::from_str(text.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    match embedded_object(text) {
        Some(block) => serde_json::from_str(block).map_err(|_| strict),
        None => Err(strict),
    }
}

/// Locate the first balanced `{...}` block, ignoring braces inside strings
///
/// When the braces never balance, everything from the first `{` to the
/// last `}` is returned instead.
pub fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// A coded item as a model writes it
#[derive(Debug, Deserialize)]
pub struct RawCodedItem {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub description: Value,
    #[serde(default)]
    pub importance: Value,
}

/// Coding stage output as a model writes it
#[derive(Debug, Deserialize)]
pub struct RawCoding {
    #[serde(default, alias = "icd_codes", alias = "cpt_codes")]
    pub codes: Vec<RawCodedItem>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub questions: Value,
}

/// Symptom stage output as a model writes it
#[derive(Debug, Deserialize)]
pub struct RawSymptoms {
    #[serde(default)]
    pub symptoms: Vec<Value>,
    #[serde(default)]
    pub pregnancy_related: Option<bool>,
}

/// Sort items by the model's importance, re-rank densely from 1 and cap
///
/// The sort is stable and items without a usable importance keep their
/// relative position after the ranked ones. Items without a code are
/// dropped.
pub fn normalize_codes(items: Vec<RawCodedItem>, cap: usize, default_description: &str) -> Vec<CodedItem> {
    let mut ranked: Vec<(f64, String, String)> = items
        .into_iter()
        .filter_map(|item| {
            let code = text_value(&item.code)?;
            let description = text_value(&item.description).unwrap_or_else(|| default_description.to_owned());
            let importance = number_value(&item.importance).unwrap_or(f64::INFINITY);
            Some((importance, code, description))
        })
        .collect();

    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    ranked
        .into_iter()
        .take(cap)
        .zip(1u32..)
        .map(|((_, code, description), importance)| CodedItem {
            code,
            description,
            importance,
        })
        .collect()
}

/// First usable question from a model-written `questions` field
pub fn first_question(questions: &Value) -> Vec<String> {
    let first = match questions {
        Value::Array(items) => items.iter().find_map(text_value),
        other => text_value(other),
    };

    first.into_iter().collect()
}

/// Non-empty trimmed text from a string or number
pub fn text_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn number_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strict_json_parses() {
        let raw: RawCoding = parse_json(r#"{"icd_codes":[{"code":"R51","description":"Headache","importance":1}]}"#).unwrap();
        assert_eq!(raw.codes.len(), 1);
    }

    #[test]
    fn embedded_json_is_found() {
        let text = "Sure! Here you go:\n```json\n{\"cpt_codes\": [{\"code\": \"99214\"}], \"explanation\": \"Visit {today}\"}\n```\nLet me know.";

        let raw: RawCoding = parse_json(text).unwrap();
        assert_eq!(raw.codes.len(), 1);
        assert_eq!(raw.explanation.as_deref(), Some("Visit {today}"));
    }

    #[test]
    fn balanced_scan_stops_at_first_object() {
        let text = r#"{"a": "}"} trailing {"b": 1}"#;
        assert_eq!(embedded_object(text), Some(r#"{"a": "}"}"#));
    }

    #[test]
    fn unbalanced_falls_back_to_last_brace() {
        let text = "x { { \"a\": 1 } y";
        assert_eq!(embedded_object(text), Some("{ { \"a\": 1 }"));
        assert_eq!(embedded_object("no braces"), None);
        assert_eq!(embedded_object("} before {"), None);
    }

    #[test]
    fn unparseable_text_is_an_error() {
        assert!(parse_json::<RawCoding>("The patient likely has a migraine.").is_err());
    }

    #[test]
    fn codes_are_sorted_and_densely_ranked() {
        let items = vec![
            RawCodedItem {
                code: json!("R11.0"),
                description: json!("Nausea"),
                importance: json!(3),
            },
            RawCodedItem {
                code: json!("O14.0"),
                description: json!("Mild preeclampsia"),
                importance: json!(1),
            },
            RawCodedItem {
                code: json!("R51"),
                description: json!("Headache"),
                importance: json!("3"),
            },
            RawCodedItem {
                code: json!("Z33.1"),
                description: Value::Null,
                importance: Value::Null,
            },
        ];

        let codes = normalize_codes(items, 5, "Medical condition");
        let order: Vec<_> = codes.iter().map(|c| (c.code.as_str(), c.importance)).collect();

        assert_eq!(order, [("O14.0", 1), ("R11.0", 2), ("R51", 3), ("Z33.1", 4)]);
        assert_eq!(codes[3].description, "Medical condition");
    }

    #[test]
    fn codes_are_capped_and_blank_codes_dropped() {
        let items = (0..8)
            .map(|i| RawCodedItem {
                code: if i == 0 { json!("") } else { json!(format!("R{i:02}")) },
                description: json!("x"),
                importance: json!(i),
            })
            .collect();

        let codes = normalize_codes(items, 3, "Medical procedure");
        let ranks: Vec<_> = codes.iter().map(|c| c.importance).collect();

        assert_eq!(ranks, [1, 2, 3]);
        assert_eq!(codes[0].code, "R01");
    }

    #[test]
    fn only_first_question_is_kept() {
        assert_eq!(first_question(&json!(["", "  Any fever?  ", "Other?"])), ["Any fever?"]);
        assert_eq!(first_question(&json!("Is it constant?")), ["Is it constant?"]);
        assert!(first_question(&json!([])).is_empty());
        assert!(first_question(&Value::Null).is_empty());
    }
}
