//! Heuristic extraction for model output that is not valid JSON

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::session::{CodedItem, SymptomsResult};

pub const MAX_DIAGNOSTIC_CODES: usize = 5;
pub const MAX_PROCEDURE_CODES: usize = 3;

pub const DEFAULT_DIAGNOSIS_DESCRIPTION: &str = "Medical condition";
pub const DEFAULT_PROCEDURE_DESCRIPTION: &str = "Medical procedure";

pub const DEFAULT_EXPLANATION: &str =
    "Standard evaluation and monitoring procedures recommended based on presented symptoms.";

const EXPLANATION_KEYWORDS: [&str; 8] = [
    "procedure",
    "recommended",
    "evaluation",
    "assessment",
    "monitoring",
    "treatment",
    "diagnosis",
    "care",
];

static ICD_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]\d{2}(?:\.\d{1,3})?)").expect("must be valid regex"));

static CPT_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}\b").expect("must be valid regex"));

static LABELLED_QUESTION: LazyLock<Regex> = LazyLock::new(|| case_insensitive(r"Question[:\s]*([^?\n]+\?)"));

static DIAGNOSTIC_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"(?:Can you|Could you|Do you|Are you|Have you|How)[^?\n]+\?"));

static PROCEDURE_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"(?:Can you|Could you|Do you|Are you|Have you|How|What)[^?\n]+\?"));

static BETWEEN_MARKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?[^?]*\?").expect("must be valid regex"));

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("must be valid regex")
}

/// Which coding stage a question is being extracted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStyle {
    Diagnostic,
    Procedure,
}

/// Diagnostic codes found in free text, or the generic placeholder
pub fn diagnostic_codes(text: &str) -> Vec<CodedItem> {
    let codes = codes_in(text, &ICD_CODE, DEFAULT_DIAGNOSIS_DESCRIPTION, MAX_DIAGNOSTIC_CODES);
    if !codes.is_empty() {
        return codes;
    }

    vec![CodedItem {
        code: "R68.89".to_owned(),
        description: "Other general symptoms and signs".to_owned(),
        importance: 1,
    }]
}

/// Procedure codes found in free text, or an office-visit placeholder
pub fn procedure_codes(text: &str) -> Vec<CodedItem> {
    let codes = codes_in(text, &CPT_CODE, DEFAULT_PROCEDURE_DESCRIPTION, MAX_PROCEDURE_CODES);
    if !codes.is_empty() {
        return codes;
    }

    vec![CodedItem {
        code: "99214".to_owned(),
        description: "Office visit for established patient".to_owned(),
        importance: 1,
    }]
}

fn codes_in(text: &str, pattern: &Regex, default_description: &str, cap: usize) -> Vec<CodedItem> {
    pattern
        .find_iter(text)
        .take(cap)
        .zip(1u32..)
        .map(|(found, importance)| {
            let code = found.as_str();
            CodedItem {
                code: code.to_owned(),
                description: describe(text, code).unwrap_or_else(|| default_description.to_owned()),
                importance,
            }
        })
        .collect()
}

/// Text following the first mention of a code, up to the next `,` `.` or newline
fn describe(text: &str, code: &str) -> Option<String> {
    let pattern = RegexBuilder::new(&format!(r"{}[:\s]*([^,\n\.]+)", regex::escape(code)))
        .case_insensitive(true)
        .build()
        .ok()?;

    let description = pattern.captures(text)?.get(1)?.as_str().trim();
    (!description.is_empty()).then(|| description.to_owned())
}

/// The first clarifying question found in free text
pub fn questions(text: &str, style: QuestionStyle) -> Vec<String> {
    let phrased = match style {
        QuestionStyle::Diagnostic => &*DIAGNOSTIC_QUESTION,
        QuestionStyle::Procedure => &*PROCEDURE_QUESTION,
    };

    let labelled = LABELLED_QUESTION
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()));
    let phrased = phrased.find_iter(text).map(|m| m.as_str());
    let between = BETWEEN_MARKS.find_iter(text).map(|m| m.as_str());

    labelled
        .chain(phrased)
        .chain(between)
        .map(str::trim)
        .find(|candidate| candidate.chars().count() > 10)
        .map(ToOwned::to_owned)
        .into_iter()
        .collect()
}

/// The first sentence that reads like a procedure explanation
pub fn explanation(text: &str) -> String {
    text.split('.')
        .map(str::trim)
        .filter(|sentence| sentence.chars().count() > 20)
        .find(|sentence| {
            let lower = sentence.to_lowercase();
            EXPLANATION_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
        })
        .map_or_else(|| DEFAULT_EXPLANATION.to_owned(), |sentence| format!("{sentence}."))
}

/// The raw input as the only symptom
pub fn symptoms(input: &str, error: impl ToString) -> SymptomsResult {
    SymptomsResult {
        symptoms: vec![input.trim().to_owned()],
        pregnancy_related: mentions_pregnancy(input),
        parse_error: Some(error.to_string()),
    }
}

pub fn mentions_pregnancy(text: &str) -> bool {
    text.to_lowercase().contains("pregnan")
}
