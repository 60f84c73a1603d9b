use super::parse::{RawSymptoms, parse_json, text_value};
use super::{BoundBackend, fallback};
use crate::session::{PatientContext, SymptomsResult};

/// Extracts a symptom list from the patient's own words
#[derive(Clone)]
pub struct SymptomAgent {
    backend: BoundBackend,
}

impl SymptomAgent {
    pub const fn new(backend: BoundBackend) -> Self {
        Self { backend }
    }

    pub const fn backend(&self) -> &BoundBackend {
        &self.backend
    }

    pub async fn process(&self, input: &str, patient: &PatientContext) -> SymptomsResult {
        match self.backend.generate(&prompt(input, patient)).await {
            Ok(text) => interpret(input, &text),
            Err(e) => {
                tracing::warn!(error = %e, "symptom extraction unavailable, using raw input");
                fallback::symptoms(input, &e)
            }
        }
    }
}

fn prompt(input: &str, patient: &PatientContext) -> String {
    let patient = patient.describe();
    let patient_line = if patient.is_empty() {
        String::new()
    } else {
        format!("Patient: {patient}\n")
    };

    format!(
        "List the distinct symptoms the patient reports. Reply with JSON only, shaped as \
         {{\"symptoms\": [\"...\"], \"pregnancy_related\": true|false}}.\n{patient_line}Patient says: {input}"
    )
}

/// Parse model output, falling back to the raw input
pub fn interpret(input: &str, text: &str) -> SymptomsResult {
    match parse_json::<RawSymptoms>(text) {
        Ok(raw) => {
            let symptoms: Vec<String> = raw.symptoms.iter().filter_map(text_value).collect();
            if symptoms.is_empty() {
                return fallback::symptoms(input, "no symptoms in model output");
            }

            SymptomsResult {
                pregnancy_related: raw
                    .pregnancy_related
                    .unwrap_or_else(|| fallback::mentions_pregnancy(input)),
                symptoms,
                parse_error: None,
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "symptom output is not JSON");
            fallback::symptoms(input, e)
        }
    }
}

/// Progressively longer prefixes of the symptom list, ending with the whole
pub fn progressive(result: &SymptomsResult) -> Vec<SymptomsResult> {
    (1..=result.symptoms.len())
        .map(|len| SymptomsResult {
            symptoms: result.symptoms[..len].to_vec(),
            pregnancy_related: result.pregnancy_related,
            parse_error: result.parse_error.clone(),
        })
        .collect()
}
