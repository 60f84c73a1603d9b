use super::fallback::{self, DEFAULT_DIAGNOSIS_DESCRIPTION, MAX_DIAGNOSTIC_CODES, QuestionStyle};
use super::parse::{RawCoding, first_question, normalize_codes, parse_json};
use super::{BoundBackend, qa_transcript};
use crate::session::{CodingResult, PatientContext, QaEntry, SymptomsResult};

/// Assigns ranked ICD-10 diagnostic codes to the extracted symptoms
#[derive(Clone)]
pub struct DiagnosticAgent {
    backend: BoundBackend,
}

impl DiagnosticAgent {
    pub const fn new(backend: BoundBackend) -> Self {
        Self { backend }
    }

    pub const fn backend(&self) -> &BoundBackend {
        &self.backend
    }

    pub async fn process(&self, symptoms: &SymptomsResult, patient: &PatientContext, prior_qa: &[QaEntry]) -> CodingResult {
        let text = match self.backend.generate(&prompt(symptoms, patient, prior_qa)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "diagnostic coding unavailable, using placeholder codes");
                String::new()
            }
        };

        interpret(&text)
    }
}

fn prompt(symptoms: &SymptomsResult, patient: &PatientContext, prior_qa: &[QaEntry]) -> String {
    let symptoms = serde_json::to_string(&symptoms.symptoms).unwrap_or_default();
    let patient = patient.describe();

    format!(
        "Assign ICD-10 diagnosis codes for a patient.\n\
         Symptoms: {symptoms}\n\
         Patient: {patient}\n\
         {qa}\n\
         Rank codes by importance, 1 being the most important. If one detail is critical and missing, \
         include a single clarifying question, otherwise leave questions empty.\n\
         Reply with JSON only: {{\"codes\": [{{\"code\": \"...\", \"description\": \"...\", \"importance\": 1}}], \
         \"questions\": []}}",
        qa = qa_transcript(prior_qa),
    )
}

/// Parse model output into ranked codes and at most one question
pub fn interpret(text: &str) -> CodingResult {
    match parse_json::<RawCoding>(text) {
        Ok(raw) => {
            let mut codes = normalize_codes(raw.codes, MAX_DIAGNOSTIC_CODES, DEFAULT_DIAGNOSIS_DESCRIPTION);
            if codes.is_empty() {
                codes = fallback::diagnostic_codes(text);
            }

            CodingResult {
                codes,
                explanation: None,
                questions: first_question(&raw.questions),
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "diagnostic output is not JSON, extracting heuristically");
            CodingResult {
                codes: fallback::diagnostic_codes(text),
                explanation: None,
                questions: fallback::questions(text, QuestionStyle::Diagnostic),
            }
        }
    }
}
