use super::fallback::{self, DEFAULT_PROCEDURE_DESCRIPTION, MAX_PROCEDURE_CODES, QuestionStyle};
use super::parse::{RawCoding, first_question, normalize_codes, parse_json};
use super::{BoundBackend, qa_transcript};
use crate::session::{CodedItem, CodingResult, QaEntry, SymptomsResult};

/// Proposes CPT procedure codes for the diagnosis
#[derive(Clone)]
pub struct ProcedureAgent {
    backend: BoundBackend,
}

impl ProcedureAgent {
    pub const fn new(backend: BoundBackend) -> Self {
        Self { backend }
    }

    pub const fn backend(&self) -> &BoundBackend {
        &self.backend
    }

    pub async fn process(&self, symptoms: &SymptomsResult, diagnosis: &[CodedItem], prior_qa: &[QaEntry]) -> CodingResult {
        let text = match self.backend.generate(&prompt(symptoms, diagnosis, prior_qa)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "procedure coding unavailable, using placeholder codes");
                String::new()
            }
        };

        interpret(&text)
    }
}

fn prompt(symptoms: &SymptomsResult, diagnosis: &[CodedItem], prior_qa: &[QaEntry]) -> String {
    let symptoms = serde_json::to_string(&symptoms.symptoms).unwrap_or_default();
    let diagnosis: Vec<String> = diagnosis
        .iter()
        .map(|item| format!("{} ({})", item.code, item.description))
        .collect();

    format!(
        "Suggest at most three CPT procedure codes for this visit.\n\
         Symptoms: {symptoms}\n\
         Diagnosis codes: {diagnosis}\n\
         {qa}\n\
         Rank codes by importance, 1 being the most important, and add a one-sentence explanation of the \
         recommended procedures. Ask a single clarifying question only if it is essential.\n\
         Reply with JSON only: {{\"codes\": [{{\"code\": \"...\", \"description\": \"...\", \"importance\": 1}}], \
         \"explanation\": \"...\", \"questions\": []}}",
        diagnosis = diagnosis.join(", "),
        qa = qa_transcript(prior_qa),
    )
}

/// Parse model output into ranked codes, an explanation and at most one question
pub fn interpret(text: &str) -> CodingResult {
    match parse_json::<RawCoding>(text) {
        Ok(raw) => {
            let mut codes = normalize_codes(raw.codes, MAX_PROCEDURE_CODES, DEFAULT_PROCEDURE_DESCRIPTION);
            if codes.is_empty() {
                codes = fallback::procedure_codes(text);
            }

            let explanation = raw
                .explanation
                .map(|e| e.trim().to_owned())
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| fallback::explanation(text));

            CodingResult {
                codes,
                explanation: Some(explanation),
                questions: first_question(&raw.questions),
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "procedure output is not JSON, extracting heuristically");
            CodingResult {
                codes: fallback::procedure_codes(text),
                explanation: Some(fallback::explanation(text)),
                questions: fallback::questions(text, QuestionStyle::Procedure),
            }
        }
    }
}
