//! Consultation session state and per-stage results

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A step of the consultation pipeline
///
/// Serialized with the short agent names used on the event wire; the
/// descriptive names are accepted as aliases when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageName {
    #[serde(rename = "symptom")]
    Symptom,
    #[serde(rename = "icd", alias = "diagnostic")]
    Diagnostic,
    #[serde(rename = "cpt", alias = "procedure")]
    Procedure,
    #[serde(rename = "doctor", alias = "provider_match")]
    ProviderMatch,
    #[serde(rename = "summary")]
    Summary,
}

impl StageName {
    /// Stages in execution order
    pub const ALL: [Self; 5] = [
        Self::Symptom,
        Self::Diagnostic,
        Self::Procedure,
        Self::ProviderMatch,
        Self::Summary,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Symptom => "symptom",
            Self::Diagnostic => "icd",
            Self::Procedure => "cpt",
            Self::ProviderMatch => "doctor",
            Self::Summary => "summary",
        }
    }

    /// The stage that follows this one, if any
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Symptom => Some(Self::Diagnostic),
            Self::Diagnostic => Some(Self::Procedure),
            Self::Procedure => Some(Self::ProviderMatch),
            Self::ProviderMatch => Some(Self::Summary),
            Self::Summary => None,
        }
    }

    /// Whether the stage may pause the pipeline with a question
    pub const fn asks_questions(self) -> bool {
        matches!(self, Self::Diagnostic | Self::Procedure)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    AwaitingAnswer,
    Completed,
    Error,
}

/// Optional demographics supplied at intake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weeks_pregnant: Option<u32>,
    #[serde(default)]
    pub pregnant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
}

impl PatientContext {
    /// One-line description for prompts, empty when nothing is known
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();

        if let Some(age) = self.age {
            parts.push(format!("age {age}"));
        }
        if let Some(gender) = &self.gender {
            parts.push(gender.clone());
        }
        match self.weeks_pregnant {
            Some(weeks) => parts.push(format!("{weeks} weeks pregnant")),
            None if self.pregnant => parts.push("pregnant".to_owned()),
            None => {}
        }
        if let Some(location) = &self.location {
            parts.push(format!("located in {location}"));
        }
        if let Some(insurance) = &self.insurance {
            parts.push(format!("insurance: {insurance}"));
        }

        parts.join(", ")
    }
}

/// One answered clarifying question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    pub stage: StageName,
}

/// A diagnostic or procedure code with its rank
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodedItem {
    pub code: String,
    pub description: String,
    /// Dense rank, 1 is the highest priority
    pub importance: u32,
}

/// Output of the symptom extraction stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymptomsResult {
    pub symptoms: Vec<String>,
    pub pregnancy_related: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

/// Output of a coding stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodingResult {
    pub codes: Vec<CodedItem>,
    /// Procedure stage only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub questions: Vec<String>,
}

impl CodingResult {
    pub fn first_question(&self) -> Option<&str> {
        self.questions.first().map(String::as_str)
    }
}

/// A provider selected for the patient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedProvider {
    pub name: String,
    pub specialty: String,
    pub hospital: String,
    pub rating: f64,
    pub match_score: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub explanation: String,
}

/// Deterministic wrap-up of a finished consultation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultationSummary {
    pub primary_diagnosis: Option<CodedItem>,
    pub diagnostic_codes: Vec<CodedItem>,
    pub procedure_codes: Vec<CodedItem>,
    pub procedure_explanation: Option<String>,
    pub providers: Vec<String>,
    pub qa_rounds: usize,
}

/// Parsed output of one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageResult {
    Symptoms(SymptomsResult),
    Diagnostic(CodingResult),
    Procedure(CodingResult),
    Providers(Vec<MatchedProvider>),
    Summary(ConsultationSummary),
}

/// Data needed to open a consultation
#[derive(Debug, Clone, Deserialize)]
pub struct Intake {
    pub symptoms: String,
    #[serde(default)]
    pub patient: PatientContext,
}

/// Persisted state of one consultation
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    /// Seconds since the Unix epoch
    pub created_at: u64,
    pub patient_context: PatientContext,
    pub raw_symptom_text: String,
    pub qa_history: Vec<QaEntry>,
    pub stage_results: BTreeMap<StageName, StageResult>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_stage: Option<StageName>,
}

impl Session {
    pub fn new(id: String, intake: Intake) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            id,
            created_at,
            patient_context: intake.patient,
            raw_symptom_text: intake.symptoms,
            qa_history: Vec::new(),
            stage_results: BTreeMap::new(),
            status: SessionStatus::Active,
            pending_stage: None,
        }
    }

    pub fn symptoms(&self) -> Option<&SymptomsResult> {
        match self.stage_results.get(&StageName::Symptom) {
            Some(StageResult::Symptoms(result)) => Some(result),
            _ => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&CodingResult> {
        match self.stage_results.get(&StageName::Diagnostic) {
            Some(StageResult::Diagnostic(result)) => Some(result),
            _ => None,
        }
    }

    pub fn procedure(&self) -> Option<&CodingResult> {
        match self.stage_results.get(&StageName::Procedure) {
            Some(StageResult::Procedure(result)) => Some(result),
            _ => None,
        }
    }

    pub fn providers(&self) -> Option<&[MatchedProvider]> {
        match self.stage_results.get(&StageName::ProviderMatch) {
            Some(StageResult::Providers(providers)) => Some(providers),
            _ => None,
        }
    }

    /// Outstanding question of a coding stage
    pub fn pending_question(&self, stage: StageName) -> Option<&str> {
        let result = match stage {
            StageName::Diagnostic => self.diagnostic(),
            StageName::Procedure => self.procedure(),
            _ => None,
        };
        result.and_then(CodingResult::first_question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intake(symptoms: &str) -> Intake {
        Intake {
            symptoms: symptoms.to_owned(),
            patient: PatientContext::default(),
        }
    }

    #[test]
    fn stage_order() {
        let mut order = vec![StageName::Symptom];
        while let Some(next) = order.last().and_then(|s| s.next()) {
            order.push(next);
        }

        assert_eq!(order, StageName::ALL);
    }

    #[test]
    fn stage_names_accept_aliases() {
        let stage: StageName = serde_json::from_str("\"diagnostic\"").unwrap();
        assert_eq!(stage, StageName::Diagnostic);

        let stage: StageName = serde_json::from_str("\"cpt\"").unwrap();
        assert_eq!(stage, StageName::Procedure);

        assert_eq!(serde_json::to_string(&StageName::ProviderMatch).unwrap(), "\"doctor\"");
    }

    #[test]
    fn new_session_is_active_and_empty() {
        let session = Session::new("s1".to_owned(), intake("headache"));

        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.stage_results.is_empty());
        assert!(session.qa_history.is_empty());
        assert!(session.created_at > 0);
    }

    #[test]
    fn pending_question_reads_coding_result() {
        let mut session = Session::new("s1".to_owned(), intake("headache"));
        session.stage_results.insert(
            StageName::Diagnostic,
            StageResult::Diagnostic(CodingResult {
                codes: vec![],
                explanation: None,
                questions: vec!["How long has it lasted?".to_owned()],
            }),
        );

        assert_eq!(
            session.pending_question(StageName::Diagnostic),
            Some("How long has it lasted?")
        );
        assert_eq!(session.pending_question(StageName::Procedure), None);
    }

    #[test]
    fn patient_description() {
        let patient = PatientContext {
            age: Some(31),
            weeks_pregnant: Some(28),
            pregnant: true,
            ..PatientContext::default()
        };

        assert_eq!(patient.describe(), "age 31, 28 weeks pregnant");
        assert_eq!(PatientContext::default().describe(), "");
    }

    #[test]
    fn results_serialize_keyed_by_agent() {
        let mut session = Session::new("s1".to_owned(), intake("cough"));
        session.stage_results.insert(
            StageName::Symptom,
            StageResult::Symptoms(SymptomsResult {
                symptoms: vec!["cough".to_owned()],
                pregnancy_related: false,
                parse_error: None,
            }),
        );

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["stage_results"]["symptom"]["symptoms"][0], "cough");
        assert_eq!(value["status"], "active");
    }
}
