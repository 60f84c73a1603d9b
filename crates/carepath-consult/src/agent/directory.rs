//! Provider reference data and specialty scoring

use std::sync::Arc;

use carepath_config::ProviderEntry;

use crate::session::{CodedItem, MatchedProvider};

const MATERNAL_FETAL: &str = "Maternal-Fetal Medicine";
const OBSTETRICS: &str = "Obstetrics";
const CARDIOLOGY: &str = "Cardiology";
const PSYCHIATRY: &str = "Psychiatry";
const PEDIATRICS: &str = "Pediatrics";
const EMERGENCY: &str = "Emergency Medicine";
const PHYSICAL: &str = "Physical Medicine";
const GENERAL_PRACTICE: [&str; 3] = ["Internal Medicine", "Family Medicine", "Primary Care"];

const SPECIALTY_BONUS: f64 = 1.0;
const GENERAL_PRACTICE_BONUS: f64 = 0.5;

const BUILTIN: [(&str, &str, &str, f64); 10] = [
    ("Mass General Maternal-Fetal Medicine", MATERNAL_FETAL, "Mass General", 4.9),
    ("Brigham Women's Obstetrics", OBSTETRICS, "Brigham Women's", 4.8),
    ("Boston Medical Center Internal Medicine", "Internal Medicine", "Boston Medical", 4.7),
    ("Newton-Wellesley Family Medicine", "Family Medicine", "Newton-Wellesley", 4.6),
    ("Beth Israel Emergency Medicine", EMERGENCY, "Beth Israel", 4.5),
    ("Tufts Medical Cardiology", CARDIOLOGY, "Tufts Medical", 4.8),
    ("Harvard Vanguard Primary Care", "Primary Care", "Harvard Vanguard", 4.6),
    ("Children's Hospital Pediatrics", PEDIATRICS, "Children's Hospital", 4.9),
    ("McLean Hospital Psychiatry", PSYCHIATRY, "McLean Hospital", 4.7),
    ("Spaulding Rehabilitation", PHYSICAL, "Spaulding", 4.5),
];

/// A provider the pipeline can recommend
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub name: String,
    pub specialty: String,
    pub hospital: String,
    pub rating: f64,
}

/// Immutable list of providers
#[derive(Debug, Clone)]
pub struct ProviderDirectory {
    providers: Arc<[Provider]>,
}

impl Default for ProviderDirectory {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderDirectory {
    pub fn new(providers: Vec<Provider>) -> Self {
        Self {
            providers: providers.into(),
        }
    }

    /// The built-in directory of ten Boston-area departments
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|&(name, specialty, hospital, rating)| Provider {
                    name: name.to_owned(),
                    specialty: specialty.to_owned(),
                    hospital: hospital.to_owned(),
                    rating,
                })
                .collect(),
        )
    }

    /// Configured providers, or the built-in directory when none are configured
    pub fn from_config(entries: &[ProviderEntry]) -> Self {
        if entries.is_empty() {
            return Self::builtin();
        }

        Self::new(
            entries
                .iter()
                .map(|entry| Provider {
                    name: entry.name.clone(),
                    specialty: entry.specialty.clone(),
                    hospital: entry.hospital.clone(),
                    rating: entry.rating,
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Every provider scored against the codes, best first
    ///
    /// Ties keep directory order.
    pub fn ranked(&self, codes: &[CodedItem]) -> Vec<MatchedProvider> {
        let wanted = specialties_for(codes);

        let mut scored: Vec<MatchedProvider> = self
            .providers
            .iter()
            .map(|provider| {
                let mut score = provider.rating;
                if wanted.contains(&provider.specialty.as_str()) {
                    score += SPECIALTY_BONUS;
                }
                if GENERAL_PRACTICE.contains(&provider.specialty.as_str()) {
                    score += GENERAL_PRACTICE_BONUS;
                }

                MatchedProvider {
                    name: provider.name.clone(),
                    specialty: provider.specialty.clone(),
                    hospital: provider.hospital.clone(),
                    rating: provider.rating,
                    match_score: score,
                    explanation: String::new(),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
        scored
    }

    /// The top `count` providers for the codes
    pub fn select(&self, codes: &[CodedItem], count: usize) -> Vec<MatchedProvider> {
        let mut ranked = self.ranked(codes);
        ranked.truncate(count);
        ranked
    }
}

/// Specialties suggested by each code, first matching rule wins per code
pub fn specialties_for(codes: &[CodedItem]) -> Vec<&'static str> {
    let mut specialties = Vec::new();

    for item in codes {
        let description = item.description.to_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| description.contains(k));

        if mentions(&["pregnancy", "obstetric", "preeclampsia", "maternal"]) {
            specialties.extend([MATERNAL_FETAL, OBSTETRICS]);
        } else if mentions(&["cardiac", "heart", "cardio"]) {
            specialties.push(CARDIOLOGY);
        } else if mentions(&["depression", "anxiety", "mental", "psychiatric"]) {
            specialties.push(PSYCHIATRY);
        } else if item.code.to_uppercase().starts_with('P') || mentions(&["pediatric", "child", "infant"]) {
            specialties.push(PEDIATRICS);
        } else if mentions(&["emergency", "acute", "trauma"]) {
            specialties.push(EMERGENCY);
        } else if mentions(&["musculoskeletal", "fracture", "joint", "muscle"]) {
            specialties.push(PHYSICAL);
        } else {
            specialties.extend(GENERAL_PRACTICE);
        }
    }

    specialties
}
