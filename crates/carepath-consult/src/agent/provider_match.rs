use std::time::Duration;

use super::{BoundBackend, ProviderDirectory};
use crate::session::{CodedItem, MatchedProvider};

const DEFAULT_STREAMED_WORDS: usize = 5;
const DEFAULT_PACING: Duration = Duration::from_millis(100);

/// Chooses providers for the diagnosis and explains each recommendation
#[derive(Clone)]
pub struct ProviderMatchAgent {
    backend: BoundBackend,
    directory: ProviderDirectory,
    streamed_words: usize,
    pacing: Duration,
}

impl ProviderMatchAgent {
    pub const fn new(backend: BoundBackend, directory: ProviderDirectory) -> Self {
        Self {
            backend,
            directory,
            streamed_words: DEFAULT_STREAMED_WORDS,
            pacing: DEFAULT_PACING,
        }
    }

    /// Number of leading explanation words streamed and the delay between them
    #[must_use]
    pub const fn with_streaming(mut self, streamed_words: usize, pacing: Duration) -> Self {
        self.streamed_words = streamed_words;
        self.pacing = pacing;
        self
    }

    pub const fn backend(&self) -> &BoundBackend {
        &self.backend
    }

    pub const fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Top providers for the diagnostic codes, without explanations
    pub fn select_providers(&self, codes: &[CodedItem], count: usize) -> Vec<MatchedProvider> {
        self.directory.select(codes, count)
    }

    /// Why a provider suits these symptoms
    ///
    /// Falls back to a templated sentence when the backend is unavailable
    /// or answers with nothing.
    pub async fn explain(&self, provider: &MatchedProvider, symptoms: &[String]) -> String {
        match self.backend.generate(&prompt(provider, symptoms)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
            Ok(_) => templated(provider),
            Err(e) => {
                tracing::warn!(provider = %provider.name, error = %e, "explanation unavailable, using template");
                templated(provider)
            }
        }
    }

    /// Leading words of an explanation as stream chunks
    ///
    /// Every chunk carries a trailing space except the explanation's final word.
    pub fn chunks(&self, explanation: &str) -> Vec<String> {
        let words: Vec<&str> = explanation.split_whitespace().collect();

        words
            .iter()
            .take(self.streamed_words)
            .enumerate()
            .map(|(i, word)| {
                if i + 1 < words.len() {
                    format!("{word} ")
                } else {
                    (*word).to_owned()
                }
            })
            .collect()
    }

    /// Further providers not already recommended, with explanations
    pub async fn more_providers(
        &self,
        codes: &[CodedItem],
        exclude: &[String],
        count: usize,
        symptoms: &[String],
    ) -> Vec<MatchedProvider> {
        let extra: Vec<MatchedProvider> = self
            .directory
            .ranked(codes)
            .into_iter()
            .filter(|provider| !exclude.contains(&provider.name))
            .take(count)
            .collect();

        let mut explained = Vec::with_capacity(extra.len());
        for mut provider in extra {
            provider.explanation = self.explain(&provider, symptoms).await;
            explained.push(provider);
        }
        explained
    }
}

fn prompt(provider: &MatchedProvider, symptoms: &[String]) -> String {
    let symptoms = if symptoms.is_empty() {
        "a general medical consultation".to_owned()
    } else {
        symptoms.join(", ")
    };

    format!(
        "In at most two plain, factual sentences, explain why the {specialty} department at {hospital} \
         ({name}) is a good fit for a patient with: {symptoms}. Mention the tests or procedures they \
         typically perform for these symptoms.",
        specialty = provider.specialty,
        hospital = provider.hospital,
        name = provider.name,
    )
}

fn templated(provider: &MatchedProvider) -> String {
    format!(
        "{} at {} specializes in {} and regularly evaluates patients with these symptoms.",
        provider.name, provider.hospital, provider.specialty
    )
}
