//! Deterministic stand-in models.
//!
//! [`KeywordMl`] embeds text as a signed, hashed bag of words and recognises
//! entities from a fixed gazetteer. Texts sharing words land close together,
//! which is enough to exercise every enrichment path without a model runtime.

use super::{ExtractedEntity, MlCapability};
use crate::error::WeaverError;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Dimension of [`KeywordMl`] embeddings unless configured otherwise.
pub const DEFAULT_DIMENSION: usize = 384;

/// Words shorter than this carry no signal.
const MIN_TOKEN_LEN: usize = 3;

const SUMMARY_EXCERPT_CHARS: usize = 60;

/// Hashed bag-of-words embedder with gazetteer entity recognition.
#[derive(Debug, Clone)]
pub struct KeywordMl {
    dimension: usize,
    gazetteer: Vec<(String, String)>,
    model_name: String,
}

impl Default for KeywordMl {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordMl {
    #[must_use]
    pub fn new() -> Self {
        Self::with_dimension(DEFAULT_DIMENSION)
    }

    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            gazetteer: Vec::new(),
            model_name: format!("keyword-hash-{}", dimension.max(1)),
        }
    }

    /// Recognise `name` (case-insensitively, on word boundaries) as an entity of `entity_type`.
    #[must_use]
    pub fn with_entity(mut self, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        self.gazetteer.push((name.into(), entity_type.into()));
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The embedding of `text`, computed synchronously.
    pub fn embed_now(&self, text: &str) -> Result<Vec<f32>, WeaverError> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let slot = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
            tokens += 1;
        }
        if tokens == 0 {
            return Err(WeaverError::Ml(format!("nothing to embed in {text:?}")));
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn find_entities(&self, text: &str) -> Vec<ExtractedEntity> {
        let haystack = text.to_ascii_lowercase();
        let mut found = Vec::new();
        for (name, entity_type) in &self.gazetteer {
            let needle = name.to_ascii_lowercase();
            if needle.is_empty() {
                continue;
            }
            for (start, _) in haystack.match_indices(needle.as_str()) {
                let end = start + needle.len();
                let before = haystack[..start].chars().next_back();
                let after = haystack[end..].chars().next();
                if before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric) {
                    continue;
                }
                found.push(ExtractedEntity {
                    text: text[start..end].to_string(),
                    entity_type: entity_type.clone(),
                    span: start..end,
                });
            }
        }
        found.sort_by_key(|e| e.span.start);
        found
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
}

#[async_trait]
impl MlCapability for KeywordMl {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, WeaverError> {
        self.embed_now(text)
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, WeaverError> {
        Ok(self.find_entities(text))
    }

    async fn summarize(&self, texts: &[String]) -> Result<String, WeaverError> {
        if texts.is_empty() {
            return Err(WeaverError::Ml("nothing to summarize".to_string()));
        }
        let excerpts: Vec<String> = texts
            .iter()
            .map(|t| t.chars().take(SUMMARY_EXCERPT_CHARS).collect())
            .collect();
        Ok(format!("{} messages: {}", texts.len(), excerpts.join(" / ")))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
