//! # ML Capability
//!
//! The models behind enrichment live outside this crate. The Weaver only sees
//! this trait, so inference backends can be swapped without touching storage.

pub mod mock;

use crate::error::WeaverError;
use async_trait::async_trait;
use std::ops::Range;

/// A named entity found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    /// Surface form, used as the entity label.
    pub text: String,
    /// Entity class, e.g. `PERSON` or `LOCATION`.
    pub entity_type: String,
    /// Byte range of `text` in the analysed string.
    pub span: Range<usize>,
}

/// Embedding, entity extraction and summarization models.
///
/// Implementations report failures as [`WeaverError::Ml`].
#[async_trait]
pub trait MlCapability: Send + Sync {
    /// Embed `text` into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, WeaverError>;

    /// Named entities in `text`.
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, WeaverError>;

    /// A digest of `texts`, given oldest first.
    async fn summarize(&self, texts: &[String]) -> Result<String, WeaverError>;

    /// Identifier of the embedding model, recorded on every embedding.
    fn model_name(&self) -> &str;
}
