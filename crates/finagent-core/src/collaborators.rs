//! Seams to the external text-generation and document-retrieval services

use finagent_store::MetadataFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("text generation failed: {0}")]
    Generation(String),

    #[error("document retrieval failed: {0}")]
    Retrieval(String),
}

/// Produces one completion for a list of role-tagged messages
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: MetadataFilter,
    /// Smaller is closer
    pub distance: f64,
}

/// Returns up to `n` chunks matching `query` and every `filter` pair, nearest first
pub trait DocumentRetriever: Send + Sync {
    fn retrieve(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        n: usize,
    ) -> Result<Vec<RetrievedChunk>, CollaboratorError>;
}
