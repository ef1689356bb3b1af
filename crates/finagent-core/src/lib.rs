//! Query classification, responders and the supervising dispatcher

pub mod classifier;
pub mod collaborators;
pub mod dispatcher;
mod error;
mod flight;
mod outcome;
pub mod responders;
mod retrieval;
pub mod rules;
pub mod settings;

pub use classifier::{parse_classification, QueryClassifier};
pub use collaborators::{
    ChatMessage, CollaboratorError, DocumentRetriever, GenerationRequest, RetrievedChunk, Role,
    TextGenerator,
};
pub use dispatcher::{DispatchRequest, Dispatcher, DispatcherBuilder, CACHE_SCOPE, DEFAULT_SESSION};
pub use error::DispatchError;
pub use outcome::DispatchOutcome;
pub use responders::{
    Campaign, CampaignWriter, KnowledgeAnswer, KnowledgeRequest, KnowledgeResponder,
    MarketingResponder, RagResponder, Source,
};
pub use rules::{campaign_params, Audience, CampaignFormat, CampaignParams};
pub use settings::{Settings, API_KEY_ENV};
