//! Knowledge and marketing responders

use crate::collaborators::{
    ChatMessage, CollaboratorError, DocumentRetriever, GenerationRequest, RetrievedChunk,
    TextGenerator,
};
use crate::rules::{Audience, CampaignFormat};
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use finagent_store::MetadataFilter;
use finagent_telemetry::text::{round_to, truncate_chars};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PREVIEW_CHARS: usize = 200;
const PRODUCT_RESULTS: usize = 3;
const DEFAULT_PRODUCT: &str = "home_loan";

/// One retrieved document backing a knowledge answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source: String,
    pub doc_type: String,
    pub loan_type: String,
    /// `(1 - distance) * 100`, rounded to 2 places
    pub relevance: f64,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Copy)]
pub struct KnowledgeRequest<'a> {
    pub query: &'a str,
    pub filters: Option<&'a MetadataFilter>,
    pub n_results: usize,
    /// Rendered recent conversation, if any
    pub context: Option<&'a str>,
}

pub trait KnowledgeResponder: Send + Sync {
    fn answer(&self, request: &KnowledgeRequest<'_>) -> Result<KnowledgeAnswer, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub campaign_type: CampaignFormat,
    pub target_audience: Audience,
    pub product_type: String,
    pub content: String,
    pub generated_at: DateTime<Utc>,
}

impl Campaign {
    /// Plain-text rendering with a header block
    pub fn render(&self) -> String {
        let rule = "=".repeat(70);
        format!(
            "CAMPAIGN TYPE: {}\nTARGET AUDIENCE: {}\nPRODUCT: {}\nGENERATED: {}\n\n{rule}\nCAMPAIGN CONTENT:\n{rule}\n\n{}",
            self.campaign_type,
            self.target_audience,
            self.product_type,
            self.generated_at.to_rfc3339(),
            self.content,
        )
    }

    /// Write the rendered campaign to `campaign_<type>_<timestamp>.txt` under `dir`
    pub fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "campaign_{}_{}.txt",
            self.campaign_type,
            self.generated_at.format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&path, self.render())?;
        Ok(path)
    }
}

pub trait MarketingResponder: Send + Sync {
    fn generate_campaign(
        &self,
        format: CampaignFormat,
        audience: Audience,
        product_type: Option<&str>,
    ) -> Result<Campaign, CollaboratorError>;
}

/// Answers from retrieved document chunks
pub struct RagResponder {
    retriever: Arc<dyn DocumentRetriever>,
    generator: Arc<dyn TextGenerator>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    bank_name: String,
}

impl RagResponder {
    pub fn new(
        retriever: Arc<dyn DocumentRetriever>,
        generator: Arc<dyn TextGenerator>,
        settings: &Settings,
    ) -> Self {
        Self {
            retriever,
            generator,
            model: settings.model.clone(),
            temperature: settings.knowledge_temperature,
            max_tokens: settings.knowledge_max_tokens,
            bank_name: settings.bank_name.clone(),
        }
    }

    fn not_found(&self) -> KnowledgeAnswer {
        KnowledgeAnswer {
            answer: format!(
                "I couldn't find any relevant information in the {} documents.",
                self.bank_name
            ),
            sources: Vec::new(),
        }
    }

    fn prompt(&self, question: &str, sources: &str, context: Option<&str>) -> String {
        let bank = &self.bank_name;
        let history = match context {
            Some(c) => format!("**CONVERSATION SO FAR:**\n{c}\n\n"),
            None => String::new(),
        };
        format!(
            "You are an expert {bank} customer service assistant. Answer the user's question based ONLY on the provided context.

**CONTEXT FROM {bank} DOCUMENTS:**
{sources}

{history}**USER QUESTION:**
{question}

**INSTRUCTIONS:**
1. Answer the question accurately using ONLY the information from the context above
2. If the context doesn't contain enough information, say \"I don't have specific information about that in the {bank} documents\"
3. Be specific with numbers, rates, and requirements when available
4. Format your answer in a clear, structured way
5. If mentioning documents required, list them as bullet points
6. Always mention this is for {bank}

**ANSWER:**"
        )
    }
}

fn meta_or<'a>(chunk: &'a RetrievedChunk, key: &str, default: &'a str) -> &'a str {
    chunk.metadata.get(key).map(String::as_str).unwrap_or(default)
}

/// `[Source i: source - doc_type/loan_type]` blocks separated by `---`
pub fn format_sources(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Source {}: {} - {}/{}]\n{}\n",
                i + 1,
                meta_or(chunk, "source", "Unknown"),
                meta_or(chunk, "doc_type", "general"),
                meta_or(chunk, "loan_type", "general"),
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn to_source(chunk: &RetrievedChunk) -> Source {
    Source {
        source: meta_or(chunk, "source", "Unknown").to_string(),
        doc_type: meta_or(chunk, "doc_type", "general").to_string(),
        loan_type: meta_or(chunk, "loan_type", "general").to_string(),
        relevance: round_to((1.0 - chunk.distance) * 100.0, 2),
        preview: format!("{}...", truncate_chars(&chunk.text, PREVIEW_CHARS)),
    }
}

impl KnowledgeResponder for RagResponder {
    fn answer(&self, request: &KnowledgeRequest<'_>) -> Result<KnowledgeAnswer, CollaboratorError> {
        let chunks = self
            .retriever
            .retrieve(request.query, request.filters, request.n_results)?;

        if chunks.is_empty() {
            tracing::info!(query = request.query, "no documents matched");
            return Ok(self.not_found());
        }

        let prompt = self.prompt(request.query, &format_sources(&chunks), request.context);
        let answer = self.generator.generate(&GenerationRequest {
            messages: vec![
                ChatMessage::system(format!(
                    "You are an expert {} customer service assistant.",
                    self.bank_name
                )),
                ChatMessage::user(prompt),
            ],
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })?;

        Ok(KnowledgeAnswer {
            answer,
            sources: chunks.iter().map(to_source).collect(),
        })
    }
}

/// Writes campaigns grounded in retrieved product details
pub struct CampaignWriter {
    retriever: Arc<dyn DocumentRetriever>,
    generator: Arc<dyn TextGenerator>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    bank_name: String,
}

impl CampaignWriter {
    pub fn new(
        retriever: Arc<dyn DocumentRetriever>,
        generator: Arc<dyn TextGenerator>,
        settings: &Settings,
    ) -> Self {
        Self {
            retriever,
            generator,
            model: settings.model.clone(),
            temperature: settings.marketing_temperature,
            max_tokens: settings.marketing_max_tokens,
            bank_name: settings.bank_name.clone(),
        }
    }

    fn product_context(
        &self,
        audience: Audience,
        product_type: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        let query = match product_type {
            Some(product) => format!("{audience} {product} features benefits"),
            None => format!("{audience} home loan"),
        };

        let chunks = self.retriever.retrieve(&query, None, PRODUCT_RESULTS)?;
        if chunks.is_empty() {
            return Ok(format!(
                "{} home loan products with competitive rates and flexible eligibility",
                self.bank_name
            ));
        }
        Ok(chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn prompt(&self, format: CampaignFormat, audience: Audience, product: &str) -> String {
        let bank = &self.bank_name;
        format!(
            "You are a creative marketing expert for {bank}.

**TASK:** Create a {format} marketing campaign

**TARGET AUDIENCE:** {audience}
**PRODUCT INFO:**
{product}

**CAMPAIGN REQUIREMENTS:**
1. For {format} format, create appropriate content
2. Target {audience} specifically
3. Highlight key benefits and features from product info
4. Include clear call-to-action
5. Keep tone professional yet engaging
6. Add relevant hashtags if social media
7. Keep within character/word limits for the format

**FORMAT GUIDELINES:**
- Email: Subject + 150-200 word body + CTA
- Social Media: 100-150 words + 3-5 hashtags
- SMS: 160 characters max
- Poster: Headline + 3 key points + tagline
- Blog: Title + 300-400 words with sections

**GENERATE THE CAMPAIGN:**"
        )
    }
}

impl MarketingResponder for CampaignWriter {
    fn generate_campaign(
        &self,
        format: CampaignFormat,
        audience: Audience,
        product_type: Option<&str>,
    ) -> Result<Campaign, CollaboratorError> {
        let product = self.product_context(audience, product_type)?;

        let content = self.generator.generate(&GenerationRequest {
            messages: vec![
                ChatMessage::system(format!(
                    "You are a creative marketing campaign expert for {}.",
                    self.bank_name
                )),
                ChatMessage::user(self.prompt(format, audience, &product)),
            ],
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })?;

        tracing::info!(format = %format, audience = %audience, "campaign generated");
        Ok(Campaign {
            campaign_type: format,
            target_audience: audience,
            product_type: product_type.unwrap_or(DEFAULT_PRODUCT).to_string(),
            content,
            generated_at: Utc::now(),
        })
    }
}
