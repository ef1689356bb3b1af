pub mod anomalies;
pub mod ask;
pub mod cache;
pub mod clear_session;
pub mod export;
pub mod feedback;
pub mod history;
pub mod ingest;
pub mod stats;
pub mod version;

use anyhow::{bail, Context};
use finagent_core::{
    CampaignWriter, Dispatcher, DocumentRetriever, QueryClassifier, RagResponder, Settings,
    TextGenerator,
};
use finagent_llm::ChatClient;
use finagent_store::{ChunkIndex, ConversationMemory, MetadataFilter, ResponseCache};
use finagent_telemetry::{FeedbackCollector, Paths, PerformanceMonitor};
use std::sync::Arc;

/// Resolved data directory plus the settings stored in it
pub(crate) struct Workspace {
    pub paths: Paths,
    pub settings: Settings,
}

impl Workspace {
    pub fn load() -> anyhow::Result<Self> {
        let paths = Paths::new()?;
        let settings = Settings::load(&paths.config_file());
        Ok(Self { paths, settings })
    }

    pub fn cache(&self) -> anyhow::Result<ResponseCache> {
        ResponseCache::open(&self.paths.cache_db(), self.settings.cache_ttl_hours)
            .context("opening response cache")
    }

    pub fn memory(&self) -> anyhow::Result<ConversationMemory> {
        ConversationMemory::open(&self.paths.memory_db(), self.settings.max_history)
            .context("opening conversation memory")
    }

    pub fn monitor(&self) -> PerformanceMonitor {
        PerformanceMonitor::open(&self.paths.logs_dir())
    }

    pub fn feedback(&self) -> FeedbackCollector {
        FeedbackCollector::open(&self.paths.feedback_dir())
    }

    pub fn chunks(&self) -> anyhow::Result<ChunkIndex> {
        ChunkIndex::open(&self.paths.chunks_db()).context("opening chunk index")
    }

    /// Wire the full dispatcher, honoring the `enable_*` switches
    pub fn dispatcher(&self) -> anyhow::Result<Dispatcher> {
        let settings = &self.settings;
        let client: Arc<dyn TextGenerator> = Arc::new(ChatClient::from_settings(settings)?);
        let retriever: Arc<dyn DocumentRetriever> = Arc::new(self.chunks()?);

        let classifier = QueryClassifier::new(client.clone(), settings);
        let knowledge = Arc::new(RagResponder::new(retriever.clone(), client.clone(), settings));
        let marketing = Arc::new(CampaignWriter::new(retriever, client, settings));

        let mut builder = Dispatcher::builder(classifier, knowledge, marketing)
            .context_turns(settings.context_turns)
            .result_count(settings.result_count);

        if settings.enable_cache {
            builder = builder.cache(Arc::new(self.cache()?));
        }
        if settings.enable_memory {
            builder = builder.memory(Arc::new(self.memory()?));
        }
        if settings.enable_monitoring {
            builder = builder.monitor(Arc::new(self.monitor()));
        }
        if settings.enable_feedback {
            builder = builder.feedback(Arc::new(self.feedback()));
        }

        Ok(builder.build())
    }
}

/// Parse repeated `KEY=VALUE` arguments
pub(crate) fn parse_pairs(pairs: &[String]) -> anyhow::Result<MetadataFilter> {
    let mut map = MetadataFilter::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("expected KEY=VALUE, got '{pair}'");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("empty key in '{pair}'");
        }
        map.insert(key.to_string(), value.trim().to_string());
    }
    Ok(map)
}
