#![allow(dead_code)]

use finagent_core::{
    CampaignWriter, ChatMessage, CollaboratorError, Dispatcher, DocumentRetriever,
    GenerationRequest, QueryClassifier, RagResponder, Settings, TextGenerator,
};
use finagent_store::{ChunkIndex, ConversationMemory, MetadataFilter, ResponseCache};
use finagent_telemetry::{FeedbackCollector, Paths, PerformanceMonitor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Any prompt containing this word makes the generator fail
pub const OUTAGE_MARKER: &str = "outage";

/// Stands in for the chat model. Classification requests get `label`;
/// every other request gets a numbered answer and is recorded.
pub struct ScriptedGenerator {
    label: Result<&'static str, &'static str>,
    answers: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn labelling(label: &'static str) -> Self {
        Self {
            label: Ok(label),
            answers: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Classification requests fail with `reason`
    pub fn broken_classifier(reason: &'static str) -> Self {
        Self {
            label: Err(reason),
            ..Self::labelling("knowledge")
        }
    }

    pub fn answer_calls(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn is_classification(request: &GenerationRequest) -> bool {
    request
        .messages
        .first()
        .is_some_and(|m: &ChatMessage| m.content == "You are a query classifier.")
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
        if is_classification(request) {
            return self
                .label
                .map(str::to_string)
                .map_err(|reason| CollaboratorError::Generation(reason.to_string()));
        }

        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let failing = prompt.to_lowercase().contains(OUTAGE_MARKER);
        self.prompts.lock().unwrap().push(prompt);

        if failing {
            return Err(CollaboratorError::Generation("upstream unavailable".to_string()));
        }
        let n = self.answers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("Generated answer #{n}"))
    }
}

pub fn meta(pairs: &[(&str, &str)]) -> MetadataFilter {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn seed_documents(index: &ChunkIndex) {
    index
        .add_chunk(
            "Documents required for a salaried home loan: PAN card, Aadhaar, last 3 months salary slips and 6 months bank statements.",
            &meta(&[
                ("source", "home_loans.pdf"),
                ("doc_type", "documents"),
                ("loan_type", "home"),
            ]),
        )
        .unwrap();
    index
        .add_chunk(
            "Home loan interest rates start at 8.4% per annum for salaried customers.",
            &meta(&[("source", "rates.pdf"), ("doc_type", "rates"), ("loan_type", "home")]),
        )
        .unwrap();
    index
        .add_chunk(
            "Personal loan documents: PAN card, salary slips and a cancelled cheque.",
            &meta(&[
                ("source", "personal_loans.pdf"),
                ("doc_type", "documents"),
                ("loan_type", "personal"),
            ]),
        )
        .unwrap();
}

/// A fully wired dispatcher over on-disk stores in a temp directory
pub struct Harness {
    pub temp: TempDir,
    pub paths: Paths,
    pub settings: Settings,
    pub generator: Arc<ScriptedGenerator>,
    pub cache: Arc<ResponseCache>,
    pub memory: Arc<ConversationMemory>,
    pub monitor: Arc<PerformanceMonitor>,
    pub feedback: Arc<FeedbackCollector>,
    pub dispatcher: Dispatcher,
}

pub fn harness(generator: ScriptedGenerator) -> Harness {
    let temp = TempDir::new().unwrap();
    let paths = Paths::at(temp.path());
    let settings = Settings::new();

    let index = ChunkIndex::open(&paths.chunks_db()).unwrap();
    seed_documents(&index);
    let retriever: Arc<dyn DocumentRetriever> = Arc::new(index);

    let generator = Arc::new(generator);
    let shared: Arc<dyn TextGenerator> = generator.clone();

    let cache = Arc::new(ResponseCache::open(&paths.cache_db(), settings.cache_ttl_hours).unwrap());
    let memory =
        Arc::new(ConversationMemory::open(&paths.memory_db(), settings.max_history).unwrap());
    let monitor = Arc::new(PerformanceMonitor::open(&paths.logs_dir()));
    let feedback = Arc::new(FeedbackCollector::open(&paths.feedback_dir()));

    let dispatcher = Dispatcher::builder(
        QueryClassifier::new(shared.clone(), &settings),
        Arc::new(RagResponder::new(retriever.clone(), shared.clone(), &settings)),
        Arc::new(CampaignWriter::new(retriever, shared, &settings)),
    )
    .cache(cache.clone())
    .memory(memory.clone())
    .monitor(monitor.clone())
    .feedback(feedback.clone())
    .context_turns(settings.context_turns)
    .result_count(settings.result_count)
    .build();

    Harness {
        temp,
        paths,
        settings,
        generator,
        cache,
        memory,
        monitor,
        feedback,
        dispatcher,
    }
}
