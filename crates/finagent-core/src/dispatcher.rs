//! Supervising dispatcher: cache, classify, respond, remember, log

use crate::classifier::QueryClassifier;
use crate::error::DispatchError;
use crate::flight::InFlight;
use crate::outcome::DispatchOutcome;
use crate::responders::{KnowledgeRequest, KnowledgeResponder, MarketingResponder};
use crate::rules::campaign_params;
use crate::settings::Settings;
use finagent_store::{
    fingerprint, CacheStats, ConversationMemory, Exchange, MetadataFilter, ResponseCache,
    NO_HISTORY,
};
use finagent_telemetry::{
    AgentKind, FeedbackCollector, FeedbackStats, NewFeedback, PerformanceMonitor,
    PerformanceStats, QueryOutcome, RouteLabel, TelemetryError,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Scope tag used for every cache lookup and write, so repeated queries hit
/// before classification
pub const CACHE_SCOPE: &str = "any";

pub const DEFAULT_SESSION: &str = "default";

/// One query as submitted by a caller
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub query: &'a str,
    pub session_id: &'a str,
    /// Chunks to retrieve; `None` uses the configured count
    pub result_count: Option<usize>,
    pub filters: Option<&'a MetadataFilter>,
}

impl<'a> DispatchRequest<'a> {
    pub fn new(query: &'a str, session_id: &'a str) -> Self {
        Self {
            query,
            session_id,
            result_count: None,
            filters: None,
        }
    }

    pub fn with_result_count(mut self, n: usize) -> Self {
        self.result_count = Some(n);
        self
    }

    pub fn with_filters(mut self, filters: &'a MetadataFilter) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Writes the monitor entry when dropped, so every attempt is logged
/// whether it returns, fails or unwinds
struct DispatchRecord<'a> {
    monitor: Option<&'a PerformanceMonitor>,
    session_id: &'a str,
    query: &'a str,
    started: Instant,
    label: RouteLabel,
    response_length: usize,
    success: bool,
    error: Option<String>,
    metadata: Map<String, Value>,
}

impl<'a> DispatchRecord<'a> {
    fn start(monitor: Option<&'a PerformanceMonitor>, request: &DispatchRequest<'a>) -> Self {
        Self {
            monitor,
            session_id: request.session_id,
            query: request.query,
            started: Instant::now(),
            label: RouteLabel::Error,
            response_length: 0,
            success: false,
            error: Some("dispatch did not complete".to_string()),
            metadata: Map::new(),
        }
    }

    fn succeed(&mut self, outcome: &DispatchOutcome) {
        self.label = outcome.label();
        self.response_length = outcome.answer().chars().count();
        self.success = true;
        self.error = None;
        self.metadata
            .insert("from_cache".to_string(), json!(outcome.from_cache()));
    }

    fn fail(&mut self, error: &DispatchError) {
        self.label = RouteLabel::Error;
        self.success = false;
        self.error = Some(error.to_string());
    }
}

impl Drop for DispatchRecord<'_> {
    fn drop(&mut self) {
        let Some(monitor) = self.monitor else {
            return;
        };
        monitor.log_query(QueryOutcome {
            session_id: self.session_id.to_string(),
            query: self.query.to_string(),
            agent_type: self.label,
            response_length: self.response_length,
            response_time: self.started.elapsed(),
            success: self.success,
            error: self.error.take(),
            metadata: std::mem::take(&mut self.metadata),
        });
    }
}

pub struct Dispatcher {
    classifier: QueryClassifier,
    knowledge: Arc<dyn KnowledgeResponder>,
    marketing: Arc<dyn MarketingResponder>,
    cache: Option<Arc<ResponseCache>>,
    memory: Option<Arc<ConversationMemory>>,
    monitor: Option<Arc<PerformanceMonitor>>,
    feedback: Option<Arc<FeedbackCollector>>,
    context_turns: usize,
    result_count: usize,
    in_flight: InFlight,
}

impl Dispatcher {
    pub fn builder(
        classifier: QueryClassifier,
        knowledge: Arc<dyn KnowledgeResponder>,
        marketing: Arc<dyn MarketingResponder>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            classifier,
            knowledge,
            marketing,
            cache: None,
            memory: None,
            monitor: None,
            feedback: None,
            context_turns: Settings::new().context_turns,
            result_count: Settings::new().result_count,
        }
    }

    /// Answer a query. The outcome is logged to the monitor whether or not
    /// dispatch succeeds; errors are returned after logging.
    pub fn dispatch(
        &self,
        request: &DispatchRequest<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut record = DispatchRecord::start(self.monitor.as_deref(), request);

        let result = self.route(request);
        match &result {
            Ok(outcome) => record.succeed(outcome),
            Err(e) => record.fail(e),
        }
        result
    }

    fn route(&self, request: &DispatchRequest<'_>) -> Result<DispatchOutcome, DispatchError> {
        let query = request.query;
        if query.trim().is_empty() {
            return Err(DispatchError::EmptyQuery);
        }

        if let Some(answer) = self
            .cache
            .as_ref()
            .and_then(|c| c.get(query, CACHE_SCOPE, request.filters))
        {
            return Ok(DispatchOutcome::Cached { answer });
        }

        // Identical concurrent queries wait here; the loser finds the winner's answer
        let _flight = self.cache.as_ref().map(|_| {
            self.in_flight
                .acquire(fingerprint(query, CACHE_SCOPE, request.filters))
        });
        if let Some(answer) = self
            .cache
            .as_ref()
            .and_then(|c| c.peek(query, CACHE_SCOPE, request.filters))
        {
            return Ok(DispatchOutcome::Cached { answer });
        }

        let context = self.memory.as_ref().and_then(|m| {
            let rendered = m.get_context_string(request.session_id, self.context_turns);
            (rendered != NO_HISTORY).then_some(rendered)
        });

        let kind = self
            .classifier
            .classify(query)
            .map_err(DispatchError::Classification)?;
        tracing::info!(agent = %kind, session_id = request.session_id, "routing query");

        let mut exchange_meta = Map::new();
        let outcome = match kind {
            AgentKind::Knowledge => {
                let answer = self
                    .knowledge
                    .answer(&KnowledgeRequest {
                        query,
                        filters: request.filters,
                        n_results: request.result_count.unwrap_or(self.result_count),
                        context: context.as_deref(),
                    })
                    .map_err(|source| DispatchError::Responder { agent: kind, source })?;
                exchange_meta.insert("source_count".to_string(), json!(answer.sources.len()));
                DispatchOutcome::Knowledge(answer)
            }
            AgentKind::Marketing => {
                let params = campaign_params(query);
                let campaign = self
                    .marketing
                    .generate_campaign(params.format, params.audience, None)
                    .map_err(|source| DispatchError::Responder { agent: kind, source })?;
                exchange_meta.insert("campaign_type".to_string(), json!(params.format));
                exchange_meta.insert("target_audience".to_string(), json!(params.audience));
                DispatchOutcome::Marketing(campaign)
            }
        };

        if let Some(cache) = &self.cache {
            cache.set_routed(query, CACHE_SCOPE, kind, outcome.answer(), request.filters);
        }
        if let Some(memory) = &self.memory {
            memory.add_exchange(
                request.session_id,
                query,
                outcome.answer(),
                kind,
                Some(exchange_meta),
            );
        }

        Ok(outcome)
    }

    /// Record a rating. Returns `None` when feedback collection is disabled.
    pub fn submit_feedback(&self, feedback: NewFeedback) -> Result<Option<u64>, TelemetryError> {
        match &self.feedback {
            Some(collector) => collector.add_feedback(feedback).map(Some),
            None => Ok(None),
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.get_stats())
    }

    pub fn performance_stats(&self) -> Option<PerformanceStats> {
        self.monitor.as_ref().map(|m| m.get_stats())
    }

    pub fn feedback_stats(&self) -> Option<FeedbackStats> {
        self.feedback.as_ref().map(|f| f.get_feedback_stats())
    }

    pub fn clear_session(&self, session_id: &str) {
        if let Some(memory) = &self.memory {
            memory.clear_session(session_id);
        }
    }

    pub fn history(&self, session_id: &str, last_n: Option<usize>) -> Vec<Exchange> {
        self.memory
            .as_ref()
            .map(|m| m.get_history(session_id, last_n))
            .unwrap_or_default()
    }
}

pub struct DispatcherBuilder {
    classifier: QueryClassifier,
    knowledge: Arc<dyn KnowledgeResponder>,
    marketing: Arc<dyn MarketingResponder>,
    cache: Option<Arc<ResponseCache>>,
    memory: Option<Arc<ConversationMemory>>,
    monitor: Option<Arc<PerformanceMonitor>>,
    feedback: Option<Arc<FeedbackCollector>>,
    context_turns: usize,
    result_count: usize,
}

impl DispatcherBuilder {
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn feedback(mut self, feedback: Arc<FeedbackCollector>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn context_turns(mut self, n: usize) -> Self {
        self.context_turns = n;
        self
    }

    pub fn result_count(mut self, n: usize) -> Self {
        self.result_count = n;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            classifier: self.classifier,
            knowledge: self.knowledge,
            marketing: self.marketing,
            cache: self.cache,
            memory: self.memory,
            monitor: self.monitor,
            feedback: self.feedback,
            context_turns: self.context_turns,
            result_count: self.result_count,
            in_flight: InFlight::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorError, GenerationRequest, TextGenerator};
    use crate::responders::{Campaign, KnowledgeAnswer};
    use crate::rules::{Audience, CampaignFormat};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Label(&'static str);

    impl TextGenerator for Label {
        fn generate(&self, _request: &GenerationRequest) -> Result<String, CollaboratorError> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    struct Knowledge {
        calls: AtomicUsize,
        contexts: Mutex<Vec<Option<String>>>,
        fail: bool,
    }

    impl KnowledgeResponder for Knowledge {
        fn answer(
            &self,
            request: &KnowledgeRequest<'_>,
        ) -> Result<KnowledgeAnswer, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.contexts
                .lock()
                .unwrap()
                .push(request.context.map(str::to_string));
            if self.fail {
                return Err(CollaboratorError::Retrieval("index offline".to_string()));
            }
            Ok(KnowledgeAnswer {
                answer: format!("answer to {}", request.query),
                sources: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct Marketing {
        seen: Mutex<Vec<(CampaignFormat, Audience)>>,
    }

    impl MarketingResponder for Marketing {
        fn generate_campaign(
            &self,
            format: CampaignFormat,
            audience: Audience,
            product_type: Option<&str>,
        ) -> Result<Campaign, CollaboratorError> {
            self.seen.lock().unwrap().push((format, audience));
            Ok(Campaign {
                campaign_type: format,
                target_audience: audience,
                product_type: product_type.unwrap_or("home_loan").to_string(),
                content: "Own your dream home today!".to_string(),
                generated_at: Utc::now(),
            })
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        knowledge: Arc<Knowledge>,
        marketing: Arc<Marketing>,
        monitor: Arc<PerformanceMonitor>,
        memory: Arc<ConversationMemory>,
        _temp: tempfile::TempDir,
    }

    fn fixture(label: &'static str, knowledge: Knowledge) -> Fixture {
        let temp = tempfile::TempDir::new().unwrap();
        let knowledge = Arc::new(knowledge);
        let marketing = Arc::new(Marketing::default());
        let monitor = Arc::new(PerformanceMonitor::open(&temp.path().join("logs")));
        let memory = Arc::new(ConversationMemory::in_memory(10).unwrap());

        let dispatcher = Dispatcher::builder(
            QueryClassifier::new(Arc::new(Label(label)), &Settings::new()),
            knowledge.clone(),
            marketing.clone(),
        )
        .cache(Arc::new(ResponseCache::in_memory(24).unwrap()))
        .memory(memory.clone())
        .monitor(monitor.clone())
        .build();

        Fixture {
            dispatcher,
            knowledge,
            marketing,
            monitor,
            memory,
            _temp: temp,
        }
    }

    #[test]
    fn test_second_identical_query_is_cached() {
        let f = fixture("knowledge", Knowledge::default());
        let request = DispatchRequest::new("What is the home loan tenure?", "s1");

        let first = f.dispatcher.dispatch(&request).unwrap();
        assert_eq!(first.label(), RouteLabel::Knowledge);

        let second = f
            .dispatcher
            .dispatch(&DispatchRequest::new("what is the home loan tenure?  ", "s1"))
            .unwrap();
        assert!(second.from_cache());
        assert_eq!(second.answer(), first.answer());
        assert_eq!(f.knowledge.calls.load(Ordering::SeqCst), 1);

        let stats = f.monitor.get_stats();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.by_agent_type[&RouteLabel::Cached].count, 1);
        // Cache hits are not remembered as exchanges
        assert_eq!(f.memory.get_history("s1", None).len(), 1);
    }

    #[test]
    fn test_marketing_parameters_from_rules() {
        let f = fixture("marketing", Knowledge::default());
        let outcome = f
            .dispatcher
            .dispatch(&DispatchRequest::new("Write an email for self-employed customers", "s1"))
            .unwrap();

        assert_eq!(outcome.agent(), Some(AgentKind::Marketing));
        assert_eq!(
            f.marketing.seen.lock().unwrap()[0],
            (CampaignFormat::Email, Audience::SelfEmployed)
        );

        let history = f.memory.get_history("s1", None);
        assert_eq!(history[0].metadata["campaign_type"], "email");
        assert_eq!(history[0].metadata["target_audience"], "self_employed");
    }

    #[test]
    fn test_failure_is_logged_then_returned() {
        let f = fixture(
            "knowledge",
            Knowledge {
                fail: true,
                ..Knowledge::default()
            },
        );

        let err = f
            .dispatcher
            .dispatch(&DispatchRequest::new("What are the fees?", "s1"))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Responder {
                agent: AgentKind::Knowledge,
                ..
            }
        ));

        let entries = f.monitor.recent(1);
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
        assert_eq!(entries[0].agent_type, RouteLabel::Error);
        assert!(entries[0].error.as_deref().unwrap().contains("index offline"));
        assert!(f.memory.get_history("s1", None).is_empty());
        assert_eq!(f.dispatcher.cache_stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_empty_query_is_rejected_and_logged() {
        let f = fixture("knowledge", Knowledge::default());
        assert!(matches!(
            f.dispatcher.dispatch(&DispatchRequest::new("   ", "s1")),
            Err(DispatchError::EmptyQuery)
        ));
        assert_eq!(f.monitor.get_stats().error_count, 1);
    }

    #[test]
    fn test_memory_context_reaches_knowledge_responder() {
        let f = fixture("knowledge", Knowledge::default());
        f.dispatcher
            .dispatch(&DispatchRequest::new("What is EMI?", "s1"))
            .unwrap();
        f.dispatcher
            .dispatch(&DispatchRequest::new("And for 20 years?", "s1"))
            .unwrap();

        let contexts = f.knowledge.contexts.lock().unwrap();
        assert_eq!(contexts[0], None);
        let second = contexts[1].as_deref().unwrap();
        assert!(second.starts_with("Previous conversation:"));
        assert!(second.contains("User: What is EMI?"));
    }

    #[test]
    fn test_filters_partition_the_cache() {
        let f = fixture("knowledge", Knowledge::default());
        let mut home = MetadataFilter::new();
        home.insert("loan_type".to_string(), "home".to_string());

        f.dispatcher
            .dispatch(&DispatchRequest::new("rates?", "s1").with_filters(&home))
            .unwrap();
        let unfiltered = f
            .dispatcher
            .dispatch(&DispatchRequest::new("rates?", "s1"))
            .unwrap();

        assert!(!unfiltered.from_cache());
        assert_eq!(f.knowledge.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_works_without_optional_subsystems() {
        let dispatcher = Dispatcher::builder(
            QueryClassifier::new(Arc::new(Label("knowledge")), &Settings::new()),
            Arc::new(Knowledge::default()),
            Arc::new(Marketing::default()),
        )
        .build();

        let request = DispatchRequest::new("What is a CIBIL score?", "s1");
        assert!(!dispatcher.dispatch(&request).unwrap().from_cache());
        assert!(!dispatcher.dispatch(&request).unwrap().from_cache());
        assert!(dispatcher.cache_stats().is_none());
        assert!(dispatcher.history("s1", None).is_empty());
        let recorded = dispatcher
            .submit_feedback(NewFeedback {
                session_id: "s1".to_string(),
                query: "q".to_string(),
                response: "r".to_string(),
                rating: 5,
                comment: String::new(),
                agent_type: RouteLabel::Knowledge,
            })
            .unwrap();
        assert_eq!(recorded, None);
    }
}
