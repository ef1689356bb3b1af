use crate::responders::{Campaign, KnowledgeAnswer};
use finagent_telemetry::{AgentKind, RouteLabel};

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Knowledge(KnowledgeAnswer),
    Marketing(Campaign),
    /// Served from the response cache; no responder ran
    Cached { answer: String },
}

impl DispatchOutcome {
    pub fn answer(&self) -> &str {
        match self {
            DispatchOutcome::Knowledge(k) => &k.answer,
            DispatchOutcome::Marketing(c) => &c.content,
            DispatchOutcome::Cached { answer } => answer,
        }
    }

    pub fn label(&self) -> RouteLabel {
        match self {
            DispatchOutcome::Knowledge(_) => RouteLabel::Knowledge,
            DispatchOutcome::Marketing(_) => RouteLabel::Marketing,
            DispatchOutcome::Cached { .. } => RouteLabel::Cached,
        }
    }

    /// Responder that produced the answer, `None` for cache hits
    pub fn agent(&self) -> Option<AgentKind> {
        match self {
            DispatchOutcome::Knowledge(_) => Some(AgentKind::Knowledge),
            DispatchOutcome::Marketing(_) => Some(AgentKind::Marketing),
            DispatchOutcome::Cached { .. } => None,
        }
    }

    pub fn from_cache(&self) -> bool {
        matches!(self, DispatchOutcome::Cached { .. })
    }
}
