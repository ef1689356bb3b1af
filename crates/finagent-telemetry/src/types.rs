//! Record types shared by the monitor, the feedback log and the dispatcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which responder handles a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Retrieval-augmented answers about banking products
    Knowledge,
    /// Campaign and promotional content
    Marketing,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Knowledge => "knowledge",
            AgentKind::Marketing => "marketing",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "knowledge" => Ok(AgentKind::Knowledge),
            "marketing" => Ok(AgentKind::Marketing),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// Label recorded against a dispatch in the query log and feedback log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLabel {
    Knowledge,
    Marketing,
    /// Served from the response cache without invoking a responder
    Cached,
    /// Dispatch failed before producing an answer
    Error,
}

impl RouteLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteLabel::Knowledge => "knowledge",
            RouteLabel::Marketing => "marketing",
            RouteLabel::Cached => "cached",
            RouteLabel::Error => "error",
        }
    }
}

impl From<AgentKind> for RouteLabel {
    fn from(kind: AgentKind) -> Self {
        match kind {
            AgentKind::Knowledge => RouteLabel::Knowledge,
            AgentKind::Marketing => RouteLabel::Marketing,
        }
    }
}

impl fmt::Display for RouteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "knowledge" => Ok(RouteLabel::Knowledge),
            "marketing" => Ok(RouteLabel::Marketing),
            "cached" => Ok(RouteLabel::Cached),
            "error" => Ok(RouteLabel::Error),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent label: {0:?}")]
pub struct UnknownLabel(pub String);

/// One dispatch attempt as recorded by the performance monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub query: String,
    pub agent_type: RouteLabel,
    pub response_length: usize,
    pub response_time_seconds: f64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One user rating of a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub query: String,
    pub response: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    pub agent_type: RouteLabel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label_from_agent_kind() {
        assert_eq!(RouteLabel::from(AgentKind::Knowledge), RouteLabel::Knowledge);
        assert_eq!(RouteLabel::from(AgentKind::Marketing), RouteLabel::Marketing);
    }

    #[test]
    fn test_labels_parse_case_insensitively() {
        assert_eq!("Marketing ".parse::<AgentKind>(), Ok(AgentKind::Marketing));
        assert_eq!("CACHED".parse::<RouteLabel>(), Ok(RouteLabel::Cached));
        assert!("support".parse::<RouteLabel>().is_err());
    }

    #[test]
    fn test_log_entry_serializes_snake_case_label() {
        let entry = QueryLogEntry {
            timestamp: Utc::now(),
            session_id: "s1".to_string(),
            query: "What is a home loan?".to_string(),
            agent_type: RouteLabel::Cached,
            response_length: 12,
            response_time_seconds: 0.004,
            success: true,
            error: None,
            metadata: serde_json::Map::new(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"agent_type\":\"cached\""));
    }

    #[test]
    fn test_log_entry_backwards_compatible() {
        let old_json = r#"{"timestamp":"2025-01-01T00:00:00Z","session_id":"s1","query":"q","agent_type":"knowledge","response_length":10,"response_time_seconds":1.2,"success":true}"#;
        let parsed: QueryLogEntry = serde_json::from_str(old_json).unwrap();
        assert_eq!(parsed.error, None);
        assert!(parsed.metadata.is_empty());
    }
}
