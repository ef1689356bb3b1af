//! Query log, feedback log and shared record types for the banking dispatcher

mod error;
pub mod feedback;
mod io;
pub mod monitor;
mod paths;
pub mod text;
mod types;

pub use error::TelemetryError;
pub use feedback::{AgentRating, FeedbackCollector, FeedbackStats, NewFeedback};
pub use io::{append_jsonl, atomic_write, read_jsonl, write_json_pretty};
pub use monitor::{AgentTiming, Anomaly, PerformanceMonitor, PerformanceStats, QueryOutcome};
pub use paths::{Paths, HOME_ENV};
pub use types::{AgentKind, FeedbackEntry, QueryLogEntry, RouteLabel, UnknownLabel};
