//! Feedback collector: append-only user ratings and satisfaction aggregates

use crate::io::{append_jsonl, read_jsonl, write_json_pretty};
use crate::text::{percentage, round_to, truncate_chars};
use crate::types::{FeedbackEntry, RouteLabel};
use crate::TelemetryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Ratings at or above this count as satisfied
pub const SATISFACTION_THRESHOLD: u8 = 4;
const RESPONSE_PREVIEW_CHARS: usize = 200;
const REPORT_TOP_N: usize = 5;
const FEEDBACK_FILE: &str = "feedbacks.jsonl";

/// A rating submitted by a user
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub session_id: String,
    pub query: String,
    pub response: String,
    pub rating: u8,
    pub comment: String,
    pub agent_type: RouteLabel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRating {
    pub count: usize,
    pub avg_rating: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total_feedbacks: usize,
    pub avg_rating: f64,
    pub satisfaction_rate: f64,
    pub thumbs_up: usize,
    pub thumbs_down: usize,
    pub by_agent_type: BTreeMap<RouteLabel, AgentRating>,
}

#[derive(Debug, Serialize)]
struct FeedbackReport {
    generated_at: DateTime<Utc>,
    stats: FeedbackStats,
    top_negative: Vec<FeedbackEntry>,
    top_positive: Vec<FeedbackEntry>,
}

pub struct FeedbackCollector {
    dir: PathBuf,
    entries: Mutex<Vec<FeedbackEntry>>,
}

impl FeedbackCollector {
    /// Open the collector, loading `feedbacks.jsonl` from `dir`
    pub fn open(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), "cannot create feedback directory: {e}");
        }

        let entries = read_jsonl::<FeedbackEntry>(&dir.join(FEEDBACK_FILE)).unwrap_or_else(|e| {
            tracing::warn!(dir = %dir.display(), "feedback log unreadable, starting empty: {e}");
            Vec::new()
        });
        tracing::debug!(entries = entries.len(), "feedback collector loaded");

        Self {
            dir: dir.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    /// Validate, number and append a rating. Returns the new feedback id.
    pub fn add_feedback(&self, feedback: NewFeedback) -> Result<u64, TelemetryError> {
        if !(1..=5).contains(&feedback.rating) {
            return Err(TelemetryError::InvalidRating(feedback.rating));
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;

        let entry = FeedbackEntry {
            id,
            timestamp: Utc::now(),
            session_id: feedback.session_id,
            query: feedback.query,
            response: truncate_chars(&feedback.response, RESPONSE_PREVIEW_CHARS).to_string(),
            rating: feedback.rating,
            comment: feedback.comment,
            agent_type: feedback.agent_type,
        };

        append_jsonl(&self.dir.join(FEEDBACK_FILE), &entry)?;
        tracing::info!(
            id,
            rating = entry.rating,
            agent = %entry.agent_type,
            satisfied = entry.rating >= SATISFACTION_THRESHOLD,
            "feedback recorded"
        );
        entries.push(entry);
        Ok(id)
    }

    pub fn get_feedback_stats(&self) -> FeedbackStats {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        compute_stats(&entries)
    }

    /// Most recent ratings below the satisfaction threshold, newest first
    pub fn get_negative_feedback(&self, limit: usize) -> Vec<FeedbackEntry> {
        self.newest_where(limit, |e| e.rating < SATISFACTION_THRESHOLD)
    }

    /// Most recent ratings at or above the satisfaction threshold, newest first
    pub fn get_positive_feedback(&self, limit: usize) -> Vec<FeedbackEntry> {
        self.newest_where(limit, |e| e.rating >= SATISFACTION_THRESHOLD)
    }

    fn newest_where(
        &self,
        limit: usize,
        keep: impl Fn(&FeedbackEntry) -> bool,
    ) -> Vec<FeedbackEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut selected: Vec<FeedbackEntry> =
            entries.iter().filter(|e| keep(e)).cloned().collect();
        // ids grow with append order
        selected.sort_by(|a, b| b.id.cmp(&a.id));
        selected.truncate(limit);
        selected
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write stats plus the top negative and positive entries to a JSON file
    pub fn export_feedback_report(&self, path: Option<&Path>) -> Result<PathBuf, TelemetryError> {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => self.dir.join(format!(
                "report_{}.json",
                Utc::now().format("%Y%m%d_%H%M%S")
            )),
        };

        let report = FeedbackReport {
            generated_at: Utc::now(),
            stats: self.get_feedback_stats(),
            top_negative: self.get_negative_feedback(REPORT_TOP_N),
            top_positive: self.get_positive_feedback(REPORT_TOP_N),
        };

        write_json_pretty(&target, &report)?;
        tracing::info!(path = %target.display(), "feedback report exported");
        Ok(target)
    }
}

fn compute_stats(entries: &[FeedbackEntry]) -> FeedbackStats {
    if entries.is_empty() {
        return FeedbackStats::default();
    }

    let total = entries.len();
    let rating_sum: u64 = entries.iter().map(|e| u64::from(e.rating)).sum();
    let satisfied = entries
        .iter()
        .filter(|e| e.rating >= SATISFACTION_THRESHOLD)
        .count();

    let mut grouped: BTreeMap<RouteLabel, (usize, u64)> = BTreeMap::new();
    for entry in entries {
        let slot = grouped.entry(entry.agent_type).or_default();
        slot.0 += 1;
        slot.1 += u64::from(entry.rating);
    }

    FeedbackStats {
        total_feedbacks: total,
        avg_rating: round_to(rating_sum as f64 / total as f64, 2),
        satisfaction_rate: round_to(percentage(satisfied, total), 1),
        thumbs_up: satisfied,
        thumbs_down: total - satisfied,
        by_agent_type: grouped
            .into_iter()
            .map(|(label, (count, sum))| {
                (
                    label,
                    AgentRating {
                        count,
                        avg_rating: round_to(sum as f64 / count as f64, 2),
                    },
                )
            })
            .collect(),
    }
}
