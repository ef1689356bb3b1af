//! Performance monitor: append-only query log with derived stats and anomaly checks

use crate::io::{append_jsonl, read_jsonl, write_json_pretty};
use crate::text::{percentage, round_to, truncate_chars};
use crate::types::{QueryLogEntry, RouteLabel};
use crate::TelemetryError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Entries examined by the anomaly detector
const ANOMALY_WINDOW: usize = 10;
/// Below this many entries the mean is not a usable baseline
const MIN_BASELINE_ENTRIES: usize = 5;
/// A query is slow when it takes longer than this multiple of the mean
const SLOW_FACTOR: f64 = 2.0;
/// Entries included in a metrics export
const EXPORT_RECENT: usize = 20;
const QUERY_PREVIEW_CHARS: usize = 50;

/// Outcome of one dispatch attempt, as handed to [`PerformanceMonitor::log_query`]
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub session_id: String,
    pub query: String,
    pub agent_type: RouteLabel,
    pub response_length: usize,
    pub response_time: Duration,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentTiming {
    pub count: usize,
    pub avg_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_queries: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub by_agent_type: BTreeMap<RouteLabel, AgentTiming>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    SlowQuery {
        query: String,
        time: f64,
        threshold: f64,
    },
    Error {
        query: String,
        error: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct MetricsSnapshot<'a> {
    stats: PerformanceStats,
    anomalies: Vec<Anomaly>,
    recent_queries: &'a [QueryLogEntry],
}

pub struct PerformanceMonitor {
    log_dir: PathBuf,
    entries: Mutex<Vec<QueryLogEntry>>,
}

impl PerformanceMonitor {
    /// Open the monitor, loading every `queries_*.jsonl` file under `log_dir`
    pub fn open(log_dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            tracing::warn!(dir = %log_dir.display(), "cannot create log directory: {e}");
        }

        let entries = load_logs(log_dir);
        tracing::debug!(entries = entries.len(), "performance monitor loaded");

        Self {
            log_dir: log_dir.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Record a dispatch attempt. Persistence is best effort; this never fails.
    pub fn log_query(&self, outcome: QueryOutcome) {
        let entry = QueryLogEntry {
            timestamp: Utc::now(),
            session_id: outcome.session_id,
            query: outcome.query,
            agent_type: outcome.agent_type,
            response_length: outcome.response_length,
            response_time_seconds: round_to(outcome.response_time.as_secs_f64(), 3),
            success: outcome.success,
            error: outcome.error,
            metadata: outcome.metadata,
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let path = self.daily_log_path(&entry);
        if let Err(e) = append_jsonl(&path, &entry) {
            tracing::warn!(path = %path.display(), "failed to persist query log entry: {e}");
        }

        if entry.success {
            tracing::info!(
                agent = %entry.agent_type,
                seconds = entry.response_time_seconds,
                query = truncate_chars(&entry.query, QUERY_PREVIEW_CHARS),
                "query served"
            );
        } else {
            tracing::warn!(
                agent = %entry.agent_type,
                seconds = entry.response_time_seconds,
                error = entry.error.as_deref().unwrap_or(""),
                "query failed"
            );
        }

        entries.push(entry);
    }

    fn daily_log_path(&self, entry: &QueryLogEntry) -> PathBuf {
        self.log_dir
            .join(format!("queries_{}.jsonl", entry.timestamp.format("%Y%m%d")))
    }

    /// Aggregate statistics over the full log
    pub fn get_stats(&self) -> PerformanceStats {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        compute_stats(&entries)
    }

    /// Flag slow and failed queries among the most recent entries
    pub fn detect_anomalies(&self) -> Vec<Anomaly> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        find_anomalies(&entries)
    }

    /// Most recent `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<QueryLogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write stats, anomalies and the latest entries to a JSON file
    pub fn export_metrics(&self, path: Option<&Path>) -> Result<PathBuf, TelemetryError> {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => self.log_dir.join(format!(
                "metrics_{}.json",
                Utc::now().format("%Y%m%d_%H%M%S")
            )),
        };

        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let start = entries.len().saturating_sub(EXPORT_RECENT);
        let snapshot = MetricsSnapshot {
            stats: compute_stats(&entries),
            anomalies: find_anomalies(&entries),
            recent_queries: &entries[start..],
        };

        write_json_pretty(&target, &snapshot)?;
        tracing::info!(path = %target.display(), "metrics exported");
        Ok(target)
    }
}

fn load_logs(log_dir: &Path) -> Vec<QueryLogEntry> {
    let dir = match std::fs::read_dir(log_dir) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(dir = %log_dir.display(), "cannot read log directory: {e}");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("queries_") && n.ends_with(".jsonl"))
        })
        .collect();
    // queries_YYYYMMDD sorts chronologically by name
    files.sort();

    let mut entries = Vec::new();
    for file in files {
        match read_jsonl::<QueryLogEntry>(&file) {
            Ok(mut records) => entries.append(&mut records),
            Err(e) => tracing::warn!(path = %file.display(), "skipping unreadable log: {e}"),
        }
    }
    entries
}

fn compute_stats(entries: &[QueryLogEntry]) -> PerformanceStats {
    if entries.is_empty() {
        return PerformanceStats::default();
    }

    let total = entries.len();
    let successes = entries.iter().filter(|e| e.success).count();
    let avg_time = mean_response_time(entries);

    let mut grouped: BTreeMap<RouteLabel, Vec<f64>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.agent_type)
            .or_default()
            .push(entry.response_time_seconds);
    }

    let by_agent_type = grouped
        .into_iter()
        .map(|(label, times)| {
            let avg = times.iter().sum::<f64>() / times.len() as f64;
            (
                label,
                AgentTiming {
                    count: times.len(),
                    avg_time: round_to(avg, 3),
                },
            )
        })
        .collect();

    PerformanceStats {
        total_queries: total,
        success_count: successes,
        error_count: total - successes,
        success_rate: round_to(percentage(successes, total), 2),
        avg_response_time: round_to(avg_time, 3),
        by_agent_type,
    }
}

fn mean_response_time(entries: &[QueryLogEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    entries.iter().map(|e| e.response_time_seconds).sum::<f64>() / entries.len() as f64
}

// Baseline is the all-time mean; the window only limits which entries get flagged.
fn find_anomalies(entries: &[QueryLogEntry]) -> Vec<Anomaly> {
    if entries.len() < MIN_BASELINE_ENTRIES {
        return Vec::new();
    }

    let threshold = mean_response_time(entries) * SLOW_FACTOR;
    let start = entries.len().saturating_sub(ANOMALY_WINDOW);

    let mut anomalies = Vec::new();
    for entry in &entries[start..] {
        let query = truncate_chars(&entry.query, QUERY_PREVIEW_CHARS).to_string();

        if entry.response_time_seconds > threshold {
            anomalies.push(Anomaly::SlowQuery {
                query: query.clone(),
                time: entry.response_time_seconds,
                threshold: round_to(threshold, 2),
            });
        }

        if !entry.success {
            anomalies.push(Anomaly::Error {
                query,
                error: entry.error.clone(),
            });
        }
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(agent: RouteLabel, seconds: f64, success: bool) -> QueryOutcome {
        QueryOutcome {
            session_id: "s1".to_string(),
            query: "What is the eligibility for a home loan?".to_string(),
            agent_type: agent,
            response_length: 120,
            response_time: Duration::from_secs_f64(seconds),
            success,
            error: (!success).then(|| "generation failed".to_string()),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let temp = tempfile::TempDir::new().unwrap();
        let monitor = PerformanceMonitor::open(temp.path());

        let stats = monitor.get_stats();
        assert_eq!(stats.total_queries, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_response_time, 0.0);
        assert!(stats.by_agent_type.is_empty());
    }

    #[test]
    fn test_stats_by_agent() {
        let temp = tempfile::TempDir::new().unwrap();
        let monitor = PerformanceMonitor::open(temp.path());

        monitor.log_query(outcome(RouteLabel::Knowledge, 1.0, true));
        monitor.log_query(outcome(RouteLabel::Knowledge, 2.0, true));
        monitor.log_query(outcome(RouteLabel::Marketing, 3.0, true));
        monitor.log_query(outcome(RouteLabel::Error, 0.5, false));

        let stats = monitor.get_stats();
        assert_eq!(stats.total_queries, 4);
        assert_eq!(stats.success_count, 3);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.avg_response_time, 1.625);
        assert_eq!(
            stats.by_agent_type[&RouteLabel::Knowledge],
            AgentTiming {
                count: 2,
                avg_time: 1.5
            }
        );
        assert_eq!(stats.by_agent_type[&RouteLabel::Marketing].count, 1);
    }

    #[test]
    fn test_anomaly_floor() {
        let temp = tempfile::TempDir::new().unwrap();
        let monitor = PerformanceMonitor::open(temp.path());

        monitor.log_query(outcome(RouteLabel::Knowledge, 0.1, true));
        monitor.log_query(outcome(RouteLabel::Knowledge, 0.1, true));
        monitor.log_query(outcome(RouteLabel::Knowledge, 0.1, true));
        monitor.log_query(outcome(RouteLabel::Knowledge, 90.0, false));

        assert!(monitor.detect_anomalies().is_empty());
    }

    #[test]
    fn test_detects_slow_and_failed_queries() {
        let temp = tempfile::TempDir::new().unwrap();
        let monitor = PerformanceMonitor::open(temp.path());

        for _ in 0..5 {
            monitor.log_query(outcome(RouteLabel::Knowledge, 1.0, true));
        }
        monitor.log_query(outcome(RouteLabel::Marketing, 10.0, true));
        monitor.log_query(outcome(RouteLabel::Error, 0.2, false));

        let anomalies = monitor.detect_anomalies();
        assert_eq!(anomalies.len(), 2);
        assert!(matches!(
            &anomalies[0],
            Anomaly::SlowQuery { time, .. } if *time == 10.0
        ));
        assert!(matches!(
            &anomalies[1],
            Anomaly::Error { error: Some(e), .. } if e == "generation failed"
        ));
    }

    #[test]
    fn test_anomaly_window_ignores_old_entries() {
        let temp = tempfile::TempDir::new().unwrap();
        let monitor = PerformanceMonitor::open(temp.path());

        monitor.log_query(outcome(RouteLabel::Error, 0.1, false));
        for _ in 0..ANOMALY_WINDOW {
            monitor.log_query(outcome(RouteLabel::Knowledge, 1.0, true));
        }

        assert!(monitor.detect_anomalies().is_empty());
    }

    #[test]
    fn test_reload_from_daily_logs() {
        let temp = tempfile::TempDir::new().unwrap();
        {
            let monitor = PerformanceMonitor::open(temp.path());
            monitor.log_query(outcome(RouteLabel::Knowledge, 1.2, true));
            monitor.log_query(outcome(RouteLabel::Error, 0.3, false));
        }

        let files: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(files.iter().any(|f| f.starts_with("queries_")));

        let reopened = PerformanceMonitor::open(temp.path());
        assert_eq!(reopened.log_dir(), temp.path());
        let stats = reopened.get_stats();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn test_export_does_not_change_state() {
        let temp = tempfile::TempDir::new().unwrap();
        let monitor = PerformanceMonitor::open(temp.path());
        monitor.log_query(outcome(RouteLabel::Knowledge, 1.0, true));

        let target = temp.path().join("out").join("metrics.json");
        let written = monitor.export_metrics(Some(&target)).unwrap();
        assert_eq!(written, target);

        let snapshot: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(snapshot["stats"]["total_queries"], 1);
        assert_eq!(snapshot["recent_queries"].as_array().unwrap().len(), 1);
        assert!(snapshot["anomalies"].as_array().unwrap().is_empty());
        assert_eq!(monitor.len(), 1);
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let temp = tempfile::TempDir::new().unwrap();
        let monitor = PerformanceMonitor::open(temp.path());
        monitor.log_query(outcome(RouteLabel::Knowledge, 1.0, true));
        monitor.log_query(outcome(RouteLabel::Marketing, 2.0, true));
        monitor.log_query(outcome(RouteLabel::Cached, 0.01, true));

        let recent = monitor.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].agent_type, RouteLabel::Marketing);
        assert_eq!(recent[1].agent_type, RouteLabel::Cached);
    }
}
