use super::Workspace;
use crate::cli::StatsScope;
use finagent_store::CacheStats;
use finagent_telemetry::{FeedbackStats, PerformanceStats};

fn format_cache(stats: &CacheStats) -> String {
    let mut out = format!(
        "Cache:\n  Entries: {}\n  Hit rate: {:.2}%\n  Miss rate: {:.2}%\n  Hits / misses: {} / {}\n  TTL: {}h",
        stats.total_entries,
        stats.hit_rate,
        stats.miss_rate,
        stats.total_hits,
        stats.total_misses,
        stats.ttl_hours
    );
    for (agent, count) in &stats.by_agent_type {
        out.push_str(&format!("\n  {agent}: {count}"));
    }
    out
}

fn format_performance(stats: &PerformanceStats) -> String {
    if stats.total_queries == 0 {
        return "Performance:\n  No queries logged".to_string();
    }
    let mut out = format!(
        "Performance:\n  Queries: {}\n  Success rate: {:.2}%\n  Errors: {}\n  Avg response: {:.3}s",
        stats.total_queries, stats.success_rate, stats.error_count, stats.avg_response_time
    );
    for (label, timing) in &stats.by_agent_type {
        out.push_str(&format!(
            "\n  {label}: {} queries, avg {:.3}s",
            timing.count, timing.avg_time
        ));
    }
    out
}

fn format_feedback(stats: &FeedbackStats) -> String {
    if stats.total_feedbacks == 0 {
        return "Feedback:\n  No feedback recorded".to_string();
    }
    let mut out = format!(
        "Feedback:\n  Total: {}\n  Avg rating: {:.2}\n  Satisfaction: {:.2}%\n  Thumbs up / down: {} / {}",
        stats.total_feedbacks,
        stats.avg_rating,
        stats.satisfaction_rate,
        stats.thumbs_up,
        stats.thumbs_down
    );
    for (label, rating) in &stats.by_agent_type {
        out.push_str(&format!(
            "\n  {label}: {} ratings, avg {:.2}",
            rating.count, rating.avg_rating
        ));
    }
    out
}

pub fn run(scope: Option<StatsScope>) -> anyhow::Result<()> {
    let workspace = Workspace::load()?;
    let show = |s: StatsScope| scope.map_or(true, |wanted| wanted == s);

    let mut sections = Vec::new();
    if show(StatsScope::Cache) {
        sections.push(format_cache(&workspace.cache()?.get_stats()));
    }
    if show(StatsScope::Performance) {
        sections.push(format_performance(&workspace.monitor().get_stats()));
    }
    if show(StatsScope::Feedback) {
        sections.push(format_feedback(&workspace.feedback().get_feedback_stats()));
    }

    println!("{}", sections.join("\n\n"));
    Ok(())
}
