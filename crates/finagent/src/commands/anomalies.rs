use super::Workspace;
use finagent_telemetry::Anomaly;

fn describe(anomaly: &Anomaly) -> String {
    match anomaly {
        Anomaly::SlowQuery {
            query,
            time,
            threshold,
        } => format!("SLOW  {time:.3}s (threshold {threshold:.3}s)  {query}"),
        Anomaly::Error { query, error } => format!(
            "ERROR {}  {query}",
            error.as_deref().unwrap_or("unknown error")
        ),
    }
}

pub fn run() -> anyhow::Result<()> {
    let monitor = Workspace::load()?.monitor();
    let anomalies = monitor.detect_anomalies();

    if anomalies.is_empty() {
        println!(
            "No anomalies in recent queries (logs in {})",
            monitor.log_dir().display()
        );
        return Ok(());
    }

    println!("{} anomalies in recent queries:", anomalies.len());
    for anomaly in &anomalies {
        println!("  {}", describe(anomaly));
    }
    Ok(())
}
