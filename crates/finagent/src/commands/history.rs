use super::Workspace;
use finagent_store::Exchange;
use finagent_telemetry::text::truncate_chars;

const ANSWER_PREVIEW: usize = 300;

fn format_exchange(n: usize, exchange: &Exchange) -> String {
    let answer = truncate_chars(&exchange.agent_response, ANSWER_PREVIEW);
    let ellipsis = if answer.len() < exchange.agent_response.len() {
        "..."
    } else {
        ""
    };
    format!(
        "[{}] {} ({})\n  User: {}\n  Assistant: {answer}{ellipsis}",
        n,
        exchange.timestamp.format("%Y-%m-%d %H:%M:%S"),
        exchange.agent_type,
        exchange.user_query,
    )
}

pub fn run(session: Option<&str>, last: Option<usize>) -> anyhow::Result<()> {
    let memory = Workspace::load()?.memory()?;

    let Some(session) = session else {
        let sessions = memory.list_sessions();
        if sessions.is_empty() {
            println!("No sessions");
        } else {
            println!("Sessions:");
            for s in sessions {
                println!("  {s}");
            }
        }
        return Ok(());
    };

    let history = memory.get_history(session, last);
    if history.is_empty() {
        println!("No history for session '{session}'");
        return Ok(());
    }

    for (i, exchange) in history.iter().enumerate() {
        println!("{}", format_exchange(i + 1, exchange));
    }
    println!();
    println!(
        "{} exchanges shown (up to {} kept per session)",
        history.len(),
        memory.max_history()
    );
    Ok(())
}
