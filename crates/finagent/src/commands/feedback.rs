use super::Workspace;
use finagent_telemetry::{NewFeedback, RouteLabel};

pub fn run(
    session: String,
    query: String,
    response: String,
    rating: u8,
    comment: String,
    agent: &str,
) -> anyhow::Result<()> {
    let workspace = Workspace::load()?;
    if !workspace.settings.enable_feedback {
        println!("Feedback collection is disabled");
        return Ok(());
    }

    let agent_type: RouteLabel = agent.parse()?;
    let collector = workspace.feedback();
    let id = collector.add_feedback(NewFeedback {
        session_id: session,
        query,
        response,
        rating,
        comment,
        agent_type,
    })?;

    println!("Recorded feedback #{id} ({rating}/5)");
    Ok(())
}
