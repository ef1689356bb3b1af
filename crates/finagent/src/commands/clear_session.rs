use super::Workspace;

pub fn run(session: &str) -> anyhow::Result<()> {
    let memory = Workspace::load()?.memory()?;
    memory.clear_session(session);
    println!("Cleared history for session '{session}'");
    Ok(())
}
