use super::Workspace;
use crate::cli::ExportTarget;
use std::path::Path;

pub fn run(target: ExportTarget, output: Option<&Path>) -> anyhow::Result<()> {
    let workspace = Workspace::load()?;

    let path = match target {
        ExportTarget::Metrics => workspace.monitor().export_metrics(output)?,
        ExportTarget::Feedback => workspace.feedback().export_feedback_report(output)?,
    };

    println!("Exported to {}", path.display());
    Ok(())
}
