mod cli;
mod commands;

use clap::Parser;
use cli::{CacheAction, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            query,
            session,
            results,
            filters,
            save_campaign,
        } => commands::ask::run(&query, &session, results, &filters, save_campaign.as_deref()),
        Commands::Feedback {
            session,
            query,
            response,
            rating,
            comment,
            agent,
        } => commands::feedback::run(session, query, response, rating, comment, &agent),
        Commands::Stats { scope } => commands::stats::run(scope),
        Commands::Anomalies => commands::anomalies::run(),
        Commands::History { session, last } => commands::history::run(session.as_deref(), last),
        Commands::ClearSession { session } => commands::clear_session::run(&session),
        Commands::Export { target, output } => commands::export::run(target, output.as_deref()),
        Commands::Cache { action } => match action {
            CacheAction::Sweep => commands::cache::run_sweep(),
            CacheAction::Clear => commands::cache::run_clear(),
        },
        Commands::Ingest { file, meta } => commands::ingest::run(&file, &meta),
        Commands::Version => commands::version::run(),
    }
}
