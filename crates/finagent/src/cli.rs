use clap::{Parser, Subcommand, ValueEnum};
use finagent_core::DEFAULT_SESSION;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "finagent")]
#[command(version)]
#[command(about = "Supervising dispatcher for banking knowledge and marketing queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dispatch a query to the knowledge or marketing responder
    Ask {
        query: String,

        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,

        /// Chunks to retrieve for knowledge answers
        #[arg(short = 'n', long)]
        results: Option<usize>,

        /// Metadata filter as key=value (repeatable)
        #[arg(short, long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Directory to save generated campaigns in
        #[arg(long, value_name = "DIR")]
        save_campaign: Option<PathBuf>,
    },

    /// Rate a response from 1 to 5
    Feedback {
        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,

        #[arg(short, long)]
        query: String,

        #[arg(short, long)]
        response: String,

        #[arg(long)]
        rating: u8,

        #[arg(short, long, default_value = "")]
        comment: String,

        /// knowledge, marketing, cached or error
        #[arg(short, long, default_value = "knowledge")]
        agent: String,
    },

    /// Show cache, performance and feedback statistics
    Stats {
        #[arg(value_enum)]
        scope: Option<StatsScope>,
    },

    /// List slow and failed recent queries
    Anomalies,

    /// Show a session's conversation, or list sessions
    History {
        #[arg(short, long)]
        session: Option<String>,

        /// Most recent exchanges only
        #[arg(short = 'n', long)]
        last: Option<usize>,
    },

    /// Forget a session's conversation history
    #[command(name = "clear-session")]
    ClearSession { session: String },

    /// Write a metrics or feedback report as JSON
    Export {
        #[arg(value_enum)]
        target: ExportTarget,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Maintain the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Index a text file's paragraphs for retrieval
    Ingest {
        file: PathBuf,

        /// Metadata attached to every chunk as key=value (repeatable)
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Print version information
    Version,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum StatsScope {
    Cache,
    Performance,
    Feedback,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum ExportTarget {
    Metrics,
    Feedback,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Remove expired entries
    Sweep,
    /// Remove every entry
    Clear,
}
