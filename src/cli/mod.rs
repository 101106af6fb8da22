use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "examsearch")]
#[command(author, version, about = "Hybrid keyword + semantic search over exam questions")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize examsearch in the current directory
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Import questions from a JSON array file
    Import {
        /// Path to a JSON file of questions
        file: PathBuf,
    },

    /// Rebuild the keyword index from the question store
    Reindex,

    /// Search questions
    Search {
        /// Search query
        query: String,

        /// Search mode
        #[arg(short, long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,

        /// Number of results (defaults to search.default_top_n)
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Only questions with this difficulty
        #[arg(short, long)]
        difficulty: Option<String>,

        /// Only questions carrying this tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Start the REST API server
    Serve {
        /// Address to bind (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show catalog statistics and metrics
    Stats {
        /// Output in Prometheus format
        #[arg(long)]
        prometheus: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchMode {
    Hybrid,
    Semantic,
    Keyword,
}
