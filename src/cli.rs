use std::{net::SocketAddr, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{ingestion::DEFAULT_BATCH_SIZE, retrieval::DEFAULT_LIMIT};

#[derive(Debug, Parser)]
#[command(
    name = "climate-rag",
    about = "Question answering over a climate-change corpus"
)]
pub struct Cli {
    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP API
    Serve(ServeArgs),
    /// Load the corpus, embed every section and store it in the index
    Ingest(IngestArgs),
    /// Semantic search without answer generation
    Search(SearchArgs),
    /// Retrieve passages and ask the language model for an answer
    Query(QueryArgs),
    /// Show service health and collection statistics
    Status(StatusArgs),
    /// Print the chunks the corpus flattens into
    Chunks(ChunksArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Serve --

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Corpus JSON file (overrides JSON_DATA_PATH)
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Drop the collection and create it again before writing
    #[arg(long)]
    pub recreate: bool,

    /// Number of sections embedded per request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The question to search for
    pub question: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
    pub count: usize,

    /// Minimum score threshold
    #[arg(long, default_value = "0.0")]
    pub min_score: f32,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The question to answer
    pub question: String,

    /// Number of passages used as context
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
    pub count: usize,

    /// Minimum score threshold
    #[arg(long, default_value = "0.3")]
    pub min_score: f32,

    /// Only retrieve passages, do not call the language model
    #[arg(long)]
    pub no_llm: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Chunks --

#[derive(Debug, Parser)]
pub struct ChunksArgs {
    /// Corpus JSON file (overrides JSON_DATA_PATH)
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "climate-rag",
            &mut std::io::stdout(),
        );
    }
}
