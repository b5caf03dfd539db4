//! CLI argument definitions

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "entropy")]
#[command(author, version, about = "Cost-tiered multi-agent equities Q&A")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question, optionally continuing an existing session
    Chat(ChatArgs),

    /// Run the structured flow trace for a query without storing it in a session
    Diagnostic(DiagnosticArgs),

    /// Report readiness
    Health,
}

#[derive(clap::Args)]
pub struct ChatArgs {
    /// The question to ask
    pub query: Vec<String>,

    /// Session id to continue; defaults to "default"
    #[arg(long, default_value = "default")]
    pub session: String,
}

#[derive(clap::Args)]
pub struct DiagnosticArgs {
    /// The query to trace
    pub query: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
