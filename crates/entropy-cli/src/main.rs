//! ENTROPY CLI
//!
//! Command-line front end for the cost-tiered multi-agent equities
//! Q&A orchestrator: a thin process wrapper around `entropy_core`.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use entropy_core::config::Config;
use entropy_core::llm::{HttpLLMProvider, LLMClient};
use entropy_core::market::quotes::HttpQuotesSource;
use entropy_core::market::MarketDataTools;
use entropy_core::retrieval::{HashingEmbedder, LexicalIndex, SemanticIndex};
use entropy_core::{EntropyError, Orchestrator, ToolBelt};

mod app;

use app::{Cli, Commands, OutputFormat};

fn quotes_base_url() -> String {
    std::env::var("ENTROPY_QUOTES_URL").unwrap_or_else(|_| "https://quotes.example.invalid".to_string())
}

fn index_cache_dir() -> std::path::PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(entropy_core::CACHE_DIR_NAME)
}

/// Loads the persisted lexical/semantic artifacts from the cache
/// directory, falling back to empty indexes when they aren't present
/// (first run, or a deployment that hasn't refreshed them yet).
fn load_indexes() -> (LexicalIndex, SemanticIndex) {
    let dir = index_cache_dir();

    let lexical = LexicalIndex::load(&dir.join("lexical.json")).unwrap_or_else(|_| LexicalIndex::build(Vec::new()));

    let semantic = SemanticIndex::load(&dir.join("semantic.meta.json"), &dir.join("semantic.vectors.json"))
        .unwrap_or_else(|_| SemanticIndex::empty());

    (lexical, semantic)
}

async fn build_orchestrator(config: Config) -> Orchestrator {
    let provider = Arc::new(HttpLLMProvider::new(config.llm.url.clone(), config.llm.api_key.clone().unwrap_or_default()));
    let llm = Arc::new(LLMClient::new(provider, config.llm.clone()));

    let quotes = Arc::new(HttpQuotesSource::new(quotes_base_url()));
    let market = Arc::new(MarketDataTools::new(quotes));

    let (lexical, semantic) = load_indexes();
    let lexical = Arc::new(lexical);
    let semantic = Arc::new(semantic);
    let embedder = Arc::new(HashingEmbedder);

    let toolbelt = Arc::new(ToolBelt::new(lexical, semantic, config.retrieval.clone(), embedder, market));

    Orchestrator::new(config, llm, toolbelt)
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to serialize response: {e}"),
    }
}

async fn run(cli: Cli) -> Result<(), EntropyError> {
    let config = Config::load()?;

    match &cli.command {
        Commands::Health => {
            let orchestrator = build_orchestrator(config).await;
            let status = orchestrator.health().await;
            match cli.format {
                OutputFormat::Json => print_json(&status),
                OutputFormat::Text => println!("{} (entropy {})", status.status, status.version),
            }
        }
        Commands::Diagnostic(args) => {
            config.require_api_key()?;
            let orchestrator = build_orchestrator(config).await;
            let query = args.query.join(" ");
            let trace = orchestrator.diagnostic(&query).await;
            match cli.format {
                OutputFormat::Json => print_json(&trace),
                OutputFormat::Text => {
                    println!("query: {}", trace.query);
                    println!(
                        "retrieval: success={} results={} tickers={:?}",
                        trace.retrieval.success, trace.retrieval.num_results, trace.retrieval.tickers_found
                    );
                    println!(
                        "market_data: success={} ticker={:?} price={:?}",
                        trace.market_data.success, trace.market_data.ticker_extracted, trace.market_data.current_price
                    );
                    println!(
                        "generation: orchestrator_ready={} specialist_pool_active={}",
                        trace.generation.orchestrator_ready, trace.generation.specialist_pool_active
                    );
                }
            }
        }
        Commands::Chat(args) => {
            config.require_api_key()?;
            let orchestrator = build_orchestrator(config).await;
            let query = args.query.join(" ");
            let response = orchestrator.process_query(&query, &args.session).await;
            match cli.format {
                OutputFormat::Json => print_json(&response),
                OutputFormat::Text => {
                    println!("{}", response.response);
                    if cli.verbose {
                        eprintln!(
                            "[{}] cost=${:.6} prefetch_active={}",
                            response.agent, response.cost_usd, response.prefetch_active
                        );
                    }
                }
            }
            orchestrator.shutdown().await;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
