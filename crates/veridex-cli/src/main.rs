//! Veridex command-line interface: wires configuration, tracing, and the
//! research service, then runs one of the control-surface verbs.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use veridex_core::{VeridexError, VeridexResult};
use veridex_engine::{QueryExecutor, ResearchConfig, ResearchEngine, ResearchQueue, ResearchService};
use veridex_oracle::HttpOracleBackend;
use veridex_search::{HttpSearchBackend, PageFetcher, SearchBackend};

#[derive(Parser)]
#[command(name = "veridex", about = "Veridex — evidence-gathering research engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "veridex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full research cycle for a claim and print the report
    Run {
        /// The claim to investigate
        claim: String,
    },
    /// Fan a claim out across every enabled provider for a fast answer
    Quick {
        /// The claim to check
        claim: String,
    },
    /// List configured providers
    Providers,
}

#[derive(Deserialize, Default)]
struct VeridexToml {
    #[serde(default)]
    oracle: OracleSection,
    #[serde(default)]
    search: Option<SearchSection>,
    #[serde(default)]
    research: ResearchConfig,
}

#[derive(Deserialize)]
struct OracleSection {
    #[serde(default = "default_oracle_url")]
    base_url: String,
    #[serde(default)]
    api_key: String,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            base_url: default_oracle_url(),
            api_key: String::new(),
        }
    }
}

#[derive(Deserialize)]
struct SearchSection {
    #[serde(default = "default_search_name")]
    name: String,
    endpoint: String,
    #[serde(default = "default_search_key_header")]
    api_key_header: String,
    #[serde(default)]
    api_key: String,
}

fn default_oracle_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_search_name() -> String {
    "websearch".to_string()
}

fn default_search_key_header() -> String {
    "x-subscription-token".to_string()
}

fn load_config(path: &Path) -> VeridexResult<VeridexToml> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(VeridexToml::default());
    }
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|e| VeridexError::Config(e.to_string()))
}

#[tokio::main]
async fn main() -> VeridexResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = load_config(&cli.config)?;

    if let Commands::Providers = cli.command {
        if file.research.providers.is_empty() {
            println!("no providers configured");
        }
        for p in &file.research.providers {
            println!(
                "{} ({}) -> {} [{}]",
                p.key,
                p.label,
                p.model_id,
                if p.enabled { "enabled" } else { "disabled" }
            );
        }
        return Ok(());
    }

    let config = Arc::new(file.research);
    let oracle = Arc::new(HttpOracleBackend::new(
        &file.oracle.base_url,
        &file.oracle.api_key,
    )?);

    let mut executor = QueryExecutor::new(oracle.clone(), config.clone())
        .with_fetcher(Arc::new(PageFetcher::new()?));
    if let Some(search) = &file.search {
        let backend: Arc<dyn SearchBackend> = Arc::new(HttpSearchBackend::new(
            &search.name,
            &search.endpoint,
            &search.api_key_header,
            &search.api_key,
        )?);
        executor = executor.with_search(backend);
    }

    let engine = Arc::new(ResearchEngine::new(oracle, executor, config));
    let queue = ResearchQueue::new(engine.clone(), None);
    let service = ResearchService::new(engine, queue);

    match cli.command {
        Commands::Run { claim } => println!("{}", service.investigate(&claim).await),
        Commands::Quick { claim } => println!("{}", service.quick_check(&claim).await),
        Commands::Providers => unreachable!(),
    }

    Ok(())
}
