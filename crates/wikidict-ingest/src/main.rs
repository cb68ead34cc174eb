//! wikidict Ingest - Dictionary generation tool

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wikidict_common::logging::{init_logging, LogConfig, LogLevel};
use wikidict_ingest::config::resolve_output;
use wikidict_ingest::progress::StatsSpinner;
use wikidict_ingest::{DumpSource, GenerationOrchestrator, IngestConfig, IngestError, SqliteDictionary};

#[derive(Parser, Debug)]
#[command(name = "wikidict-ingest")]
#[command(author, version, about = "Generate a dictionary from a Wiktionary dump")]
struct Cli {
    /// Dump source, e.g. frwiktionary
    source: String,

    /// Dictionary file; `<source>` is replaced by the source name
    #[arg(short = 'o', long = "dictionary", env = "WIKIDICT_DICTIONARY")]
    dictionary: Option<String>,

    /// Always download, leaving the cache untouched
    #[arg(long)]
    no_cache: bool,

    /// Cache directory for downloaded dumps
    #[arg(long, env = "WIKIDICT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("wikidict-ingest")
        .include_threads(cli.verbose)
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Generation failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let mut builder = IngestConfig::builder().with_base(IngestConfig::from_env()?);
    if cli.no_cache {
        builder = builder.cache_enabled(false);
    }
    if let Some(dir) = cli.cache_dir {
        builder = builder.cache_dir(dir);
    }
    let config = builder.build()?;

    let json = cli.json;
    let source = DumpSource::parse(&cli.source)?;
    let name = source.name();
    let output = match cli.dictionary.as_deref() {
        Some(template) => resolve_output(template, &name),
        None => config.dictionary_path(&name),
    };
    info!(source = %name, output = %output.display(), cache = config.cache_enabled, "Generating dictionary");

    let orchestrator = GenerationOrchestrator::new(config, cancel);
    let spinner = StatsSpinner::start(&name, orchestrator.stats());

    // The pipeline blocks on its own threads; keep the runtime free for signals
    let result = tokio::task::spawn_blocking(move || {
        let dictionary = SqliteDictionary::create(&output)?;
        orchestrator.generate(&source, dictionary)
    })
    .await
    .context("Generation task panicked")?;

    match result {
        Ok((_, report)) => {
            spinner.finish(&format!("{}: {}", name, report.stats));
            if report.from_cache {
                info!("Dump read from cache");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report.stats)?);
            }
            Ok(())
        },
        Err(IngestError::Cancelled) => {
            spinner.finish("cancelled");
            Err(IngestError::Cancelled.into())
        },
        Err(e) => {
            spinner.finish("failed");
            Err(e.into())
        },
    }
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, cancelling"),
        _ = terminate => info!("Received terminate signal, cancelling"),
    }
    token.cancel();
}
