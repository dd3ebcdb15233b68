use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use kbsearch::cli::commands::{
    CommandContext, handle_config, handle_estimate, handle_import, handle_index, handle_logs,
    handle_search, handle_serve,
};
use kbsearch::cli::{Cli, Commands};
use kbsearch::server::KnowledgeServer;
use kbsearch::services::{ConfigStore, EventLog};

/// Stderr only; stdout carries command output and the stdio protocol.
fn init_tracing(level: &str, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { level };
        EnvFilter::try_new(format!("kbsearch={level}"))
            .unwrap_or_else(|_| EnvFilter::new("kbsearch=info"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let store = ConfigStore::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let config = store.snapshot();

    init_tracing(&config.logging.level, cli.verbose);

    let log = EventLog::from_config(&config.logging);
    let server = KnowledgeServer::new(Arc::new(store), log.clone())
        .context("failed to initialize search pipeline")?;

    let ctx = CommandContext {
        server: &server,
        user: cli.user.as_deref(),
        format: cli.format.unwrap_or_default(),
        verbose: cli.verbose,
    };

    let outcome = match cli.command {
        Commands::Serve => handle_serve(&ctx).await,
        command => {
            tokio::select! {
                result = run_command(command, &ctx) => result,
                _ = shutdown_signal() => {
                    eprintln!("\nReceived shutdown signal, cleaning up...");
                    Ok(())
                }
            }
        }
    };

    log.shutdown().await;

    if let Err(e) = outcome {
        eprintln!("{}", ctx.formatter().format_error(&format!("{e:#}")));
        std::process::exit(1);
    }

    Ok(())
}

async fn run_command(command: Commands, ctx: &CommandContext<'_>) -> Result<()> {
    match command {
        Commands::Search(args) => handle_search(args, ctx).await,
        Commands::Estimate(args) => handle_estimate(args, ctx).await,
        Commands::Config(cmd) => handle_config(cmd, ctx).await,
        Commands::Import(args) => handle_import(args, ctx).await,
        Commands::Index(cmd) => handle_index(cmd, ctx).await,
        Commands::Logs(cmd) => handle_logs(cmd, ctx).await,
        Commands::Serve => handle_serve(ctx).await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
