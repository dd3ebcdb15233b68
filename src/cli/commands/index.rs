//! Index command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;

use super::CommandContext;
use crate::cli::output::IndexStatus;
use crate::services::RetrievalIndex;

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Create the collection if it does not exist
    Init {
        /// Drop and recreate an existing collection
        #[arg(long)]
        recreate: bool,
    },

    /// Remove one document from the index
    Delete {
        /// Document id
        #[arg(required = true)]
        id: String,
    },

    /// Show collection and point count
    Status,
}

pub async fn handle_index(cmd: IndexCommand, ctx: &CommandContext<'_>) -> Result<()> {
    let formatter = ctx.formatter();
    let config = ctx.server.config().snapshot();
    let index = require_index(ctx).await?;

    match cmd {
        IndexCommand::Init { recreate } => {
            let recreate = recreate || config.qdrant.recreate_collection;
            ctx.server
                .ensure_index(recreate)
                .await
                .context("failed to initialize collection")?;
            let verb = if recreate { "Recreated" } else { "Initialized" };
            println!(
                "{}",
                formatter.format_message(&format!(
                    "{} collection '{}' (vector size {})",
                    verb,
                    index.collection(),
                    config.qdrant.vector_size
                ))
            );
        }
        IndexCommand::Delete { id } => {
            index
                .delete(&id)
                .await
                .with_context(|| format!("failed to delete '{}'", id))?;
            println!(
                "{}",
                formatter.format_message(&format!("Deleted '{}' from {}", id, index.collection()))
            );
        }
        IndexCommand::Status => {
            let points = index.count().await.context("failed to reach vector index")?;
            let status = IndexStatus {
                url: config.qdrant.url.clone(),
                collection: index.collection().to_string(),
                vector_size: config.qdrant.vector_size,
                points,
            };
            print!("{}", formatter.format_index_status(&status));
        }
    }

    Ok(())
}

async fn require_index(ctx: &CommandContext<'_>) -> Result<Arc<dyn RetrievalIndex>> {
    let pipeline = ctx.server.pipeline().await;
    pipeline
        .retriever()
        .index()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("vector index is disabled (qdrant.enabled = false)"))
}
