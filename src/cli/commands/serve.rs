use anyhow::{Context, Result};

use super::CommandContext;
use crate::server::serve_stdio;

pub async fn handle_serve(ctx: &CommandContext<'_>) -> Result<()> {
    let recreate = ctx.server.config().snapshot().qdrant.recreate_collection;
    if let Err(e) = ctx.server.ensure_index(recreate).await {
        // Index errors surface again on each search.
        tracing::warn!(error = %e, "vector index not ready");
    }

    serve_stdio(ctx.server)
        .await
        .context("stdio transport failed")
}
