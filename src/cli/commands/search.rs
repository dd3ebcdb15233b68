use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use super::CommandContext;
use crate::models::{FilterOptions, SearchRequest};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long = "top-k", short = 'n', help = "Maximum number of results to return")]
    pub top_k: Option<u32>,

    #[arg(long, short = 't', help = "Minimum score threshold (0.0-1.0)")]
    pub threshold: Option<f64>,

    #[arg(long, help = "Skip reranking and threshold raw similarity scores")]
    pub no_rerank: bool,

    #[arg(
        long,
        help = "Filter options as JSON (e.g. '{\"requiredTags\": [\"billing\"], \"sources\": [\"faq\"]}')"
    )]
    pub filters: Option<String>,
}

pub async fn handle_search(args: SearchArgs, ctx: &CommandContext<'_>) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = ctx.server.config().snapshot();
    let formatter = ctx.formatter();
    let start_time = Instant::now();

    let mut request = SearchRequest::new(query, &config.search);
    if let Some(top_k) = args.top_k {
        if top_k == 0 {
            anyhow::bail!("top-k must be at least 1");
        }
        request = request.with_top_k(top_k);
    }
    if let Some(threshold) = args.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("threshold must be between 0.0 and 1.0");
        }
        request = request.with_score_threshold(threshold);
    }
    if args.no_rerank {
        request = request.with_rerank(false);
    }
    if let Some(raw) = &args.filters {
        let filters: FilterOptions =
            serde_json::from_str(raw).context("failed to parse --filters JSON")?;
        request = request.with_filters(filters);
    }

    if ctx.verbose {
        eprintln!(
            "Searching (topK={}, threshold={}, rerank={})",
            request.top_k, request.score_threshold, request.use_rerank
        );
    }

    let pipeline = ctx.server.pipeline().await;
    let response = pipeline
        .search(&ctx.user_id(), &request)
        .await
        .context("search failed")?;

    if ctx.verbose {
        eprintln!("Search completed in {}ms", start_time.elapsed().as_millis());
    }

    print!("{}", formatter.format_search_response(query, &response));

    Ok(())
}
