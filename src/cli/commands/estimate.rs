use anyhow::Result;
use clap::Args;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct EstimateArgs {
    #[arg(required = true, help = "Query text to price")]
    pub query: String,

    #[arg(long, help = "Leave rerank cost out of the estimate")]
    pub no_rerank: bool,
}

pub async fn handle_estimate(args: EstimateArgs, ctx: &CommandContext<'_>) -> Result<()> {
    let config = ctx.server.config().snapshot();
    if !config.system.enable_cost_estimation {
        anyhow::bail!("cost estimation is disabled (system.enableCostEstimation = false)");
    }

    let pipeline = ctx.server.pipeline().await;
    let estimate = pipeline.estimate(&ctx.user_id(), &args.query, !args.no_rerank);

    print!("{}", ctx.formatter().format_estimate(&estimate));
    Ok(())
}
