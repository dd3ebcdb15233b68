use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::Value;

use super::CommandContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Show the effective configuration (file merged with environment)")]
    Show,
    #[command(about = "Print one value by dotted path, e.g. search.scoreThreshold")]
    Get {
        #[arg(required = true)]
        path: String,
    },
    #[command(about = "Validate a partial JSON update and write it to the config file")]
    Set {
        #[arg(required = true, help = "Partial configuration as JSON")]
        updates: String,
    },
}

pub async fn handle_config(cmd: ConfigCommand, ctx: &CommandContext<'_>) -> Result<()> {
    let formatter = ctx.formatter();
    let store = ctx.server.config();

    match cmd {
        ConfigCommand::Show => {
            print!("{}", formatter.format_config(&store.snapshot().to_value()));
        }
        ConfigCommand::Get { path } => {
            let value = store
                .get(&path)
                .ok_or_else(|| anyhow::anyhow!("no configuration value at '{}'", path))?;
            match value {
                Value::Object(_) | Value::Array(_) => print!("{}", formatter.format_config(&value)),
                Value::String(s) if ctx.format == crate::models::OutputFormat::Text => {
                    println!("{}", s)
                }
                other => println!("{}", other),
            }
        }
        ConfigCommand::Set { updates } => {
            let partial: Value =
                serde_json::from_str(&updates).context("updates must be a JSON object")?;
            if !partial.is_object() {
                anyhow::bail!("updates must be a JSON object");
            }

            store
                .persist(partial)
                .with_context(|| format!("failed to update {}", store.path().display()))?;

            println!(
                "{}",
                formatter.format_message(&format!(
                    "Configuration saved to {}",
                    store.path().display()
                ))
            );
        }
    }

    Ok(())
}
