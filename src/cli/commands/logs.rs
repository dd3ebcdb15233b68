use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Subcommand;

use super::CommandContext;

#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    /// Print the user's log entries, oldest first
    Show {
        /// Number of days back to include (1 = today only)
        #[arg(long, short = 'd', default_value_t = 1)]
        days: u32,
    },

    /// Delete day-files older than the retention window
    Rotate {
        /// Days to keep (defaults to logging.rotateDays)
        #[arg(long)]
        keep_days: Option<u32>,

        /// Rotate every user's logs, not just the current user's
        #[arg(long)]
        all: bool,
    },
}

pub async fn handle_logs(cmd: LogsCommand, ctx: &CommandContext<'_>) -> Result<()> {
    let formatter = ctx.formatter();
    let config = ctx.server.config().snapshot();
    let log = ctx.server.event_log();

    if !log.is_enabled() {
        anyhow::bail!("event logging is disabled (logging.enabled = false)");
    }

    let user = ctx.user_id();
    match cmd {
        LogsCommand::Show { days } => {
            let end = Utc::now();
            let start = end - Duration::days(i64::from(days.saturating_sub(1)));
            let entries = log
                .get_logs(&user, start, end)
                .with_context(|| format!("failed to read logs for '{}'", user))?;
            print!("{}", formatter.format_log_entries(&entries));
        }
        LogsCommand::Rotate { keep_days, all } => {
            let keep_days = keep_days.unwrap_or(config.logging.rotate_days);
            let removed = if all {
                log.rotate_all(keep_days)
            } else {
                log.rotate(&user, keep_days)
            };
            let scope = if all { "all users".to_string() } else { user };
            println!(
                "{}",
                formatter.format_message(&format!(
                    "Removed {} log file(s) older than {} days for {}",
                    removed, keep_days, scope
                ))
            );
        }
    }

    Ok(())
}
