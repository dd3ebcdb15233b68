mod config;
mod estimate;
mod import;
mod index;
mod logs;
mod search;
mod serve;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::OutputFormat;
use crate::server::KnowledgeServer;

pub use config::ConfigCommand;
pub use estimate::EstimateArgs;
pub use import::ImportArgs;
pub use index::IndexCommand;
pub use logs::LogsCommand;
pub use search::SearchArgs;

pub use config::handle_config;
pub use estimate::handle_estimate;
pub use import::handle_import;
pub use index::handle_index;
pub use logs::handle_logs;
pub use search::handle_search;
pub use serve::handle_serve;

/// Everything a command handler needs besides its own arguments.
pub struct CommandContext<'a> {
    pub server: &'a KnowledgeServer,
    pub user: Option<&'a str>,
    pub format: OutputFormat,
    pub verbose: bool,
}

impl CommandContext<'_> {
    pub fn formatter(&self) -> Box<dyn Formatter> {
        get_formatter(self.format)
    }

    /// The `--user` value, or the configured default user.
    pub fn user_id(&self) -> String {
        let config = self.server.config().snapshot();
        self.server.resolve_user(self.user, &config).to_string()
    }
}
