//! 命令行定义（clap derive）与分发
//!
//! 不带子命令时启动 HTTP 服务。

pub mod commands;

use clap::{Parser, Subcommand};
use std::fmt;

/// Contextual commerce serving engine
#[derive(Parser, Debug)]
#[command(name = "commerce-engine")]
#[command(version)]
#[command(about = "Affiliate short links, contextual ad slots and commission attribution", long_about = None)]
pub struct Cli {
    /// Configuration file path (default: config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Apply database migrations and exit
    Migrate,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Manage short links
    Link {
        #[command(subcommand)]
        action: LinkCommands,
    },

    /// Manage audience segments
    Segments {
        #[command(subcommand)]
        action: SegmentCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: stdout)
        output_path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum LinkCommands {
    /// Create a short link for a campaign
    Create {
        /// Destination URL (http or https)
        #[arg(long)]
        destination: String,

        /// Campaign id
        #[arg(long)]
        campaign: String,

        /// Earner (link owner) id
        #[arg(long)]
        earner: String,

        /// Explicit short code; generated when omitted
        #[arg(long)]
        code: Option<String>,

        /// Expiration time (RFC3339)
        #[arg(long)]
        expires_at: Option<String>,
    },

    /// Deactivate a short link
    Deactivate {
        /// Short code
        code: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SegmentCommands {
    /// Import a full segment generation from a JSON file
    Import {
        /// JSON file: {"segments": [{"id", "definition", "members"}]}
        file_path: String,
    },
}

#[derive(Debug)]
pub enum CliError {
    StorageError(String),
    ParseError(String),
    CommandError(String),
}

impl CliError {
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(msg) => format!("Storage error: {}", msg),
            CliError::ParseError(msg) => format!("Parse error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(msg) => {
                format!("{} {}", "Storage error:".red().bold(), msg.white())
            }
            CliError::ParseError(msg) => {
                format!("{} {}", "Parse error:".yellow().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<crate::errors::EngineError> for CliError {
    fn from(err: crate::errors::EngineError) -> Self {
        match err {
            crate::errors::EngineError::Validation(msg) => CliError::ParseError(msg),
            crate::errors::EngineError::StoreUnavailable(msg)
            | crate::errors::EngineError::DatabaseConfig(msg)
            | crate::errors::EngineError::DatabaseOperation(msg) => CliError::StorageError(msg),
            other => CliError::CommandError(other.to_string()),
        }
    }
}

/// 执行一次性命令；`Serve` 由 main 处理
pub async fn run_cli_command(cmd: Commands) -> Result<(), CliError> {
    match cmd {
        Commands::Serve => Err(CliError::CommandError(
            "serve is handled by the server runtime".to_string(),
        )),
        Commands::Migrate => commands::migrate().await,
        Commands::Config {
            action: ConfigCommands::Generate { output_path, force },
        } => commands::config_generate(output_path, force),
        Commands::Link { action } => match action {
            LinkCommands::Create {
                destination,
                campaign,
                earner,
                code,
                expires_at,
            } => commands::create_link(destination, campaign, earner, code, expires_at).await,
            LinkCommands::Deactivate { code } => commands::deactivate_link(code).await,
        },
        Commands::Segments {
            action: SegmentCommands::Import { file_path },
        } => commands::import_segments(file_path).await,
    }
}
