//! Command-line interface for livescribe
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Zero-retention streaming transcription server
#[derive(Parser, Debug)]
#[command(
    name = "livescribe",
    version,
    about = "Zero-retention streaming transcription server"
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the streaming and batch server
    Serve {
        /// Listen address override (e.g., 127.0.0.1)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Listen port override
        #[arg(long, short = 'p', value_name = "PORT")]
        port: Option<u16>,

        /// Whisper model file override
        #[arg(long, value_name = "FILE")]
        model: Option<PathBuf>,

        /// Transcription language override (e.g., pl, en, auto)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage signed stream tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

/// Configuration inspection actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment) as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Stream token actions
#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Issue a short-lived token signed with auth.token_secret
    Issue {
        /// Identity embedded in the token (e.g., an email address)
        #[arg(long, short = 's', value_name = "SUBJECT")]
        subject: String,
    },
}
