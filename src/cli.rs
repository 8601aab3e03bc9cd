//! Command-line interface definition for StreamChat
//!
//! This module defines the CLI structure using clap's derive API: an
//! interactive chat command and session management subcommands.

use clap::{Parser, Subcommand};

/// StreamChat - terminal client for a streaming chat service
///
/// Chat with the service's assistant, watching replies arrive as they are
/// generated, and manage stored conversations.
#[derive(Parser, Debug, Clone)]
#[command(name = "streamchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "STREAMCHAT_CONFIG",
        default_value = "config/config.yaml"
    )]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the chat service base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive chat
    Chat {
        /// Continue an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<i64>,
    },

    /// Manage stored sessions
    Sessions {
        /// Session management subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// List sessions, most recently active first
    List {
        /// Page number (1-based)
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show a session and its messages
    Show {
        /// Session id
        id: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Rename a session
    Rename {
        /// Session id
        id: i64,

        /// New title
        title: String,
    },

    /// Delete a session and its messages
    Delete {
        /// Session id
        id: i64,
    },

    /// Delete a session's messages but keep the session
    Clear {
        /// Session id
        id: i64,
    },

    /// Search session titles and messages
    Search {
        /// Text to look for
        query: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            base_url: None,
            command: Commands::Chat { session: None },
        }
    }
}
