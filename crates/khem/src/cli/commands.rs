//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Save command arguments.
#[derive(Debug, Args)]
pub struct SaveCommand {
    /// The name to save (surrounding whitespace is trimmed)
    #[arg(allow_hyphen_values = true)]
    pub name: String,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Commands accepted by the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    /// Replace the input with this text.
    Edit(String),
    /// Save the current input.
    Save,
    /// Print the current input.
    Show,
    /// Leave the prompt.
    Quit,
}

impl PromptInput {
    /// Interpret one line typed at the prompt.
    ///
    /// Lines starting with `/` are commands; anything else, including an
    /// unknown command, replaces the input verbatim.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line.trim_end_matches(['\r', '\n']) {
            "/save" => Self::Save,
            "/show" => Self::Show,
            "/quit" | "/exit" => Self::Quit,
            text => Self::Edit(text.to_string()),
        }
    }
}
