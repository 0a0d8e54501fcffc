//! CLI parse: clap types for archlink. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// archlink CLI - quote links and backlinks for imageboard archives
#[derive(Parser)]
#[command(name = "archlink")]
#[command(about = "Resolve archived posts and render backlinks for imageboard archive pages")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which site schema handles a hostname
    Resolve {
        /// Hostname, e.g. desuarchive.org
        host: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Fetch one post through the cache and archive API
    Post(LookupArgs),
    /// Fetch a whole thread
    Thread(LookupArgs),
    /// List posts replying to a post (FoolFuuka archives)
    Replies(LookupArgs),
    /// Index a saved page and render its backlinks
    Index {
        /// Saved HTML page
        html: PathBuf,
        /// URL the page was saved from
        #[arg(long)]
        url: String,
        /// Write the augmented page here instead of printing a table
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also ask the archive for replies not present on the page
        #[arg(long)]
        discover: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Manage posts marked as your own
    Own {
        #[command(subcommand)]
        command: OwnCommands,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Arguments shared by the lookup commands.
#[derive(Args, Debug, Clone)]
pub struct LookupArgs {
    /// Post or thread number
    pub id: String,
    /// Archive page URL that selects the site schema
    #[arg(long)]
    pub url: String,
    /// Board (defaults to the board in the URL)
    #[arg(long)]
    pub board: Option<String>,
    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Subcommand)]
pub enum OwnCommands {
    /// Mark or unmark a post
    Toggle {
        board: String,
        id: String,
    },
    /// List marked posts
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Check the merged configuration
    Validate,
}
