//! CLI route: single route table and run context. Dispatches to library services and presentation.

use crate::cache::CacheTier;
use crate::config::{ArchlinkConfig, ConfigLoader, LoadOptions};
use crate::error::ArchlinkError;
use crate::fetch::{ArchiveClient, ReqwestTransport};
use crate::model::PostKey;
use crate::session::PageContextBuilder;
use crate::site::{self, PageLocation};
use crate::state::{SledStateStore, UserState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::cli::parse::{Commands, ConfigCommands, LookupArgs, OwnCommands};
use crate::cli::presentation;

/// Runtime context for CLI execution: merged config, user state and an async runtime.
pub struct RunContext {
    config: ArchlinkConfig,
    state: Option<UserState>,
    runtime: Runtime,
}

impl RunContext {
    /// Load configuration and open the user state store. The stored settings
    /// object, when present, is layered into the configuration.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ArchlinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let base = ConfigLoader::load_with(&LoadOptions {
            file: config_path.clone(),
            ..LoadOptions::default()
        })?;

        let state = match base.storage.resolve_state_path() {
            Some(path) => match SledStateStore::open(&path) {
                Ok(store) => Some(UserState::new(Arc::new(store))),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "User state unavailable");
                    None
                }
            },
            None => None,
        };

        let stored = match &state {
            Some(state) => runtime.block_on(state.stored_settings())?,
            None => None,
        };
        let config = match stored {
            Some(stored) => {
                debug!("Layering stored settings");
                ConfigLoader::load_with(&LoadOptions {
                    file: config_path,
                    stored_settings: Some(stored),
                    ..LoadOptions::default()
                })?
            }
            None => base,
        };

        Ok(Self {
            config,
            state,
            runtime,
        })
    }

    /// Context over an explicit configuration and state.
    pub fn with_config(config: ArchlinkConfig, state: Option<UserState>) -> Result<Self, ArchlinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            config,
            state,
            runtime,
        })
    }

    pub fn config(&self) -> &ArchlinkConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ArchlinkError> {
        match command {
            Commands::Resolve { host, format } => {
                let schema = site::resolve(host);
                presentation::format_resolve(host, schema.as_ref(), format)
            }
            Commands::Post(args) => {
                let (client, board) = self.client(args)?;
                let post = self.runtime.block_on(client.fetch_post(&args.id, &board))?;
                presentation::format_post(&post, &args.format)
            }
            Commands::Thread(args) => {
                let (client, board) = self.client(args)?;
                let thread = self.runtime.block_on(client.fetch_thread(&args.id, &board))?;
                presentation::format_thread(&thread, &args.format)
            }
            Commands::Replies(args) => {
                let (client, board) = self.client(args)?;
                let replies = self
                    .runtime
                    .block_on(client.fetch_replies(&args.id, &board))?;
                presentation::format_replies(&args.id, &replies, &args.format)
            }
            Commands::Index {
                html,
                url,
                output,
                discover,
                format,
            } => self.handle_index(html, url, output.as_ref(), *discover, format),
            Commands::Own { command } => self.handle_own_command(command),
            Commands::Config { command } => self.handle_config_command(command),
        }
    }

    fn client(&self, args: &LookupArgs) -> Result<(ArchiveClient, String), ArchlinkError> {
        let location = PageLocation::parse(&args.url)?;
        let schema = site::resolve(&location.host);
        let board = args
            .board
            .clone()
            .unwrap_or_else(|| location.board.clone());
        let settings = &self.config.settings;
        let transport = Arc::new(ReqwestTransport::new(&settings.network)?);
        let cache = Arc::new(CacheTier::new(settings.cache.clone()));
        debug!(schema = schema.name(), board = %board, "Archive client ready");
        Ok((
            ArchiveClient::new(transport, schema, location, cache, settings.network.clone()),
            board,
        ))
    }

    fn handle_index(
        &self,
        html: &PathBuf,
        url: &str,
        output: Option<&PathBuf>,
        discover: bool,
        format: &str,
    ) -> Result<String, ArchlinkError> {
        let markup = std::fs::read_to_string(html)?;
        let mut builder =
            PageContextBuilder::from_html(url, &markup).settings(self.config.settings.clone());
        if let Some(state) = &self.state {
            builder = builder.user_state(state.clone());
        }
        let context = builder.build()?;

        let pass = self.runtime.block_on(context.initialize())?;
        let discovery = if discover {
            Some(self.runtime.block_on(context.discover_remote_backlinks())?)
        } else {
            None
        };

        if let Some(path) = output {
            std::fs::write(path, context.html())?;
            info!(path = %path.display(), "Wrote augmented page");
            return Ok(format!(
                "Wrote {} ({} backlinks rendered)",
                path.display(),
                pass.backlinks_rendered + discovery.as_ref().map_or(0, |d| d.backlinks_rendered)
            ));
        }

        let rows: Vec<(String, Vec<String>)> = {
            let graph = context.graph().lock();
            let mut rows: Vec<(String, Vec<String>)> = graph
                .quoted_posts()
                .map(|id| (id.to_string(), graph.backlinks_of(id).to_vec()))
                .collect();
            rows.sort_by(|a, b| numeric_order(&a.0, &b.0));
            rows
        };
        presentation::format_backlinks(&rows, &pass, discovery.as_ref(), format)
    }

    fn user_state(&self) -> Result<&UserState, ArchlinkError> {
        self.state
            .as_ref()
            .ok_or_else(|| ArchlinkError::MissingContext("user state store".to_string()))
    }

    fn handle_own_command(&self, command: &OwnCommands) -> Result<String, ArchlinkError> {
        let state = self.user_state()?;
        match command {
            OwnCommands::Toggle { board, id } => {
                let key = PostKey::new(board.as_str(), id.as_str());
                let marked = self.runtime.block_on(state.toggle_own_post(&key))?;
                Ok(if marked {
                    format!("Marked {} as your post", key)
                } else {
                    format!("Unmarked {}", key)
                })
            }
            OwnCommands::List { format } => {
                let posts = self.runtime.block_on(state.own_posts())?;
                presentation::format_own_posts(&posts, format)
            }
        }
    }

    fn handle_config_command(&self, command: &ConfigCommands) -> Result<String, ArchlinkError> {
        match command {
            ConfigCommands::Show { format } => {
                if format == "json" {
                    presentation::to_json(&self.config)
                } else {
                    toml::to_string_pretty(&self.config)
                        .map_err(|e| ArchlinkError::Serialization(e.to_string()))
                }
            }
            ConfigCommands::Validate => match self.config.validate() {
                Ok(()) => Ok("Configuration is valid".to_string()),
                Err(errors) => {
                    let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
                    Err(ArchlinkError::ConfigError(format!(
                        "{} problem(s):\n{}",
                        errors.len(),
                        lines.join("\n")
                    )))
                }
            },
        }
    }
}

/// Numeric ids first in numeric order, anything else after.
fn numeric_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
