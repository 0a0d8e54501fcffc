//! Config loader: assembles every source into one [`ArchlinkConfig`].

use super::merge::merge_policy;
use super::sources::{global_file, stored_settings};
use super::ArchlinkConfig;
use crate::error::ArchlinkError;
use config::{Environment, File};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Which optional sources to include.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file, layered over the global file
    pub file: Option<PathBuf>,
    /// Settings object read from the user state store
    pub stored_settings: Option<Value>,
    /// Skip the global config file
    pub skip_global: bool,
}

/// Loads configuration. Precedence, lowest first: defaults, global file,
/// explicit file, stored settings, `ARCHLINK__*` environment variables.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file and environment.
    pub fn load() -> Result<ArchlinkConfig, ArchlinkError> {
        Self::load_with(&LoadOptions::default())
    }

    /// Defaults, global file, `path` and environment.
    pub fn load_from_file(path: &Path) -> Result<ArchlinkConfig, ArchlinkError> {
        Self::load_with(&LoadOptions {
            file: Some(path.to_path_buf()),
            ..LoadOptions::default()
        })
    }

    pub fn load_with(options: &LoadOptions) -> Result<ArchlinkConfig, ArchlinkError> {
        let mut builder = merge_policy::builder_with_defaults()?;

        if !options.skip_global {
            builder = global_file::add_to_builder(builder)?;
        }

        if let Some(path) = &options.file {
            if !path.exists() {
                return Err(ArchlinkError::ConfigError(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        if let Some(stored) = &options.stored_settings {
            builder = stored_settings::add_to_builder(builder, stored)?;
        }

        builder = builder.add_source(
            Environment::with_prefix("ARCHLINK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ArchlinkConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
