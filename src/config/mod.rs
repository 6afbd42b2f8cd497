//! Configuration for the broker topology mirror.
//!
//! Sources are merged with increasing priority:
//! 1. Hardcoded defaults
//! 2. Optional config file named by `CONFIG_PATH`
//! 3. Environment variables (`MIRROR__` prefix, `__` separator)

mod coordination;
mod network;
pub use coordination::*;
pub use network::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MirrorConfig {
    /// Coordination-service fetch parameters
    #[serde(default)]
    pub coordination: CoordinationConfig,

    /// Wire-protocol connection parameters
    #[serde(default)]
    pub network: NetworkConfig,
}

impl MirrorConfig {
    /// Load and validate configuration from all sources.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder();

        if let Ok(path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path));
        }

        builder = builder.add_source(
            Environment::with_prefix("MIRROR")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let merged: MirrorConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }

    /// Overlay settings from `path` on top of this configuration.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let merged: MirrorConfig = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .build()?
            .try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }

    /// Validates configuration sanity across all sections
    pub fn validate(&self) -> Result<()> {
        self.coordination.validate()?;
        self.network.validate()?;
        Ok(())
    }
}
