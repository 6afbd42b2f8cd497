use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Parameters governing fetches against the coordination service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoordinationConfig {
    /// Bound on a single children/data fetch in milliseconds. Expiry
    /// surfaces as a configuration failure on the triggering call, not
    /// a fatal condition.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_in_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_in_ms: default_fetch_timeout(),
        }
    }
}

impl CoordinationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "coordination fetch timeout must be > 0".into(),
            )));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_in_ms)
    }
}

fn default_fetch_timeout() -> u64 {
    5000
}
