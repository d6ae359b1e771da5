//! Client configuration: gateway address, token file and paging/polling knobs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use accio_core::store::JOBS_PER_PAGE;

use crate::error::Result;

pub const SERVER_ENV: &str = "ACCIO_SERVER";
pub const TOKEN_FILE_ENV: &str = "ACCIO_TOKEN_FILE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the gateway; relative request paths resolve against it.
    pub server: String,
    pub token_path: PathBuf,
    /// Jobs requested per page.
    pub per_page: u32,
    pub runs_per_page: u32,
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    #[serde(with = "opt_secs")]
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "http://localhost:8888".to_string(),
            token_path: default_token_path(),
            per_page: JOBS_PER_PAGE,
            runs_per_page: 25,
            poll_interval: Duration::from_secs(10),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientConfig {
    /// `~/.config/accio/config.yaml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("accio").join("config.yaml"))
    }

    /// Loads the YAML file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Applies `ACCIO_SERVER` and `ACCIO_TOKEN_FILE` when set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(SERVER_ENV).ok(),
            std::env::var(TOKEN_FILE_ENV).ok().map(PathBuf::from),
        )
    }

    pub fn with_overrides(mut self, server: Option<String>, token_path: Option<PathBuf>) -> Self {
        if let Some(server) = server.filter(|s| !s.is_empty()) {
            self.server = server;
        }
        if let Some(path) = token_path {
            self.token_path = path;
        }
        self
    }
}

fn default_token_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("accio")
        .join("access_token")
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
