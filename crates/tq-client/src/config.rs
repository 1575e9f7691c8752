use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tq_session::SessionConfig;
use url::Url;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// HTTP base of the task service.
    pub server: String,
    /// Swap `\r` and `\n` in keystrokes sent to tasks.
    pub remap_newline: bool,
    pub ping_interval_secs: u64,
    pub outbound_queue: usize,
    pub log_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Read `path`, or the default config file if none is given. A missing
    /// default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (tq_protocol::paths::config_path(), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn server_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.server).with_context(|| format!("invalid server url: {}", self.server))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            remap_newline: self.remap_newline,
            channel_capacity: self.outbound_queue.max(1),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            remap_newline: false,
            ping_interval_secs: 30,
            outbound_queue: 256,
            log_file: None,
        }
    }
}
