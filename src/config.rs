use std::time::Duration;

use serde::Deserialize;

/// Client-wide settings.
///
/// Loadable from YAML; every field has a default so partial documents
/// work.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Transport establishment timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Redirect budget per request; each hop decrements it.
    pub max_redirects: u32,
    /// Injected as `User-Agent` when the caller did not supply one.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            max_redirects: 10,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
