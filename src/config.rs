use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::Dialect;
use crate::{FluxReadError, Result};

pub const DEFAULT_BYTE_CAP: u64 = 10 * 1024 * 1024;

fn default_byte_cap() -> u64 {
    DEFAULT_BYTE_CAP
}

fn default_true() -> bool {
    true
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "org")]
    pub org_id: Option<String>,
    /// Max bytes before forced truncation; the stream is abandoned once exceeded.
    #[serde(default = "default_byte_cap", alias = "max_bytes")]
    pub byte_cap: u64,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for QueryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_keys: Vec<&str> = self.headers.keys().map(|key| key.as_str()).collect();
        f.debug_struct("QueryConfig")
            .field("base_url", &self.base_url)
            .field("org_id", &self.org_id)
            .field("byte_cap", &self.byte_cap)
            .field("compress", &self.compress)
            .field("header_keys", &header_keys)
            .field("dialect", &self.dialect)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl QueryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            org_id: None,
            byte_cap: DEFAULT_BYTE_CAP,
            compress: true,
            headers: BTreeMap::new(),
            dialect: None,
            connect_timeout_secs: None,
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            FluxReadError::Config(format!("read {} failed: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(FluxReadError::Config("base_url must not be empty".to_string()));
        }
        if self.byte_cap == 0 {
            return Err(FluxReadError::Config("byte_cap must be > 0".to_string()));
        }
        if self.connect_timeout_secs == Some(0) {
            return Err(FluxReadError::Config(
                "connect_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}
