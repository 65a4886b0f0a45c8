use crate::error::{Result, ServerError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
    Libsql,
}

impl FromStr for StoreBackend {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            "libsql" | "turso" => Ok(StoreBackend::Libsql),
            other => Err(ServerError::Config(format!("unknown store backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for the sqlite backend.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from("telemetry.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:9898".to_string(),
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            ServerError::Config(format!("invalid metrics listen address '{}': {e}", self.listen))
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
    /// Used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "telemetry.log".to_string(),
            filter: "telemetry_server=info".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (explicit path, else `config.toml` when present), then
    /// `TELEMETRY_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("TELEMETRY_"))
            .collect();
        config.apply_env(&vars)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        if let Some(host) = vars.get("TELEMETRY_HOST") {
            self.server.host = host.clone();
        }
        if let Some(port) = vars.get("TELEMETRY_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| ServerError::Config(format!("invalid TELEMETRY_PORT '{port}': {e}")))?;
        }
        if let Some(backend) = vars.get("TELEMETRY_STORE_BACKEND") {
            self.store.backend = backend.parse()?;
        }
        if let Some(path) = vars.get("TELEMETRY_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(listen) = vars.get("TELEMETRY_METRICS_LISTEN") {
            self.metrics.listen = listen.clone();
        }
        Ok(())
    }

    /// Command-line overrides, applied last.
    pub fn apply_cli(
        &mut self,
        port: Option<u16>,
        backend: Option<&str>,
        store_path: Option<PathBuf>,
    ) -> Result<()> {
        if let Some(port) = port {
            self.server.port = port;
        }
        if let Some(backend) = backend {
            self.store.backend = backend.parse()?;
        }
        if let Some(path) = store_path {
            self.store.path = path;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{addr}': {e}")))
    }
}
