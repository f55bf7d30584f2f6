/// Configuration for the electra service
///
/// Layered with config-rs: built-in defaults, then `electra.toml` (or the
/// file given with `--config`), then `ELECTRA__SECTION__KEY` environment
/// variables. `DATABASE_URL` fills `database.url` when nothing else did.
use config::{Config, ConfigError, Environment, File};
use electra_engine::PowerFlowOptions;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ElectraConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub power_flow: PowerFlowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL; grids are kept in memory when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where uploaded circuit files are kept.
    #[serde(default = "default_circuit_dir")]
    pub circuit_dir: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PowerFlowConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub base_mva: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_circuit_dir() -> PathBuf {
    std::env::temp_dir().join("electra")
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_max_iterations() -> usize {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            circuit_dir: default_circuit_dir(),
        }
    }
}

impl Default for PowerFlowConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            base_mva: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

impl ElectraConfig {
    /// Load from `path`, or from `./electra.toml` when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = Config::builder().add_source(Config::try_from(&ElectraConfig::default())?);
        let builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("electra").required(false)),
        };
        let mut config = builder
            .add_source(
                Environment::with_prefix("ELECTRA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<ElectraConfig>()?;

        if config.database.url.is_none() {
            config.database.url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());
        }
        Ok(config)
    }

    pub fn power_flow_options(&self) -> PowerFlowOptions {
        let options = PowerFlowOptions::default()
            .with_tolerance(self.power_flow.tolerance)
            .with_max_iterations(self.power_flow.max_iterations);
        match self.power_flow.base_mva {
            Some(base) => options.with_base_mva(base),
            None => options,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.database.acquire_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ElectraConfig::default();
        assert_eq!(config.server.addr.port(), 8000);
        assert_eq!(config.power_flow.max_iterations, 20);
        assert!(config.database.url.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\naddr = \"127.0.0.1:9100\"\n\n[power_flow]\ntolerance = 1e-8\nbase_mva = 50.0\n\n[storage]\ncircuit_dir = \"/srv/circuits\""
        )
        .unwrap();

        let config = ElectraConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9100".parse().unwrap());
        assert_eq!(config.storage.circuit_dir, PathBuf::from("/srv/circuits"));
        // untouched keys keep their defaults
        assert_eq!(config.power_flow.max_iterations, 20);

        let options = config.power_flow_options();
        assert_eq!(options.tolerance, 1e-8);
        assert_eq!(options.base_mva, Some(50.0));
    }
}
