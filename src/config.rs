//! Client configuration.
//!
//! Settings come from a TOML file (`pgread.toml`) and may be overridden by a
//! connection URL. The `database` key only names the default database; every
//! read names its own target database.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{PgReadError, PgReadResult};

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "pgread.toml";

/// Connection settings shared by every per-database pool.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    /// Default database, used when a read does not name one.
    pub database: String,
    /// One of `disable`, `allow`, `prefer`, `require`, `verify-ca`, `verify-full`.
    pub sslmode: String,
    /// Pool size per target database.
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    /// Issue `SET TRANSACTION READ ONLY` after every `BEGIN`. When disabled,
    /// writes in free-form queries run and are then rolled back.
    pub read_only: bool,
    /// Overrides the individual connection settings when present.
    pub url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
            sslmode: "prefer".to_string(),
            max_connections: 4,
            connect_timeout_secs: 30,
            read_only: true,
            url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    postgres: ClientConfig,
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Parse the `[postgres]` table of a TOML document.
    pub fn from_toml_str(content: &str) -> PgReadResult<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.postgres)
    }

    /// Read a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> PgReadResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from `path`, else the first existing default location, else defaults.
    pub fn load(path: Option<&Path>) -> PgReadResult<Self> {
        if let Some(path) = path {
            tracing::debug!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }
        for candidate in default_locations() {
            if candidate.exists() {
                tracing::debug!("Loading configuration from {}", candidate.display());
                return Self::from_file(candidate);
            }
        }
        Ok(Self::default())
    }

    /// Connection options for `database`, derived from these settings.
    pub fn connect_options(&self, database: &str) -> PgReadResult<PgConnectOptions> {
        let options = match &self.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| PgReadError::Config(format!("invalid database url: {}", e)))?,
            None => {
                let sslmode = PgSslMode::from_str(&self.sslmode).map_err(|e| {
                    PgReadError::Config(format!("invalid sslmode '{}': {}", self.sslmode, e))
                })?;
                let mut options = PgConnectOptions::new()
                    .host(&self.host)
                    .port(self.port)
                    .username(&self.username)
                    .ssl_mode(sslmode);
                if let Some(password) = &self.password {
                    options = options.password(password);
                }
                options
            }
        };
        Ok(options.database(database))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("pgread").join("config.toml"));
    }
    locations
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = Some(url.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = ClientConfig::from_toml_str(
            r#"
            [postgres]
            host = "db.internal"
            read_only = false
            "#,
        )
        .unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5432);
        assert!(!config.read_only);
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn test_missing_table_is_default() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_transactions_read_only_by_default() {
        assert!(ClientConfig::default().read_only);
        assert!(ClientConfig::from_toml_str("[postgres]\nport = 5433").unwrap().read_only);
        assert!(!ClientConfig::builder().read_only(false).build().read_only);
    }

    #[test]
    fn test_invalid_toml() {
        let err = ClientConfig::from_toml_str("[postgres]\nport = \"x\"").unwrap_err();
        assert!(matches!(err, PgReadError::Toml(_)));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[postgres]\nusername = \"reader\"\nmax_connections = 2").unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.username, "reader");
        assert_eq!(config.max_connections, 2);
    }

    #[test]
    fn test_connect_options_target_database() {
        let config = ClientConfig::builder()
            .host("127.0.0.1")
            .port(6543)
            .username("reader")
            .password("secret")
            .build();
        let options = config.connect_options("analytics").unwrap();
        assert_eq!(options.get_host(), "127.0.0.1");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "reader");
        assert_eq!(options.get_database(), Some("analytics"));
    }

    #[test]
    fn test_url_overrides_fields() {
        let config = ClientConfig::builder()
            .host("ignored")
            .url("postgres://app@db.example:5433/postgres")
            .build();
        let options = config.connect_options("reports").unwrap();
        assert_eq!(options.get_host(), "db.example");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("reports"));
    }

    #[test]
    fn test_invalid_sslmode() {
        let config = ClientConfig {
            sslmode: "sometimes".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.connect_options("db"),
            Err(PgReadError::Config(_))
        ));
    }
}
