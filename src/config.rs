use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::ConnectionConfig;
use crate::llm::SamplingOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let sampling = SamplingOptions::for_sql();
        Self {
            host: "http://localhost:11434".to_string(),
            model: "sqlcoder:latest".to_string(),
            timeout_secs: 60,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            max_tokens: sampling.max_tokens,
        }
    }
}

impl InferenceConfig {
    /// SQL sampling options with the configured overrides applied.
    pub fn sampling(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            ..SamplingOptions::for_sql()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub inference: InferenceConfig,
    pub connections: Vec<ConnectionConfig>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nl2sql")
            .join("config.toml")
    }

    /// Load from the default location, or defaults when no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Store `conn` under its name, replacing a saved connection with the
    /// same name. Returns whether one was replaced.
    pub fn remember(&mut self, conn: ConnectionConfig) -> bool {
        match self
            .connections
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&conn.name))
        {
            Some(existing) => {
                *existing = conn;
                true
            }
            None => {
                self.connections.push(conn);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Engine;

    #[test]
    fn test_defaults() {
        let config = InferenceConfig::default();
        assert_eq!(config.host, "http://localhost:11434");
        assert_eq!(config.model, "sqlcoder:latest");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.sampling(), SamplingOptions::for_sql());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse(
            r#"
            [inference]
            model = "llama3"
            temperature = 0.0

            [[connections]]
            name = "Warehouse"
            engine = "sqlite"
            database = "/tmp/warehouse.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.inference.model, "llama3");
        assert_eq!(config.inference.timeout_secs, 60);
        assert_eq!(config.inference.sampling().temperature, 0.0);
        assert_eq!(config.inference.sampling().stop, SamplingOptions::for_sql().stop);

        let conn = config.connection("warehouse").unwrap();
        assert_eq!(conn.engine, Engine::Sqlite);
        assert_eq!(conn.database, "/tmp/warehouse.db");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/nl2sql/config.toml")).unwrap();
        assert!(config.connections.is_empty());
        assert_eq!(config.inference, InferenceConfig::default());
    }

    #[test]
    fn test_remember_replaces_by_name() {
        let mut config = Config::default();
        let first = ConnectionConfig::from_uri("sqlite:///tmp/a.db").unwrap();
        let mut renamed = ConnectionConfig::from_uri("postgres://app@db/shop").unwrap();
        renamed.name = "Shop".into();
        assert!(!config.remember(first));
        assert!(!config.remember(renamed.clone()));
        renamed.name = "shop".into();
        renamed.port = Some(6000);
        assert!(config.remember(renamed));
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connection("SHOP").unwrap().port, Some(6000));
    }

    #[test]
    fn test_save_round_trip_omits_password() {
        let dir = std::env::temp_dir().join(format!("nl2sql-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let mut conn = ConnectionConfig::from_uri("postgres://app:secret@db:5433/shop").unwrap();
        conn.name = "shop".into();
        let config = Config {
            inference: InferenceConfig::default(),
            connections: vec![conn],
        };
        config.save_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("secret"));
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.connections[0].port, Some(5433));
        assert!(loaded.connections[0].password.is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }
}
