//! Configuration loading, validation and persistence.
//!
//! The same YAML file carries connection settings, the table mappings, and
//! each table's cursor. After a run the caller writes it back with
//! [`Config::save`] so advanced cursors survive to the next run.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::error::Result;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the configuration back to `path`.
    ///
    /// Writes a sibling `.tmp` file and renames it over `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = self.to_yaml()?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, yaml)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const YAML: &str = r#"
source:
  url: http://localhost:8123
target:
  host: localhost
  database: analytics
  user: postgres
  password: secret
  ssl_mode: require
batch_size: 5000
pipeline:
  workers: 3
  strategy: stream
tables:
  - source: events
    destination: events
    columns:
      - { source: id, destination: id, type: bigint, primary: true }
      - { source: name, destination: name, type: text }
    cursor:
      column: updated_at
"#;

    #[test]
    fn test_from_yaml_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.user, "default");
        assert_eq!(config.source.database, "default");
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "public");
        assert_eq!(config.target.ssl_mode, crate::drivers::SslMode::Require);
        assert_eq!(config.batch_size(), 5000);
        assert_eq!(config.pipeline.workers(), 3);
        assert_eq!(config.tables[0].primary_key(), vec!["id"]);
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(Config::from_yaml("source: [").is_err());
        assert!(Config::from_yaml("source:\n  url: \"\"\n").is_err());
    }

    #[test]
    fn test_save_round_trips_cursor() {
        let mut config = Config::from_yaml(YAML).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        config.tables[0].advance_cursor(ts);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        config.save(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(
            reloaded.tables[0].cursor.as_ref().unwrap().last_sync,
            Some(ts)
        );
        assert_eq!(reloaded.target.password, "secret");
        assert!(!dir.path().join("config.yaml.tmp").exists());
    }

    #[test]
    fn test_auto_tuning_keeps_explicit_batch_size() {
        let config = Config::from_yaml(YAML).unwrap().with_resources(&SystemResources {
            total_memory_gb: 256.0,
            cpu_cores: 64,
        });
        assert_eq!(config.batch_size, Some(5000));
        assert_eq!(config.pipeline.workers, Some(3));
        assert_eq!(config.pipeline.max_pg_connections, Some(5));
    }

    #[test]
    fn test_auto_tuned_batch_size_is_bounded() {
        let yaml = YAML.replace("batch_size: 5000\n", "");
        let small = Config::from_yaml(&yaml).unwrap().with_resources(&SystemResources {
            total_memory_gb: 4.0,
            cpu_cores: 4,
        });
        assert_eq!(small.batch_size, Some(10_000));

        let big = Config::from_yaml(&yaml).unwrap().with_resources(&SystemResources {
            total_memory_gb: 1024.0,
            cpu_cores: 4,
        });
        assert_eq!(big.batch_size, Some(100_000));
    }
}
