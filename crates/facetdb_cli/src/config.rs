//! `facetdb.toml` loading.

use crate::error::{CliError, CliResult};
use facetdb_core::{Config, EntityDef, SchemaRegistry};
use facetdb_server::{ServerConfig, DEFAULT_MAX_BODY_BYTES};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// `[server]`
    #[serde(default)]
    pub server: ServerSection,
    /// `[storage]`
    #[serde(default)]
    pub storage: StorageSection,
    /// `[[entities]]`
    #[serde(default)]
    pub entities: Vec<EntityDef>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Request body limit.
    pub max_body_bytes: usize,
    /// Seconds between attachment sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind: defaults.bind_addr,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            sweep_interval_secs: defaults.sweep_interval.as_secs(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Data directory; absent means in-memory.
    pub data_dir: Option<PathBuf>,
    /// Sync the journal after every record.
    pub sync_on_write: bool,
    /// Seconds an upload may stay unreferenced.
    pub pending_attachment_ttl_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        let defaults = Config::default();
        Self {
            data_dir: None,
            sync_on_write: defaults.sync_on_write,
            pending_attachment_ttl_secs: defaults.pending_attachment_ttl.as_secs(),
        }
    }
}

impl AppConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CliError::config(path, e))?;
        Self::parse(&text).map_err(|e| match e {
            CliError::Config { message, .. } => CliError::config(path, message),
            other => other,
        })
    }

    /// Parses configuration text.
    pub fn parse(text: &str) -> CliResult<Self> {
        toml::from_str(text).map_err(|e| CliError::config("<config>", e.message()))
    }

    /// Checks every entity definition and rejects duplicates.
    pub fn validate(&self) -> CliResult<()> {
        if self.entities.is_empty() {
            return Err(CliError::config("<config>", "no [[entities]] declared"));
        }
        let mut names = HashSet::new();
        for def in &self.entities {
            if !names.insert(def.name.as_str()) {
                return Err(CliError::config(
                    "<config>",
                    format!("entity {:?} declared twice", def.name),
                ));
            }
            def.check()?;
        }
        SchemaRegistry::with_entities(self.entities.clone())?;
        Ok(())
    }

    /// Builds the engine configuration.
    pub fn engine_config(&self) -> Config {
        let config = Config::new()
            .sync_on_write(self.storage.sync_on_write)
            .pending_attachment_ttl(Duration::from_secs(self.storage.pending_attachment_ttl_secs));
        match &self.storage.data_dir {
            Some(dir) => config.data_dir(dir),
            None => config,
        }
    }

    /// Builds the server configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.server.bind)
            .with_max_body_bytes(self.server.max_body_bytes)
            .with_sweep_interval(Duration::from_secs(self.server.sweep_interval_secs.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_core::FieldKind;

    const SAMPLE: &str = r#"
        [server]
        bind = "0.0.0.0:8080"
        sweep_interval_secs = 30

        [storage]
        data_dir = "data"
        sync_on_write = false

        [[entities]]
        name = "team"
        title = "Our team"
        item_type = "member"
        attachment_field = "pic"
        pane = { layout = "cards" }

        [[entities.fields]]
        name = "name"
        kind = "string"

        [[entities.fields]]
        name = "team"
        kind = "string-set"
        facet = true

        [[entities.fields]]
        name = "pic"
        kind = "string"
    "#;

    #[test]
    fn parse_sample() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.server.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.entities.len(), 1);

        let team = &config.entities[0];
        assert_eq!(team.fields[1].kind, FieldKind::StringSet);
        assert!(team.fields[1].facet);
        assert_eq!(team.pane.as_ref().unwrap()["layout"], "cards");

        let engine = config.engine_config();
        assert_eq!(engine.data_dir, Some(PathBuf::from("data")));
        assert!(!engine.sync_on_write);

        let server = config.server_config();
        assert_eq!(server.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn defaults_when_sections_missing() {
        let config = AppConfig::parse(
            "[[entities]]\nname = \"t\"\ntitle = \"T\"\nitem_type = \"x\"\n",
        )
        .unwrap();
        config.validate().unwrap();
        assert!(config.storage.data_dir.is_none());
        assert_eq!(config.server_config(), ServerConfig::default());
    }

    #[test]
    fn rejects_bad_configs() {
        assert!(AppConfig::parse("[server]\nport = 1\n").is_err());
        assert!(AppConfig::default().validate().is_err());

        let twice = "[[entities]]\nname = \"t\"\ntitle = \"T\"\nitem_type = \"x\"\n".repeat(2);
        assert!(AppConfig::parse(&twice).unwrap().validate().is_err());

        let bad_kind = "[[entities]]\nname = \"t\"\ntitle = \"T\"\nitem_type = \"x\"\n\
                        [[entities.fields]]\nname = \"a\"\nkind = \"blob\"\n";
        assert!(AppConfig::parse(bad_kind).is_err());

        let reserved = "[[entities]]\nname = \"health\"\ntitle = \"T\"\nitem_type = \"x\"\n";
        assert!(matches!(
            AppConfig::parse(reserved).unwrap().validate(),
            Err(CliError::Core(_))
        ));
    }

    #[test]
    fn load_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facetdb.toml");
        std::fs::write(&path, "not toml [").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("facetdb.toml"));
        assert!(AppConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
