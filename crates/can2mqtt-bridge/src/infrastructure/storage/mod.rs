//! Storage infrastructure: configuration, binding tables and recorded logs.
//!
//! - [`config_file`] reads the optional TOML configuration file.
//! - [`binding_table`] reads the `id,mode,topics` binding table.
//! - [`candump`] reads candump logs for the `replay` command.
//!
//! [`load`] combines the first two with command-line overrides and builds
//! the frozen [`BindingRegistry`].  Every configuration error is reported
//! from here, before any transport is touched.
//!
//! # Precedence
//!
//! command line (incl. environment) > TOML file > built-in defaults.

pub mod binding_table;
pub mod candump;
pub mod config_file;

use std::path::{Path, PathBuf};

use can2mqtt_core::{BindingRecord, BindingRegistry, RegistryError};
use thiserror::Error;
use tracing::debug;

use crate::domain::{BridgeConfig, BrokerEndpoint, ConfigValueError, Direction};
use config_file::ConfigFile;

/// Error type for everything that can make a configuration unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML file is not valid.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A binding-table line has the wrong shape.
    #[error("binding table line {line}: {reason}")]
    Csv { line: usize, reason: String },

    /// A binding-table identifier is not a number.
    #[error("binding table line {line}: invalid CAN-ID {value:?}")]
    InvalidFrameId { line: usize, value: String },

    /// A direction or broker connect string is invalid.
    #[error(transparent)]
    Value(#[from] ConfigValueError),

    /// The bindings violate the routing invariants.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Values given on the command line or through the environment.
///
/// `None` means "not given", so the file value or the default applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub can_interface: Option<String>,
    pub broker: Option<String>,
    pub bindings_file: Option<PathBuf>,
    pub direction: Option<String>,
}

/// A fully resolved configuration.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: BridgeConfig,
    /// `false` if only inline `[[bindings]]` were used.
    pub read_bindings_file: bool,
    pub registry: BindingRegistry,
}

/// Resolves the configuration and builds the binding registry.
///
/// The binding-table file is read unless the TOML file lists inline
/// bindings and no table file was named anywhere.  Inline bindings come
/// first; the table's rows follow.
///
/// # Errors
///
/// Any [`ConfigError`].  Duplicates between inline bindings and table rows
/// are reported like duplicates within one table.
pub fn load(
    config_path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<LoadedConfig, ConfigError> {
    let file = match config_path {
        Some(path) => config_file::load_config(path)?,
        None => ConfigFile::default(),
    };

    let named_table = overrides
        .bindings_file
        .or_else(|| file.bridge.bindings_file.clone());
    let read_bindings_file = named_table.is_some() || file.bindings.is_empty();

    let config = BridgeConfig {
        can_interface: overrides.can_interface.unwrap_or(file.can.interface),
        broker: BrokerEndpoint::parse(overrides.broker.as_deref().unwrap_or(&file.mqtt.broker))?,
        client_id: file.mqtt.client_id,
        bindings_file: named_table.unwrap_or_else(|| BridgeConfig::default().bindings_file),
        direction: overrides
            .direction
            .as_deref()
            .unwrap_or(&file.bridge.direction)
            .parse::<Direction>()?,
        inbound_queue_capacity: file.mqtt.inbound_queue_capacity,
    };

    let mut records: Vec<BindingRecord> = file.bindings.into_iter().map(Into::into).collect();
    if read_bindings_file {
        records.extend(binding_table::load_binding_table(&config.bindings_file)?);
    }
    debug!("{} binding record(s) loaded", records.len());

    let registry = BindingRegistry::new(records)?;
    Ok(LoadedConfig {
        config,
        read_bindings_file,
        registry,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes `content` to a unique file under the system temp directory.
    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "can2mqtt-storage-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_table_file_from_overrides() {
        // Arrange
        let table = temp_file("override.csv", "0x100,uint162ascii,plant/level\n");
        let overrides = ConfigOverrides {
            bindings_file: Some(table.clone()),
            direction: Some("1".to_string()),
            ..ConfigOverrides::default()
        };

        // Act
        let loaded = load(None, overrides).unwrap();

        // Assert
        assert!(loaded.read_bindings_file);
        assert_eq!(loaded.config.bindings_file, table);
        assert_eq!(loaded.config.direction, Direction::CanToMqtt);
        assert_eq!(loaded.config.can_interface, "can0");
        assert_eq!(loaded.registry.len(), 1);
    }

    #[test]
    fn test_inline_bindings_without_table_skip_the_file() {
        let config = temp_file(
            "inline.toml",
            "[can]\ninterface = \"vcan0\"\n[[bindings]]\nid = 1\nmode = \"none\"\ntopic = \"a\"\n",
        );

        let loaded = load(Some(&config), ConfigOverrides::default()).unwrap();

        assert!(!loaded.read_bindings_file);
        assert_eq!(loaded.config.can_interface, "vcan0");
        assert!(loaded.registry.lookup_by_topic("a").is_some());
    }

    #[test]
    fn test_command_line_beats_file() {
        let config = temp_file(
            "precedence.toml",
            "[can]\ninterface = \"vcan0\"\n[mqtt]\nbroker = \"tcp://file:1883\"\n[[bindings]]\nid = 1\ntopic = \"a\"\n",
        );
        let overrides = ConfigOverrides {
            can_interface: Some("can7".to_string()),
            broker: Some("tcp://u:p@cli:1883".to_string()),
            ..ConfigOverrides::default()
        };

        let loaded = load(Some(&config), overrides).unwrap();

        assert_eq!(loaded.config.can_interface, "can7");
        assert_eq!(loaded.config.broker.url, "tcp://cli:1883");
        assert!(loaded.config.broker.credentials.is_some());
    }

    #[test]
    fn test_duplicate_across_inline_and_table_is_fatal() {
        let table = temp_file("dup.csv", "1,none,b\n");
        let config = temp_file("dup.toml", "[[bindings]]\nid = 1\ntopic = \"a\"\n");
        let overrides = ConfigOverrides {
            bindings_file: Some(table),
            ..ConfigOverrides::default()
        };

        let err = load(Some(&config), overrides).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Registry(RegistryError::DuplicateFrameId(1))
        ));
    }

    #[test]
    fn test_invalid_direction_is_fatal() {
        let config = temp_file("dir.toml", "[[bindings]]\nid = 1\ntopic = \"a\"\n");
        let overrides = ConfigOverrides {
            direction: Some("sideways".to_string()),
            ..ConfigOverrides::default()
        };

        let err = load(Some(&config), overrides).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Value(ConfigValueError::InvalidDirection(_))
        ));
    }

    #[test]
    fn test_missing_table_file_is_fatal() {
        let overrides = ConfigOverrides {
            bindings_file: Some(PathBuf::from("/nonexistent/bindings.csv")),
            ..ConfigOverrides::default()
        };
        assert!(matches!(load(None, overrides), Err(ConfigError::Io { .. })));
    }
}
