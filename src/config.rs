/*!
 * Configuration types for the cellmaster
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cellmaster_chunk_server::DynamicChunkManagerConfig;
use cellmaster_core_object::CellTag;
use cellmaster_object_server::ObjectManagerConfig;

use crate::error::{MasterError, Result};

/// Static master configuration, loaded once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MasterConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cell: CellConfig,

    #[serde(default)]
    pub object_manager: ObjectManagerConfig,

    #[serde(default)]
    pub chunk_manager: DynamicChunkManagerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for level = debug)
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConfig {
    /// Tag of this master cell, stamped into every generated id
    #[serde(default = "default_cell_tag")]
    pub cell_tag: u16,

    /// Secondary cells sharing inter-DC bandwidth with this one
    #[serde(default)]
    pub secondary_cell_tags: Vec<u16>,
}

fn default_cell_tag() -> u16 {
    1
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            cell_tag: default_cell_tag(),
            secondary_cell_tags: Vec::new(),
        }
    }
}

impl CellConfig {
    pub fn cell_tag(&self) -> CellTag {
        CellTag(self.cell_tag)
    }

    pub fn secondary_cell_count(&self) -> usize {
        self.secondary_cell_tags.len()
    }
}

/// The part of the config that may change while the master runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DynamicClusterConfig {
    #[serde(default)]
    pub object_manager: ObjectManagerConfig,

    #[serde(default)]
    pub chunk_manager: DynamicChunkManagerConfig,
}

impl DynamicClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.object_manager.gc_sweep_period_ms == 0 {
            return Err(MasterError::Config(
                "object_manager.gc_sweep_period_ms must be > 0".to_string(),
            ));
        }
        if self.object_manager.max_objects_per_gc_sweep == 0 {
            return Err(MasterError::Config(
                "object_manager.max_objects_per_gc_sweep must be >= 1".to_string(),
            ));
        }
        self.chunk_manager.validate()?;
        Ok(())
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl MasterConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: MasterConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn dynamic_config(&self) -> DynamicClusterConfig {
        DynamicClusterConfig {
            object_manager: self.object_manager.clone(),
            chunk_manager: self.chunk_manager.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell.cell_tag == 0 {
            return Err(MasterError::Config("cell.cell_tag must be non-zero".to_string()));
        }
        if self.cell.secondary_cell_tags.contains(&self.cell.cell_tag) {
            return Err(MasterError::Config(format!(
                "cell.secondary_cell_tags must not contain the primary tag {}",
                self.cell.cell_tag
            )));
        }
        self.dynamic_config().validate()
    }
}
