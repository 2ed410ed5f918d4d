//! Engine configuration
//!
//! Priority (lowest to highest): built-in defaults, JSON config file,
//! CLI/environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE, MAX_FILTER_PARAM_SIZE,
    MAX_FILTER_TERMS,
};

// =============================================================================
// Dialect Enum
// =============================================================================

/// SQL dialect the compiler renders for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(format!(
                "Invalid dialect '{}'. Valid options: sqlite, postgres",
                s
            )),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Sqlite => write!(f, "sqlite"),
            Dialect::Postgres => write!(f, "postgres"),
        }
    }
}

// =============================================================================
// Unknown Field Policy
// =============================================================================

/// What a backend does with a filter or sort field that does not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldPolicy {
    /// Drop the term, log a warning and continue
    Skip,
    /// Fail the whole call with `InvalidFieldPath`
    Reject,
}

impl UnknownFieldPolicy {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "reject" => Ok(Self::Reject),
            _ => Err(format!(
                "Invalid unknown-field policy '{}'. Valid options: skip, reject",
                s
            )),
        }
    }
}

impl fmt::Display for UnknownFieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownFieldPolicy::Skip => write!(f, "skip"),
            UnknownFieldPolicy::Reject => write!(f, "reject"),
        }
    }
}

// =============================================================================
// File Config
// =============================================================================

/// Pagination section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PaginationFileConfig {
    pub page_size: Option<u64>,
}

/// SQL backend section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SqlFileConfig {
    pub dialect: Option<Dialect>,
    pub unknown_fields: Option<UnknownFieldPolicy>,
}

/// In-memory backend section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MemoryFileConfig {
    pub batch_size: Option<usize>,
    pub max_workers: Option<usize>,
    pub unknown_fields: Option<UnknownFieldPolicy>,
}

/// Request decoding limits (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DecodeFileConfig {
    pub max_param_size: Option<usize>,
    pub max_terms: Option<usize>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub pagination: Option<PaginationFileConfig>,
    pub sql: Option<SqlFileConfig>,
    pub memory: Option<MemoryFileConfig>,
    pub decode: Option<DecodeFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Resolved Config
// =============================================================================

/// Overrides supplied by the CLI (clap fills these from flags or env vars)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config: Option<PathBuf>,
    pub page_size: Option<u64>,
    pub batch_size: Option<usize>,
    pub max_workers: Option<usize>,
    pub dialect: Option<Dialect>,
    pub sql_unknown_fields: Option<UnknownFieldPolicy>,
    pub memory_unknown_fields: Option<UnknownFieldPolicy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlConfig {
    pub dialect: Dialect,
    pub unknown_fields: UnknownFieldPolicy,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            unknown_fields: UnknownFieldPolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub unknown_fields: UnknownFieldPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: default_max_workers(),
            unknown_fields: UnknownFieldPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodeLimits {
    pub max_param_size: usize,
    pub max_terms: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_param_size: MAX_FILTER_PARAM_SIZE,
            max_terms: MAX_FILTER_TERMS,
        }
    }
}

/// Fully resolved engine configuration
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    pub default_page_size: u64,
    pub sql: SqlConfig,
    pub memory: MemoryConfig,
    pub decode: DecodeLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            sql: SqlConfig::default(),
            memory: MemoryConfig::default(),
            decode: DecodeLimits::default(),
        }
    }
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl EngineConfig {
    /// Load configuration from all sources
    ///
    /// The config file is the overridden path (which must exist) or
    /// `sq.json` in the working directory when present.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        tracing::debug!("Loading engine configuration");
        tracing::trace!(overrides = ?overrides, "Config overrides");

        let path = match &overrides.config {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.clone())
            }
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                if local.exists() { Some(local) } else { None }
            }
        };

        let file_config = match path {
            Some(path) => {
                let loaded = FileConfig::load_from_file(&path)?;
                loaded.warn_unknown_fields();
                loaded
            }
            None => FileConfig::default(),
        };

        Self::layer(file_config, overrides)
    }

    fn layer(file_config: FileConfig, overrides: &ConfigOverrides) -> Result<Self> {
        let defaults = Self::default();
        let file_pagination = file_config.pagination.unwrap_or_default();
        let file_sql = file_config.sql.unwrap_or_default();
        let file_memory = file_config.memory.unwrap_or_default();
        let file_decode = file_config.decode.unwrap_or_default();

        let config = Self {
            default_page_size: overrides
                .page_size
                .or(file_pagination.page_size)
                .unwrap_or(defaults.default_page_size),
            sql: SqlConfig {
                dialect: overrides
                    .dialect
                    .or(file_sql.dialect)
                    .unwrap_or(defaults.sql.dialect),
                unknown_fields: overrides
                    .sql_unknown_fields
                    .or(file_sql.unknown_fields)
                    .unwrap_or(defaults.sql.unknown_fields),
            },
            memory: MemoryConfig {
                batch_size: overrides
                    .batch_size
                    .or(file_memory.batch_size)
                    .unwrap_or(defaults.memory.batch_size),
                max_workers: overrides
                    .max_workers
                    .or(file_memory.max_workers)
                    .unwrap_or(defaults.memory.max_workers),
                unknown_fields: overrides
                    .memory_unknown_fields
                    .or(file_memory.unknown_fields)
                    .unwrap_or(defaults.memory.unknown_fields),
            },
            decode: DecodeLimits {
                max_param_size: file_decode
                    .max_param_size
                    .unwrap_or(defaults.decode.max_param_size),
                max_terms: file_decode.max_terms.unwrap_or(defaults.decode.max_terms),
            },
        };
        config.validate()?;

        tracing::debug!(
            page_size = config.default_page_size,
            dialect = %config.sql.dialect,
            batch_size = config.memory.batch_size,
            max_workers = config.memory.max_workers,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            anyhow::bail!("pagination.page_size must be at least 1");
        }
        if self.memory.batch_size == 0 {
            anyhow::bail!("memory.batch_size must be at least 1");
        }
        if self.memory.max_workers == 0 {
            anyhow::bail!("memory.max_workers must be at least 1");
        }
        Ok(())
    }
}
