use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::{ConfigOverrides, Dialect, UnknownFieldPolicy};
use super::constants::{
    APP_NAME, ENV_BATCH_SIZE, ENV_CONFIG, ENV_DIALECT, ENV_MAX_WORKERS, ENV_MEMORY_UNKNOWN_FIELDS,
    ENV_PAGE_SIZE, ENV_SQL_UNKNOWN_FIELDS,
};

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version, about = "Structured filter and pagination toolkit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Default page size
    #[arg(long, global = true, env = ENV_PAGE_SIZE)]
    pub page_size: Option<u64>,

    /// In-memory batch size
    #[arg(long, global = true, env = ENV_BATCH_SIZE)]
    pub batch_size: Option<usize>,

    /// In-memory worker limit
    #[arg(long, global = true, env = ENV_MAX_WORKERS)]
    pub max_workers: Option<usize>,

    /// SQL dialect (sqlite or postgres)
    #[arg(long, global = true, env = ENV_DIALECT, value_parser = Dialect::parse)]
    pub dialect: Option<Dialect>,

    /// Unknown-field policy for the SQL backend (skip or reject)
    #[arg(long, global = true, env = ENV_SQL_UNKNOWN_FIELDS, value_parser = UnknownFieldPolicy::parse)]
    pub sql_unknown_fields: Option<UnknownFieldPolicy>,

    /// Unknown-field policy for the in-memory backend (skip or reject)
    #[arg(long, global = true, env = ENV_MEMORY_UNKNOWN_FIELDS, value_parser = UnknownFieldPolicy::parse)]
    pub memory_unknown_fields: Option<UnknownFieldPolicy>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a base64-JSON filter parameter and print it as JSON
    Decode {
        /// Encoded filter parameter
        param: String,
    },
    /// Encode a JSON filter as a base64 parameter
    Encode {
        /// Filter JSON
        json: String,
    },
    /// Decode a `filter|sort|pageIndex|pageSize` query string
    Parse {
        /// Pipe-delimited query string
        query: String,
    },
    /// Print the SQL and parameters for a paginated query
    Explain {
        /// SQLite database file
        #[arg(long)]
        database: PathBuf,

        /// Table to query
        #[arg(long)]
        table: String,

        /// Encoded filter parameter
        #[arg(default_value = "")]
        filter: String,

        /// Encoded sort parameter
        #[arg(long, default_value = "")]
        sort: String,

        /// Page index
        #[arg(long, default_value_t = 0)]
        page_index: i64,

        /// Page size (configured default when zero)
        #[arg(long, default_value_t = 0)]
        size: i64,
    },
    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Config-relevant flags as loader overrides
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config: self.config.clone(),
            page_size: self.page_size,
            batch_size: self.batch_size,
            max_workers: self.max_workers,
            dialect: self.dialect,
            sql_unknown_fields: self.sql_unknown_fields,
            memory_unknown_fields: self.memory_unknown_fields,
        }
    }
}
