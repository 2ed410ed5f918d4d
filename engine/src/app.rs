//! `sq` command runner

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;

use crate::core::constants::ENV_LOG;
use crate::core::{Cli, Commands, Dialect, EngineConfig};
use crate::filter::{QueryDecoder, StructuredFilter, encode_filter};
use crate::pagination::PageWindow;
use crate::schema::{SchemaCache, TableSchema};
use crate::sql::{PlanOptions, QueryPlan, SqlValue};

pub struct App;

impl App {
    /// Parse arguments, set up logging and configuration, run the command
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        let cli = Cli::parse();
        Self::init_logging(cli.log_json);
        tracing::debug!("sq starting");

        let config = EngineConfig::load(&cli.overrides())?;
        let decoder = QueryDecoder::new(config.decode.clone());

        match cli.command {
            Commands::Decode { param } => {
                let filter = decoder.decode_filter(&param)?;
                println!("{}", serde_json::to_string_pretty(&filter)?);
            }
            Commands::Encode { json } => {
                let filter: StructuredFilter =
                    serde_json::from_str(&json).context("Failed to parse filter JSON")?;
                println!("{}", encode_filter(&filter));
            }
            Commands::Parse { query } => {
                let params = decoder.parse_query_string(&query)?;
                let out = json!({
                    "filter": params.filter,
                    "pageIndex": params.page_index,
                    "pageSize": params.page_size,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            Commands::Explain {
                database,
                table,
                filter,
                sort,
                page_index,
                size,
            } => {
                let mut filter = decoder.decode_filter(&filter)?;
                let sorts = decoder.decode_sort(&sort)?;
                if !sorts.is_empty() {
                    filter.sort_fields = sorts;
                }
                let window = PageWindow::with_default_size(page_index, size, config.default_page_size);
                Self::explain(&config, &database, &table, &filter, window).await?;
            }
            Commands::Config => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        Ok(())
    }

    fn init_logging(json: bool) {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "warn".to_string());

        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_env_filter(filter);
        if json {
            builder.json().init();
        } else {
            builder.compact().init();
        }
    }

    async fn explain(
        config: &EngineConfig,
        database: &Path,
        table: &str,
        filter: &StructuredFilter,
        window: PageWindow,
    ) -> Result<()> {
        let options = SqliteConnectOptions::new().filename(database).read_only(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", database.display()))?;

        let schema = TableSchema::introspect(&pool, table).await?;
        let plan = QueryPlan::build(
            &schema,
            &SchemaCache::new(),
            &config.sql,
            filter,
            &PlanOptions::default(),
        )?;
        pool.close().await;

        println!("{};", plan.count_sql());
        println!("{};", plan.select_sql(Some(window), false));
        for line in param_lines(config.sql.dialect, &plan.params) {
            println!("{}", line);
        }
        Ok(())
    }
}

/// Bound parameters as SQL comments, labelled with the dialect's placeholder
fn param_lines(dialect: Dialect, params: &[SqlValue]) -> Vec<String> {
    params
        .iter()
        .enumerate()
        .map(|(i, value)| format!("-- #{} {} = {}", i + 1, dialect.placeholder(i + 1), value))
        .collect()
}
