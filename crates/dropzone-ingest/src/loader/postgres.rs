//! PostgreSQL destination

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::TableWriter;
use crate::config::DatabaseConfig;
use crate::error::{BoxError, Result};
use crate::table::{ColumnType, TabularBatch, Value};

/// Bind parameters PostgreSQL accepts in one statement
pub const PG_MAX_BIND_PARAMS: usize = 65_535;

/// Appends batches with multi-row `INSERT` statements.
///
/// Each chunk runs as its own autocommitted statement.
#[derive(Debug, Clone)]
pub struct PgTableWriter {
    pool: PgPool,
    schema: Option<String>,
}

impl PgTableWriter {
    pub fn new(pool: PgPool, schema: Option<String>) -> Self {
        Self { pool, schema }
    }

    /// Open a pool using the database settings
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(&config.url)?;
        if let Some(secs) = config.statement_timeout_secs {
            options = options.options([("statement_timeout", format!("{}s", secs))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await?;

        info!(
            max_connections = config.max_connections,
            schema = config.schema.as_deref().unwrap_or("public"),
            "Database connection pool established"
        );
        Ok(Self::new(pool, config.schema.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn qualified(&self, table: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
            None => quote_ident(table),
        }
    }
}

/// Double-quote an identifier, escaping embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE IF NOT EXISTS` statement for the batch's columns
pub fn create_table_sql(qualified_table: &str, batch: &TabularBatch) -> String {
    let columns: Vec<String> = batch
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.kind.sql_type()))
        .collect();
    format!("CREATE TABLE IF NOT EXISTS {} ({})", qualified_table, columns.join(", "))
}

fn push_value(b: &mut Separated<'_, '_, Postgres, &'static str>, kind: ColumnType, value: &Value) {
    match value {
        Value::Integer(v) => b.push_bind(*v),
        Value::Float(v) => b.push_bind(*v),
        Value::Boolean(v) => b.push_bind(*v),
        Value::Timestamp(v) => b.push_bind(*v),
        Value::Text(v) => b.push_bind(v.clone()),
        // typed nulls so the server can resolve parameter types
        Value::Null => match kind {
            ColumnType::Integer => b.push_bind(None::<i64>),
            ColumnType::Float => b.push_bind(None::<f64>),
            ColumnType::Boolean => b.push_bind(None::<bool>),
            ColumnType::Timestamp => b.push_bind(None::<chrono::DateTime<chrono::Utc>>),
            ColumnType::Text => b.push_bind(None::<String>),
        },
    };
}

#[async_trait]
impl TableWriter for PgTableWriter {
    async fn ensure_table(&self, table: &str, batch: &TabularBatch) -> std::result::Result<(), BoxError> {
        let sql = create_table_sql(&self.qualified(table), batch);
        debug!(table, %sql, "Ensuring destination table");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_rows(
        &self,
        table: &str,
        batch: &TabularBatch,
        rows: Range<usize>,
    ) -> std::result::Result<(), BoxError> {
        let columns: Vec<String> = batch.column_names().map(quote_ident).collect();
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            self.qualified(table),
            columns.join(", ")
        ));

        query_builder.push_values(rows, |mut b, row| {
            for column in batch.columns() {
                push_value(&mut b, column.kind, &column.values[row]);
            }
        });

        query_builder.build().execute(&self.pool).await?;
        Ok(())
    }

    fn max_rows_per_insert(&self, column_count: usize) -> usize {
        PG_MAX_BIND_PARAMS / column_count.max(1)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
