//! PostgreSQL destination tests
//!
//! These tests require Docker. Run with:
//!
//! ```bash
//! cargo test -p dropzone-ingest --test postgres_tests -- --ignored --nocapture
//! ```

mod common;

use anyhow::Result;
use common::{init_tracing, Workspace, FEB, JAN};
use dropzone_ingest::loader::{BatchLoader, PgTableWriter};
use dropzone_ingest::table::TabularBatch;
use dropzone_ingest::{IngestError, IngestionOutcome, Orchestrator};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

async fn start_postgres() -> Result<(ContainerAsync<Postgres>, PgPool)> {
    let container = Postgres::default().with_tag("16-alpine").start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;
    Ok((container, pool))
}

async fn count_rows(pool: &PgPool, table: &str) -> Result<i64> {
    let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_runs_are_idempotent_against_postgres() -> Result<()> {
    init_tracing();
    let (_container, pool) = start_postgres().await?;

    let ws = Workspace::new();
    let product = ws.product();
    ws.drop_file(&product, "jan.csv", JAN);
    ws.drop_file(&product, "feb.csv", FEB);

    let writer = Arc::new(PgTableWriter::new(pool.clone(), None));
    let orchestrator = Orchestrator::from_config(&ws.config, writer)?;

    let first = orchestrator.run_source(&ws.config, &product).await?;
    assert_eq!(first.rows_loaded, 5);
    assert_eq!(count_rows(&pool, "ProductSales").await?, 5);

    let second = orchestrator.run_source(&ws.config, &product).await?;
    assert_eq!(second.duplicates, 2);
    assert_eq!(count_rows(&pool, "ProductSales").await?, 5);

    let unknown: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM \"ProductSales\" WHERE \"Product_Type\" = 'Unknown'",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(unknown, 1);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_inferred_column_types() -> Result<()> {
    init_tracing();
    let (_container, pool) = start_postgres().await?;

    let ws = Workspace::new();
    let product = ws.product();
    ws.drop_file(&product, "jan.csv", JAN);

    let writer = Arc::new(PgTableWriter::new(pool.clone(), None));
    Orchestrator::from_config(&ws.config, writer)?
        .run_source(&ws.config, &product)
        .await?;

    let types: Vec<(String, String)> = sqlx::query_as(
        "SELECT column_name::text, data_type::text FROM information_schema.columns \
         WHERE table_name = 'ProductSales' ORDER BY ordinal_position",
    )
    .fetch_all(&pool)
    .await?;

    let expected = [
        ("Region", "text"),
        ("Product_Type", "text"),
        ("Units", "bigint"),
        ("Unit_Price", "double precision"),
        ("Source_File", "text"),
        ("Load_Timestamp", "timestamp with time zone"),
        ("File_Drop_Time", "timestamp with time zone"),
    ];
    let actual: Vec<(&str, &str)> = types.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
    assert_eq!(actual, expected);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_wide_batch_respects_bind_limit() -> Result<()> {
    init_tracing();
    let (_container, pool) = start_postgres().await?;

    // 100 columns x 1000 rows needs 100k binds at the default chunk size
    let header: Vec<String> = (0..100).map(|i| format!("c{i}")).collect();
    let mut csv = header.join(",");
    csv.push('\n');
    for row in 0..1000 {
        let cells: Vec<String> = (0..100).map(|c| (row * c).to_string()).collect();
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    let batch = TabularBatch::from_csv(csv.as_bytes())?;

    let loader = BatchLoader::new(Arc::new(PgTableWriter::new(pool.clone(), None)), 1000)?;
    assert_eq!(loader.append("Wide", &batch).await?, 1000);
    assert_eq!(count_rows(&pool, "Wide").await?, 1000);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_incompatible_table_is_load_error() -> Result<()> {
    init_tracing();
    let (_container, pool) = start_postgres().await?;
    sqlx::query("CREATE TABLE \"ProductSales\" (\"Region\" TEXT)")
        .execute(&pool)
        .await?;

    let ws = Workspace::new();
    let product = ws.product();
    ws.drop_file(&product, "jan.csv", JAN);

    let writer = Arc::new(PgTableWriter::new(pool.clone(), None));
    let summary = Orchestrator::from_config(&ws.config, writer)?
        .run_source(&ws.config, &product)
        .await?;

    assert!(matches!(summary.outcome("jan.csv"), Some(IngestionOutcome::LoadError(_))));
    assert!(!ws.ledger_path().exists());

    let direct = BatchLoader::new(Arc::new(PgTableWriter::new(pool, None)), 500)?
        .append("ProductSales", &TabularBatch::from_csv(b"Other\n1\n")?)
        .await;
    assert!(matches!(direct, Err(IngestError::Load { rows_written: 0, .. })));

    Ok(())
}
