//! Postgres pool and schema migrations for the ledger backend.
//!
//! Only used when `ledger_backend = "postgres"`; order sessions themselves
//! are kept in memory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use app_config::AppConfig;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio::fs;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::info;

/// Creates the connection pool and applies migrations from `migrations_dir`.
///
/// # Errors
/// Returns an error if the DSN is invalid, the pool cannot be built, or a
/// migration fails.
pub async fn init_db_pool(cfg: &AppConfig, migrations_dir: &Path) -> Result<Pool> {
    let pg_config: PgConfig = cfg
        .database_dsn()
        .parse()
        .context("Failed to parse Postgres DSN")?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(mgr)
        .max_size(8)
        .runtime(Runtime::Tokio1)
        .build()
        .context("Failed to create database pool")?;

    let client = pool
        .get()
        .await
        .context("Failed to get DB connection for migrations")?;
    run_migrations(&client, migrations_dir).await?;

    Ok(pool)
}

/// Lists `.sql` files in `dir`, sorted by file name so numbered migrations apply in order.
pub async fn migration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read migrations directory {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Applies every migration in `dir`. Migrations must be idempotent
/// (`IF NOT EXISTS`), since they run on every start.
pub async fn run_migrations(client: &Client, dir: &Path) -> Result<()> {
    for path in migration_files(dir).await? {
        let name = path.display().to_string();
        info!(migration = %name, "applying migration");
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read migration file {name}"))?;
        client
            .batch_execute(&content)
            .await
            .with_context(|| format!("Failed to execute migration {name}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migration_files_sorted_and_filtered() {
        let dir = std::env::temp_dir().join(format!("orderbot-migrations-{}", std::process::id()));
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join("002_second.sql"), "SELECT 2;").await.unwrap();
        fs::write(dir.join("001_first.sql"), "SELECT 1;").await.unwrap();
        fs::write(dir.join("README.md"), "notes").await.unwrap();

        let files = migration_files(&dir).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["001_first.sql", "002_second.sql"]);

        fs::remove_dir_all(&dir).await.unwrap();
    }
}
