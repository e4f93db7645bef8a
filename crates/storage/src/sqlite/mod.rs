use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, SqliteConnection, SqlitePool};

use super::error::{
    CreateSqliteDirectorySnafu, InvariantViolationSnafu, SqliteConnectOptionsSnafu,
    SqliteConnectSnafu, SqliteMigrateSnafu, SqlitePragmaSnafu, SqliteQuerySnafu,
    SqliteRuntimeInitSnafu, SqliteThreadSpawnSnafu, StorageResult,
};
use super::{KeyValueStore, validate_key};

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    database_url: String,
}

impl SqliteStorage {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        let _: String = sqlx::query_scalar("PRAGMA journal_mode = WAL;")
            .fetch_one(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-journal-mode",
                pragma: "journal_mode",
            })?;
        sqlx::query("PRAGMA busy_timeout = 5000;")
            .execute(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-busy-timeout",
                pragma: "busy_timeout",
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;

        tracing::info!(database_url = %database_url, "opened auth storage");
        Ok(Self { pool, database_url })
    }

    fn run_db_call<T, F>(&self, stage: &'static str, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        // Each call runs on its own thread with a current-thread runtime.
        let worker = std::thread::Builder::new()
            .name(format!("sqlite-store-{stage}"))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context(SqliteRuntimeInitSnafu {
                        stage: "sqlite-store-runtime-build",
                    })?;
                runtime.block_on(op)
            })
            .context(SqliteThreadSpawnSnafu {
                stage: "sqlite-store-spawn-worker",
            })?;

        match worker.join() {
            Ok(result) => result,
            Err(_) => InvariantViolationSnafu {
                stage,
                details: "sqlite storage worker thread panicked".to_string(),
            }
            .fail(),
        }
    }
}

impl KeyValueStore for SqliteStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key, "item-get")?;
        let database_url = self.database_url.clone();
        let key = key.to_string();
        self.run_db_call("item-get", async move {
            let mut connection = connect_store_connection(&database_url, "item-get-connect").await?;
            sqlx::query_scalar::<_, String>("SELECT value FROM auth_items WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut connection)
                .await
                .context(SqliteQuerySnafu {
                    stage: "item-get-select",
                })
        })
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key, "item-set")?;
        let database_url = self.database_url.clone();
        let key = key.to_string();
        let value = value.to_string();
        self.run_db_call("item-set", async move {
            let mut connection = connect_store_connection(&database_url, "item-set-connect").await?;
            sqlx::query(
                "INSERT INTO auth_items (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(unix_timestamp_seconds())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "item-set-upsert",
            })?;
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        validate_key(key, "item-remove")?;
        let database_url = self.database_url.clone();
        let key = key.to_string();
        self.run_db_call("item-remove", async move {
            let mut connection =
                connect_store_connection(&database_url, "item-remove-connect").await?;
            sqlx::query("DELETE FROM auth_items WHERE key = ?")
                .bind(key)
                .execute(&mut connection)
                .await
                .context(SqliteQuerySnafu {
                    stage: "item-remove-delete",
                })?;
            Ok(())
        })
    }
}

async fn connect_store_connection(
    database_url: &str,
    stage: &'static str,
) -> StorageResult<SqliteConnection> {
    let mut connection =
        SqliteConnection::connect(database_url)
            .await
            .context(SqliteConnectSnafu {
                stage,
                database_url: database_url.to_string(),
            })?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(&mut connection)
        .await
        .context(SqlitePragmaSnafu {
            stage: "sqlite-store-pragma-busy-timeout",
            pragma: "busy_timeout",
        })?;

    Ok(connection)
}

fn unix_timestamp_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0_i64, |duration| duration.as_secs() as i64)
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") || database_location == ":memory:" {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    format!("sqlite://{database_location}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_paths_and_memory() {
        assert_eq!(normalize_database_url(":memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_database_url("/tmp/ferrer/auth.sqlite"),
            "sqlite:///tmp/ferrer/auth.sqlite"
        );
        assert_eq!(
            normalize_database_url("sqlite:///already/url.db"),
            "sqlite:///already/url.db"
        );
    }

    #[tokio::test]
    async fn items_survive_reopen() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("nested").join("auth.sqlite");
        let location = path.display().to_string();

        let storage = SqliteStorage::open(&location).await.unwrap();
        assert_eq!(storage.get_item("sb-auth-token").unwrap(), None);
        storage.set_item("sb-auth-token", "{\"a\":1}").unwrap();
        storage.set_item("sb-auth-token", "{\"a\":2}").unwrap();
        storage
            .set_item("sb-auth-token-code-verifier", "verifier")
            .unwrap();
        drop(storage);

        let reopened = SqliteStorage::open(&location).await.unwrap();
        assert_eq!(
            reopened.get_item("sb-auth-token").unwrap().as_deref(),
            Some("{\"a\":2}")
        );

        reopened.remove_item("sb-auth-token-code-verifier").unwrap();
        assert_eq!(reopened.get_item("sb-auth-token-code-verifier").unwrap(), None);
    }
}
