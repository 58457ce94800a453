//! SQLite-backed persistence for the local store: device identity, the
//! local user's key history, and cached groups/resource keys/provisional
//! user keys. Runs in WAL mode with embedded migrations, mirroring
//! `dl_store::db`'s setup.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

use crate::error::StoreError;

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(StoreError::Sqlx)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drops every row outside the `device_identity`/`local_user_keys`
    /// tables — the projection caches are rebuilt lazily on the next pull.
    pub async fn flush_all_caches(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM groups").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM resource_keys").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM provisional_user_keys").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_runs_migrations() {
        let db = Db::open_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM device_identity")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn flush_all_caches_leaves_device_identity_alone() {
        let db = Db::open_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO device_identity (id, user_id, device_id, signature_secret_key, encryption_secret_key, trustchain_public_signature_key, device_initialized) VALUES (1, x'00', x'00', x'00', x'00', x'00', 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO resource_keys (resource_id, key) VALUES (x'aa', x'bb')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        db.flush_all_caches().await.unwrap();

        let identity_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM device_identity")
            .fetch_one(db.pool())
            .await
            .unwrap();
        let resource_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resource_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(identity_count.0, 1);
        assert_eq!(resource_count.0, 0);
    }
}
