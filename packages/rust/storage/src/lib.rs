//! Local libSQL credential store.
//!
//! Holds the catalog accounts whose API keys authorize dataset writes. The
//! `accounts` CLI commands write through [`Storage::open`]; the queue worker
//! only reads and may use [`Storage::open_readonly`].

mod migrations;

use std::path::Path;

use catalogwriter_shared::{AccountId, CatalogAccount, CatalogWriterError, Result};
use libsql::{Connection, Database, params};

/// Credential database handle.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open the database at `path`, creating it and its parent directory
    /// if needed, and bring the schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CatalogWriterError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database for lookups only. Writes are refused.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogWriterError::Storage(format!(
                "credential database not found at {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;
        tracing::debug!(path = %path.display(), readonly, "credential database opened");
        Ok(Self { db, conn, readonly })
    }

    async fn run_migrations(&self) -> Result<()> {
        let applied = self.get_schema_version().await;

        for migration in migrations::all_migrations()
            .iter()
            .filter(|m| m.version > applied)
        {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            self.conn.execute_batch(migration.sql).await.map_err(|e| {
                CatalogWriterError::Storage(format!("migration v{} failed: {e}", migration.version))
            })?;
        }
        Ok(())
    }

    /// Highest applied migration, 0 on a fresh database.
    async fn get_schema_version(&self) -> u32 {
        let Ok(mut rows) = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await
        else {
            return 0;
        };

        match rows.next().await {
            Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
            _ => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CatalogWriterError::Storage(
                "credential database is read-only".into(),
            ));
        }
        Ok(())
    }

    /// Insert a catalog account.
    pub async fn insert_account(&self, account: &CatalogAccount) -> Result<()> {
        self.check_writable()?;
        if account.api_key.trim().is_empty() {
            return Err(CatalogWriterError::validation("API key must not be empty"));
        }
        self.conn
            .execute(
                "INSERT INTO catalog_accounts (id, name, api_key, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    account.id.to_string(),
                    account.name.as_str(),
                    account.api_key.as_str(),
                    account.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        tracing::debug!(id = %account.id, name = %account.name, "stored catalog account");
        Ok(())
    }

    /// List all accounts, oldest first.
    pub async fn list_accounts(&self) -> Result<Vec<CatalogAccount>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, api_key, created_at FROM catalog_accounts
                 ORDER BY created_at, id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut accounts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(storage_err)?
        {
            accounts.push(row_to_account(&row)?);
        }
        Ok(accounts)
    }

    /// Delete an account by ID. Returns `false` if no such account existed.
    pub async fn delete_account(&self, id: &AccountId) -> Result<bool> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "DELETE FROM catalog_accounts WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        Ok(affected > 0)
    }
}

fn storage_err(e: libsql::Error) -> CatalogWriterError {
    CatalogWriterError::Storage(e.to_string())
}

fn row_to_account(row: &libsql::Row) -> Result<CatalogAccount> {
    let id: String = row.get(0).map_err(storage_err)?;
    let created_at: String = row.get(3).map_err(storage_err)?;

    Ok(CatalogAccount {
        id: id
            .parse()
            .map_err(|e| CatalogWriterError::Storage(format!("invalid account id '{id}': {e}")))?,
        name: row.get(1).map_err(storage_err)?,
        api_key: row.get(2).map_err(storage_err)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| {
                CatalogWriterError::Storage(format!("invalid created_at '{created_at}': {e}"))
            })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cw_test_{}.db", Uuid::now_v7()))
    }

    async fn test_storage() -> Storage {
        Storage::open(&temp_db()).await.expect("open test db")
    }

    #[tokio::test]
    async fn fresh_database_is_migrated() {
        assert_eq!(test_storage().await.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn reopening_does_not_reapply_migrations() {
        let path = temp_db();
        drop(Storage::open(&path).await.expect("first open"));
        let reopened = Storage::open(&path).await.expect("second open");
        assert_eq!(reopened.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn account_crud() {
        let storage = test_storage().await;
        assert!(storage.list_accounts().await.expect("list").is_empty());

        let first = CatalogAccount::new("primary", "key-one");
        storage.insert_account(&first).await.expect("insert first");
        let second = CatalogAccount::new("secondary", "key-two");
        storage.insert_account(&second).await.expect("insert second");

        let accounts = storage.list_accounts().await.expect("list");
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, first.id);
        assert_eq!(accounts[0].api_key, "key-one");
        assert_eq!(accounts[1].name, "secondary");

        assert!(storage.delete_account(&first.id).await.expect("delete"));
        assert!(!storage.delete_account(&first.id).await.expect("delete again"));

        let accounts = storage.list_accounts().await.expect("list");
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, second.id);
    }

    #[tokio::test]
    async fn rejects_empty_api_key() {
        let storage = test_storage().await;
        let result = storage
            .insert_account(&CatalogAccount::new("blank", "   "))
            .await;
        assert!(result.unwrap_err().to_string().contains("API key"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = temp_db();
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_account(&CatalogAccount::new("ops", "secret"))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_accounts().await.unwrap().len(), 1);
        let result = ro.insert_account(&CatalogAccount::new("ops2", "secret2")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("cw_missing_{}.db", Uuid::now_v7()));
        let result = Storage::open_readonly(&tmp).await;
        assert!(result.is_err());
    }
}
