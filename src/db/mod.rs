pub mod models;
pub mod profiles;

use models::UserProfile;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

pub const SETTINGS_KEY: &str = "carousel_studio.settings";
pub const USER_PROFILE_KEY: &str = "carousel_studio.user_profile";
pub const HISTORY_KEY: &str = "carousel_studio.history";
pub const DOWNLOAD_COUNT_KEY: &str = "carousel_studio.download_count";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage quota exceeded writing {key}: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded { key: String, needed: u64, quota: u64 },
    #[error("Database connection lock poisoned")]
    Poisoned,
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Durable string key-value store with a byte quota, plus the profile table.
pub struct Database {
    pub conn: Mutex<Connection>,
    quota_bytes: u64,
}

impl Database {
    pub fn new(app_dir: &std::path::Path, quota_bytes: u64) -> Result<Self, StorageError> {
        std::fs::create_dir_all(app_dir)?;
        let db_path = app_dir.join("carousel-studio.db");
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, quota_bytes)
    }

    pub fn open_in_memory(quota_bytes: u64) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, quota_bytes)
    }

    fn with_connection(conn: Connection, quota_bytes: u64) -> Result<Self, StorageError> {
        let db = Self {
            conn: Mutex::new(conn),
            quota_bytes,
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                picture TEXT,
                niches TEXT NOT NULL DEFAULT '[]',
                is_complete INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    // ── Key-value storage ──

    pub fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Writes `value` under `key`, rejecting the write when the sum of all
    /// stored values would exceed the quota.
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let others: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM storage WHERE key != ?1",
            params![key],
            |row| row.get(0),
        )?;
        let needed = u64::try_from(others).unwrap_or(0) + value.len() as u64;
        if needed > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed,
                quota: self.quota_bytes,
            });
        }
        conn.execute(
            "INSERT INTO storage (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM storage WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ── Download counter ──

    pub fn download_count(&self) -> Result<u64, StorageError> {
        Ok(self
            .get_item(DOWNLOAD_COUNT_KEY)?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0))
    }

    pub fn increment_download_count(&self) -> Result<u64, StorageError> {
        let next = self.download_count()? + 1;
        self.set_item(DOWNLOAD_COUNT_KEY, &next.to_string())?;
        Ok(next)
    }

    // ── Profiles ──

    pub fn find_profile(&self, id: &str) -> Result<Option<UserProfile>, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, email, name, picture, niches, is_complete FROM profiles WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(id, email, name, picture, niches, is_complete)| UserProfile {
            id,
            email,
            name,
            picture,
            niches: serde_json::from_str(&niches).unwrap_or_default(),
            is_complete,
        }))
    }

    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let niches = serde_json::to_string(&profile.niches).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO profiles (id, email, name, picture, niches, is_complete)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                picture = excluded.picture,
                niches = excluded.niches,
                is_complete = excluded.is_complete,
                updated_at = datetime('now')",
            params![
                profile.id,
                profile.email,
                profile.name,
                profile.picture,
                niches,
                profile.is_complete
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_item() {
        let db = Database::open_in_memory(1024).unwrap();
        assert_eq!(db.get_item("k").unwrap(), None);
        db.set_item("k", "v1").unwrap();
        db.set_item("k", "v2").unwrap();
        assert_eq!(db.get_item("k").unwrap().as_deref(), Some("v2"));
        db.remove_item("k").unwrap();
        assert_eq!(db.get_item("k").unwrap(), None);
    }

    #[test]
    fn test_quota_counts_other_keys_but_not_replaced_value() {
        let db = Database::open_in_memory(10).unwrap();
        db.set_item("a", "12345").unwrap();
        // Replacing "a" only counts the new value.
        db.set_item("a", "1234567890").unwrap();
        let err = db.set_item("b", "x").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(db.get_item("b").unwrap(), None);
    }

    #[test]
    fn test_download_counter_increments() {
        let db = Database::open_in_memory(1024).unwrap();
        assert_eq!(db.download_count().unwrap(), 0);
        assert_eq!(db.increment_download_count().unwrap(), 1);
        assert_eq!(db.increment_download_count().unwrap(), 2);
        assert_eq!(db.download_count().unwrap(), 2);
    }

    #[test]
    fn test_profile_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let profile = UserProfile {
            id: "u1".into(),
            email: "ana@example.com".into(),
            name: "Ana".into(),
            picture: None,
            niches: vec!["Food".into(), "Travel".into()],
            is_complete: true,
        };
        {
            let db = Database::new(dir.path(), 1024).unwrap();
            assert!(db.find_profile("u1").unwrap().is_none());
            db.upsert_profile(&profile).unwrap();
        }
        let db = Database::new(dir.path(), 1024).unwrap();
        assert_eq!(db.find_profile("u1").unwrap(), Some(profile));
    }
}
