use super::models::UserProfile;
use super::{Database, StorageError};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Profile backend unavailable: {0}")]
    Unavailable(String),
}

/// Profile record collaborator keyed by session identity.
///
/// Lookups return `Ok(None)` for a missing profile so callers never have to
/// interpret a backend-specific "not found" error.
#[async_trait]
pub trait ProfileBackend: Send + Sync {
    async fn find_profile(&self, id: &str) -> Result<Option<UserProfile>, ProfileError>;
    async fn save_profile(&self, profile: &UserProfile) -> Result<(), ProfileError>;
}

/// Profiles kept in the local SQLite database.
pub struct SqliteProfiles {
    db: Arc<Database>,
}

impl SqliteProfiles {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileBackend for SqliteProfiles {
    async fn find_profile(&self, id: &str) -> Result<Option<UserProfile>, ProfileError> {
        Ok(self.db.find_profile(id)?)
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), ProfileError> {
        Ok(self.db.upsert_profile(profile)?)
    }
}
