use crate::db::{Database, StorageError, SETTINGS_KEY};
use crate::models::{AppSettings, BrandKit};
use std::sync::Arc;

/// Loads, merges and persists [`AppSettings`] as one JSON blob.
pub struct SettingsStore {
    db: Arc<Database>,
}

impl SettingsStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Stored fields are merged over defaults; a corrupt blob yields defaults.
    pub fn load(&self) -> Result<AppSettings, StorageError> {
        let Some(raw) = self.db.get_item(SETTINGS_KEY)? else {
            return Ok(AppSettings::default());
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                tracing::warn!(error = %e, "Stored settings are unreadable, using defaults");
                Ok(AppSettings::default())
            }
        }
    }

    pub fn save(&self, settings: &AppSettings) -> Result<(), StorageError> {
        let json = serde_json::to_string(settings).unwrap_or_else(|_| "{}".to_string());
        self.db.set_item(SETTINGS_KEY, &json)
    }

    pub fn set_api_key(&self, settings: &mut AppSettings, api_key: &str) -> Result<(), StorageError> {
        settings.api_key = api_key.trim().to_string();
        self.save(settings)
    }

    pub fn set_brand_kit(&self, settings: &mut AppSettings, kit: BrandKit) -> Result<(), StorageError> {
        settings.brand_kit = kit;
        self.save(settings)
    }
}

impl AppSettings {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// API key masked for display, e.g. `AIza...9xQk`.
    pub fn masked_api_key(&self) -> String {
        let value = self.api_key.as_str();
        if value.chars().count() > 8 {
            let head: String = value.chars().take(4).collect();
            let tail: String = value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("{}...{}", head, tail)
        } else if value.is_empty() {
            String::new()
        } else {
            "****".to_string()
        }
    }
}
