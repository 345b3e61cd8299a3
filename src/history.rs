use crate::db::{Database, StorageError, HISTORY_KEY};
use crate::models::{is_inline_video, Carousel};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History is too large to store even after trimming to one carousel")]
    TooLarge,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Could not serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    /// Entries written; fewer than requested when old entries were evicted.
    pub kept: usize,
    pub evicted: usize,
}

/// Persists the carousel history list under a single storage key.
pub struct HistoryStore {
    db: Arc<Database>,
}

/// Copy of `carousel` safe to persist: inline video payloads removed.
pub fn persistable(carousel: &Carousel) -> Carousel {
    let mut copy = carousel.clone();
    for slide in &mut copy.slides {
        if slide.video_url.as_deref().is_some_and(is_inline_video) {
            slide.video_url = None;
        }
    }
    copy
}

impl HistoryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Missing or unreadable history loads as empty.
    pub fn load(&self) -> Result<Vec<Carousel>, StorageError> {
        let Some(raw) = self.db.get_item(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(history) => Ok(history),
            Err(e) => {
                tracing::warn!(error = %e, "Stored history is unreadable, starting empty");
                Ok(Vec::new())
            }
        }
    }

    /// Stores `history` (newest first). When the store rejects the write as
    /// over quota the oldest entry is dropped and the write retried, down to a
    /// single entry.
    pub fn save(&self, history: &[Carousel]) -> Result<SaveReport, HistoryError> {
        let mut snapshot: Vec<Carousel> = history.iter().map(persistable).collect();
        let requested = snapshot.len();

        loop {
            let json = serde_json::to_string(&snapshot)?;
            match self.db.set_item(HISTORY_KEY, &json) {
                Ok(()) => {
                    return Ok(SaveReport {
                        kept: snapshot.len(),
                        evicted: requested - snapshot.len(),
                    });
                }
                Err(e) if e.is_quota_exceeded() && snapshot.len() > 1 => {
                    let dropped = snapshot.pop();
                    tracing::warn!(
                        dropped = dropped.as_ref().map(|c| c.id.as_str()),
                        remaining = snapshot.len(),
                        bytes = json.len(),
                        "History over storage quota, evicting oldest carousel"
                    );
                }
                Err(e) if e.is_quota_exceeded() => {
                    tracing::error!(bytes = json.len(), "History does not fit in storage");
                    return Err(HistoryError::TooLarge);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
