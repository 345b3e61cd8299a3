//! The carousel being edited, the history list, and the operations in flight.
//!
//! Every mutation of a carousel that also lives in history is written back to
//! the same-id history entry and the history is persisted.

use crate::history::{HistoryError, HistoryStore};
use crate::models::{BrandKit, Carousel, DesignPreferences, OverrideField, PreferencesPatch, SlideOverrides};
use std::collections::BTreeSet;

/// A named in-flight operation, keyed by the entity it targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Carousel,
    Headline(String),
    Body(String),
    Image(String),
    EditImage(String),
    Video(String),
    Caption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub slide_id: String,
}

#[derive(Debug, Default)]
pub struct InFlight {
    operations: BTreeSet<Operation>,
    progress: Option<Progress>,
}

impl InFlight {
    pub fn begin(&mut self, op: Operation) {
        self.operations.insert(op);
    }

    pub fn finish(&mut self, op: &Operation) {
        self.operations.remove(op);
    }

    pub fn is_running(&self, op: &Operation) -> bool {
        self.operations.contains(op)
    }

    pub fn is_busy(&self) -> bool {
        !self.operations.is_empty()
    }

    /// True when any operation targeting `slide_id` is running.
    pub fn is_slide_busy(&self, slide_id: &str) -> bool {
        self.operations.iter().any(|op| match op {
            Operation::Headline(id)
            | Operation::Body(id)
            | Operation::Image(id)
            | Operation::EditImage(id)
            | Operation::Video(id) => id == slide_id,
            Operation::Carousel | Operation::Caption => false,
        })
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    pub fn set_progress(&mut self, progress: Option<Progress>) {
        self.progress = progress;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Fields of one slide to overwrite; `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlideUpdate {
    pub headline: Option<String>,
    pub body: Option<String>,
    pub visual_prompt: Option<String>,
    pub image_url: Option<Option<String>>,
    pub video_url: Option<Option<String>>,
    pub overrides: Option<SlideOverrides>,
}

pub struct CarouselSession {
    current: Option<Carousel>,
    history: Vec<Carousel>,
    store: HistoryStore,
    pub in_flight: InFlight,
}

impl CarouselSession {
    pub fn new(store: HistoryStore, history: Vec<Carousel>) -> Self {
        Self {
            current: None,
            history,
            store,
            in_flight: InFlight::default(),
        }
    }

    /// Session seeded from whatever history the store holds.
    pub fn load(store: HistoryStore) -> Self {
        let history = store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read history");
            Vec::new()
        });
        Self::new(store, history)
    }

    pub fn current(&self) -> Option<&Carousel> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[Carousel] {
        &self.history
    }

    fn in_history(&self, id: &str) -> bool {
        self.history.iter().any(|c| c.id == id)
    }

    fn persist(&mut self) -> Result<(), HistoryError> {
        let report = self.store.save(&self.history)?;
        if report.evicted > 0 {
            self.history.truncate(report.kept);
        }
        Ok(())
    }

    /// Applies `f` to the current carousel, then mirrors the result into
    /// history when the carousel is stored there.
    fn mutate_current<F>(&mut self, f: F) -> Result<(), HistoryError>
    where
        F: FnOnce(&mut Carousel) -> bool,
    {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        if !f(current) {
            return Ok(());
        }
        let updated = current.clone();
        match self.history.iter().position(|c| c.id == updated.id) {
            Some(index) => {
                self.history[index] = updated;
                self.persist()
            }
            None => Ok(()),
        }
    }

    /// Makes a freshly generated carousel current and prepends it to history.
    pub fn start_new(&mut self, carousel: Carousel) -> Result<(), HistoryError> {
        self.history.retain(|c| c.id != carousel.id);
        self.history.insert(0, carousel.clone());
        self.current = Some(carousel);
        self.persist()
    }

    pub fn open_from_history(&mut self, id: &str) -> bool {
        match self.history.iter().find(|c| c.id == id) {
            Some(c) => {
                self.current = Some(c.clone());
                true
            }
            None => false,
        }
    }

    pub fn close(&mut self) {
        self.current = None;
    }

    pub fn delete_from_history(&mut self, id: &str) -> Result<(), HistoryError> {
        if !self.in_history(id) {
            return Ok(());
        }
        self.history.retain(|c| c.id != id);
        if self.current.as_ref().is_some_and(|c| c.id == id) {
            self.current = None;
        }
        self.persist()
    }

    pub fn update_slide(&mut self, slide_id: &str, update: SlideUpdate) -> Result<(), HistoryError> {
        self.mutate_current(|carousel| {
            let Some(slide) = carousel.slide_mut(slide_id) else {
                return false;
            };
            if let Some(v) = update.headline {
                slide.headline = v;
            }
            if let Some(v) = update.body {
                slide.body = v;
            }
            if let Some(v) = update.visual_prompt {
                slide.visual_prompt = v;
            }
            if let Some(v) = update.image_url {
                slide.image_url = v;
            }
            if let Some(v) = update.video_url {
                slide.video_url = v;
            }
            if let Some(v) = update.overrides {
                slide.overrides = v;
            }
            true
        })
    }

    /// Swaps the slide with its neighbour; no-op at either end.
    pub fn move_slide(&mut self, slide_id: &str, direction: Direction) -> Result<(), HistoryError> {
        self.mutate_current(|carousel| {
            let Some(index) = carousel.slide_index(slide_id) else {
                return false;
            };
            let target = match direction {
                Direction::Up if index > 0 => index - 1,
                Direction::Down if index + 1 < carousel.slides.len() => index + 1,
                _ => return false,
            };
            carousel.slides.swap(index, target);
            true
        })
    }

    /// Without a current carousel, a placeholder (not in history) is created
    /// to hold the preferences.
    fn ensure_current(&mut self) {
        if self.current.is_none() {
            self.current = Some(Carousel::new("", "", DesignPreferences::default()));
        }
    }

    pub fn set_preferences(&mut self, preferences: DesignPreferences) -> Result<(), HistoryError> {
        self.ensure_current();
        self.mutate_current(|carousel| {
            carousel.preferences = preferences;
            true
        })
    }

    pub fn patch_preferences(&mut self, patch: PreferencesPatch) -> Result<(), HistoryError> {
        self.ensure_current();
        self.mutate_current(|carousel| {
            patch.apply(&mut carousel.preferences);
            true
        })
    }

    pub fn apply_brand_kit(&mut self, kit: &BrandKit) -> Result<(), HistoryError> {
        self.ensure_current();
        self.mutate_current(|carousel| {
            kit.apply_to(&mut carousel.preferences);
            true
        })
    }

    pub fn clear_override(&mut self, field: OverrideField) -> Result<(), HistoryError> {
        self.mutate_current(|carousel| {
            for slide in &mut carousel.slides {
                slide.overrides.clear(field);
            }
            true
        })
    }

    pub fn set_caption(&mut self, caption: String) -> Result<(), HistoryError> {
        self.mutate_current(|carousel| {
            carousel.caption = Some(caption);
            true
        })
    }

    /// Writes the current carousel into history: replaces the same-id entry,
    /// or prepends it when it has slides and is not stored yet.
    pub fn flush_into_history(&mut self) -> Result<(), HistoryError> {
        let Some(current) = self.current.clone() else {
            return Ok(());
        };
        match self.history.iter().position(|c| c.id == current.id) {
            Some(index) if self.history[index] == current => return Ok(()),
            Some(index) => self.history[index] = current,
            None if current.slides.is_empty() => return Ok(()),
            None => self.history.insert(0, current),
        }
        self.persist()
    }
}
