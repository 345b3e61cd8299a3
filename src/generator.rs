use crate::history::HistoryError;
use crate::llm::{
    CaptionRequest, CarouselRequest, EditImageRequest, FieldRequest, GeneratedSlide, GenerationBackend,
    ImageRequest, LlmError, TextField, VideoRequest,
};
use crate::models::{AppSettings, Carousel, DesignPreferences, SlideData};
use crate::session::{CarouselSession, Operation, Progress, SlideUpdate};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("Slide has no image to edit")]
    NoImage,
}

#[derive(Debug)]
pub struct GenerationReport {
    pub carousel_id: String,
    pub images_generated: usize,
    pub images_failed: usize,
    /// Set when the new carousel could not be saved to history.
    pub history_error: Option<HistoryError>,
}

fn api_key(settings: &AppSettings) -> Result<&str, LlmError> {
    if settings.has_api_key() {
        Ok(settings.api_key.trim())
    } else {
        Err(LlmError::NotConfigured)
    }
}

/// Sequences calls to the generation backend and merges results into the
/// session.
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn GenerationBackend>,
}

impl Generator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Generates slide text, installs the new carousel, then fills in images
    /// one slide at a time. A failed image is logged and skipped.
    pub async fn generate_carousel(
        &self,
        session: &mut CarouselSession,
        settings: &AppSettings,
        topic: &str,
        niche: &str,
        preferences: DesignPreferences,
        mut on_progress: impl FnMut(&Progress),
    ) -> Result<GenerationReport, GenerationError> {
        let key = api_key(settings)?;
        let request = CarouselRequest {
            topic: topic.to_string(),
            niche: niche.to_string(),
            slide_count: preferences.clamped_slide_count(),
            preferences: preferences.clone(),
        };

        session.in_flight.begin(Operation::Carousel);
        tracing::info!(topic, niche, slides = request.slide_count, "Generating carousel");
        let generated = match self.backend.generate_slides(key, &request).await {
            Ok(slides) => slides,
            Err(e) => {
                session.in_flight.finish(&Operation::Carousel);
                tracing::error!(error = %e, "Carousel generation failed");
                return Err(e.into());
            }
        };

        let mut carousel = Carousel::new(topic, niche, preferences);
        carousel.slides = generated.into_iter().map(SlideData::from).collect();
        let generate_images = carousel.preferences.generate_images;
        let aspect_ratio = carousel.preferences.aspect_ratio;
        let slides: Vec<(String, String)> = carousel
            .slides
            .iter()
            .map(|s| (s.id.clone(), s.visual_prompt.clone()))
            .collect();

        let mut report = GenerationReport {
            carousel_id: carousel.id.clone(),
            images_generated: 0,
            images_failed: 0,
            history_error: None,
        };
        if let Err(e) = session.start_new(carousel) {
            tracing::warn!(error = %e, "New carousel not saved to history");
            report.history_error = Some(e);
        }

        if generate_images {
            let total = slides.len();
            for (index, (slide_id, prompt)) in slides.into_iter().enumerate() {
                let progress = Progress {
                    current: index + 1,
                    total,
                    slide_id: slide_id.clone(),
                };
                on_progress(&progress);
                session.in_flight.set_progress(Some(progress));

                let op = Operation::Image(slide_id.clone());
                session.in_flight.begin(op.clone());
                let result = self
                    .backend
                    .generate_image(key, &ImageRequest { prompt, aspect_ratio })
                    .await;
                session.in_flight.finish(&op);

                match result {
                    Ok(url) => {
                        report.images_generated += 1;
                        let update = SlideUpdate {
                            image_url: Some(Some(url)),
                            ..Default::default()
                        };
                        if let Err(e) = session.update_slide(&slide_id, update) {
                            tracing::warn!(error = %e, "Slide image not saved to history");
                            report.history_error = Some(e);
                        }
                    }
                    Err(e) => {
                        report.images_failed += 1;
                        tracing::warn!(slide = index + 1, error = %e, "Image generation failed, continuing");
                    }
                }
            }
            session.in_flight.set_progress(None);
        }

        session.in_flight.finish(&Operation::Carousel);
        tracing::info!(
            id = %report.carousel_id,
            images = report.images_generated,
            failed = report.images_failed,
            "Carousel generated"
        );
        Ok(report)
    }

    /// Runs one backend call for a slide of the current carousel while `op`
    /// is marked in flight. Unknown slides are ignored.
    async fn with_slide<T, F, Fut>(
        &self,
        session: &mut CarouselSession,
        settings: &AppSettings,
        slide_id: &str,
        op: Operation,
        call: F,
    ) -> Result<Option<T>, GenerationError>
    where
        F: FnOnce(Arc<dyn GenerationBackend>, String, Carousel) -> Fut,
        Fut: std::future::Future<Output = Result<T, GenerationError>>,
    {
        let key = api_key(settings)?.to_string();
        let Some(carousel) = session.current().filter(|c| c.slide(slide_id).is_some()).cloned() else {
            return Ok(None);
        };
        session.in_flight.begin(op.clone());
        let result = call(self.backend.clone(), key, carousel).await;
        session.in_flight.finish(&op);
        if let Err(e) = &result {
            tracing::warn!(slide = slide_id, ?op, error = %e, "Slide generation failed");
        }
        result.map(Some)
    }

    pub async fn regenerate_field(
        &self,
        session: &mut CarouselSession,
        settings: &AppSettings,
        slide_id: &str,
        field: TextField,
    ) -> Result<(), GenerationError> {
        let op = match field {
            TextField::Headline => Operation::Headline(slide_id.to_string()),
            TextField::Body => Operation::Body(slide_id.to_string()),
        };
        let text = self
            .with_slide(session, settings, slide_id, op, |backend, key, carousel| async move {
                let slide = carousel.slide(slide_id).cloned().unwrap_or_default();
                let request = FieldRequest {
                    topic: carousel.title,
                    niche: carousel.category,
                    field,
                    headline: slide.headline,
                    body: slide.body,
                };
                backend.rewrite_field(&key, &request).await.map_err(GenerationError::from)
            })
            .await?;

        if let Some(text) = text {
            let update = match field {
                TextField::Headline => SlideUpdate {
                    headline: Some(text),
                    ..Default::default()
                },
                TextField::Body => SlideUpdate {
                    body: Some(text),
                    ..Default::default()
                },
            };
            session.update_slide(slide_id, update)?;
        }
        Ok(())
    }

    pub async fn regenerate_image(
        &self,
        session: &mut CarouselSession,
        settings: &AppSettings,
        slide_id: &str,
    ) -> Result<(), GenerationError> {
        let url = self
            .with_slide(
                session,
                settings,
                slide_id,
                Operation::Image(slide_id.to_string()),
                |backend, key, carousel| async move {
                    let request = ImageRequest {
                        prompt: carousel.slide(slide_id).map(|s| s.visual_prompt.clone()).unwrap_or_default(),
                        aspect_ratio: carousel.preferences.aspect_ratio,
                    };
                    backend.generate_image(&key, &request).await.map_err(GenerationError::from)
                },
            )
            .await?;

        if let Some(url) = url {
            session.update_slide(
                slide_id,
                SlideUpdate {
                    image_url: Some(Some(url)),
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }

    /// Edits the slide's existing image in place following `instruction`.
    pub async fn edit_image(
        &self,
        session: &mut CarouselSession,
        settings: &AppSettings,
        slide_id: &str,
        instruction: &str,
    ) -> Result<(), GenerationError> {
        let url = self
            .with_slide(
                session,
                settings,
                slide_id,
                Operation::EditImage(slide_id.to_string()),
                |backend, key, carousel| async move {
                    let image_url = carousel
                        .slide(slide_id)
                        .and_then(|s| s.image_url.clone())
                        .filter(|u| u.starts_with("data:image/"))
                        .ok_or(GenerationError::NoImage)?;
                    let request = EditImageRequest {
                        image_url,
                        instruction: instruction.to_string(),
                    };
                    backend.edit_image(&key, &request).await.map_err(GenerationError::from)
                },
            )
            .await?;

        if let Some(url) = url {
            session.update_slide(
                slide_id,
                SlideUpdate {
                    image_url: Some(Some(url)),
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }

    pub async fn generate_video(
        &self,
        session: &mut CarouselSession,
        settings: &AppSettings,
        slide_id: &str,
    ) -> Result<(), GenerationError> {
        let url = self
            .with_slide(
                session,
                settings,
                slide_id,
                Operation::Video(slide_id.to_string()),
                |backend, key, carousel| async move {
                    let slide = carousel.slide(slide_id).cloned().unwrap_or_default();
                    let request = VideoRequest {
                        prompt: slide.visual_prompt,
                        aspect_ratio: carousel.preferences.aspect_ratio,
                        image_url: slide.image_url.filter(|u| u.starts_with("data:image/")),
                    };
                    backend.generate_video(&key, &request).await.map_err(GenerationError::from)
                },
            )
            .await?;

        if let Some(url) = url {
            session.update_slide(
                slide_id,
                SlideUpdate {
                    video_url: Some(Some(url)),
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }

    /// Caption / thread text for the whole current carousel.
    pub async fn generate_caption(
        &self,
        session: &mut CarouselSession,
        settings: &AppSettings,
    ) -> Result<(), GenerationError> {
        let key = api_key(settings)?;
        let Some(carousel) = session.current().filter(|c| !c.slides.is_empty()) else {
            return Ok(());
        };
        let request = CaptionRequest {
            topic: carousel.title.clone(),
            niche: carousel.category.clone(),
            slides: carousel
                .slides
                .iter()
                .map(|s| GeneratedSlide {
                    headline: s.headline.clone(),
                    body: s.body.clone(),
                    visual_prompt: s.visual_prompt.clone(),
                })
                .collect(),
        };

        session.in_flight.begin(Operation::Caption);
        let result = self.backend.generate_caption(key, &request).await;
        session.in_flight.finish(&Operation::Caption);

        let caption = result.map_err(|e| {
            tracing::warn!(error = %e, "Caption generation failed");
            e
        })?;
        session.set_caption(caption)?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBackend;
    use super::*;
    use crate::db::Database;
    use crate::history::HistoryStore;

    fn session() -> CarouselSession {
        let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
        CarouselSession::load(HistoryStore::new(db))
    }

    fn settings() -> AppSettings {
        AppSettings {
            api_key: "test-key".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_generate_carousel_installs_and_fills_images() {
        let backend = Arc::new(FakeBackend::with_slides(3));
        let generator = Generator::new(backend.clone());
        let mut session = session();
        let mut progress = Vec::new();

        let report = generator
            .generate_carousel(
                &mut session,
                &settings(),
                "Coffee Brewing",
                "Food",
                DesignPreferences::default(),
                |p| progress.push((p.current, p.total)),
            )
            .await
            .unwrap();

        let current = session.current().unwrap();
        assert_eq!(current.id, report.carousel_id);
        assert_eq!(current.title, "Coffee Brewing");
        assert_eq!(session.history()[0].id, report.carousel_id);
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert!(current.slides.iter().all(|s| s.image_url.is_some()));
        assert_eq!(session.history()[0], *current);
        assert_eq!(
            *backend.image_calls.lock().unwrap(),
            vec!["prompt 1", "prompt 2", "prompt 3"]
        );
        assert!(!session.in_flight.is_busy());
        assert!(session.in_flight.progress().is_none());
    }

    #[tokio::test]
    async fn test_failed_image_does_not_stop_the_loop() {
        let mut backend = FakeBackend::with_slides(3);
        backend.failing_images.insert(2);
        let generator = Generator::new(Arc::new(backend));
        let mut session = session();

        let report = generator
            .generate_carousel(&mut session, &settings(), "Tea", "Food", DesignPreferences::default(), |_| {})
            .await
            .unwrap();

        assert_eq!(report.images_generated, 2);
        assert_eq!(report.images_failed, 1);
        let slides = &session.current().unwrap().slides;
        assert!(slides[0].image_url.is_some());
        assert!(slides[1].image_url.is_none());
        assert!(slides[2].image_url.is_some());
    }

    #[tokio::test]
    async fn test_images_can_be_skipped() {
        let backend = Arc::new(FakeBackend::with_slides(2));
        let generator = Generator::new(backend.clone());
        let mut session = session();
        let prefs = DesignPreferences {
            generate_images: false,
            ..Default::default()
        };
        generator
            .generate_carousel(&mut session, &settings(), "Tea", "Food", prefs, |_| {})
            .await
            .unwrap();
        assert!(backend.image_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let backend = Arc::new(FakeBackend::with_slides(2));
        let generator = Generator::new(backend.clone());
        let mut session = session();
        let err = generator
            .generate_carousel(
                &mut session,
                &AppSettings::default(),
                "Tea",
                "Food",
                DesignPreferences::default(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Llm(LlmError::NotConfigured)));
        assert!(backend.keys_seen.lock().unwrap().is_empty());
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn test_content_failure_leaves_session_untouched() {
        let backend = FakeBackend {
            fail_content: Some("boom".into()),
            ..FakeBackend::with_slides(2)
        };
        let generator = Generator::new(Arc::new(backend));
        let mut session = session();
        let err = generator
            .generate_carousel(&mut session, &settings(), "Tea", "Food", DesignPreferences::default(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Llm(LlmError::Api { .. })));
        assert!(session.history().is_empty());
        assert!(!session.in_flight.is_busy());
    }

    #[tokio::test]
    async fn test_single_slide_operations() {
        let backend = Arc::new(FakeBackend::with_slides(2));
        let generator = Generator::new(backend.clone());
        let mut session = session();
        let settings = settings();
        let prefs = DesignPreferences {
            generate_images: false,
            ..Default::default()
        };
        generator
            .generate_carousel(&mut session, &settings, "Tea", "Food", prefs, |_| {})
            .await
            .unwrap();
        let slide_id = session.current().unwrap().slides[0].id.clone();

        generator
            .regenerate_field(&mut session, &settings, &slide_id, TextField::Headline)
            .await
            .unwrap();
        assert_eq!(session.current().unwrap().slides[0].headline, "Better Headline 1");

        // Editing needs an image first.
        let err = generator
            .edit_image(&mut session, &settings, &slide_id, "warmer")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NoImage));

        generator.regenerate_image(&mut session, &settings, &slide_id).await.unwrap();
        generator
            .edit_image(&mut session, &settings, &slide_id, "warmer")
            .await
            .unwrap();
        assert_eq!(
            session.current().unwrap().slides[0].image_url.as_deref(),
            Some("data:image/png;base64,1-edited")
        );

        generator.generate_video(&mut session, &settings, &slide_id).await.unwrap();
        assert!(session.current().unwrap().slides[0].has_video());

        generator.generate_caption(&mut session, &settings).await.unwrap();
        assert_eq!(session.history()[0].caption.as_deref(), Some("Tea in 2 slides #Food"));
        assert!(!session.in_flight.is_busy());
    }

    #[tokio::test]
    async fn test_unknown_slide_is_ignored_but_key_still_required() {
        let backend = Arc::new(FakeBackend::with_slides(1));
        let generator = Generator::new(backend.clone());
        let mut session = session();
        generator
            .regenerate_image(&mut session, &settings(), "missing")
            .await
            .unwrap();
        assert!(backend.image_calls.lock().unwrap().is_empty());

        let err = generator
            .regenerate_image(&mut session, &AppSettings::default(), "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Llm(LlmError::NotConfigured)));
    }
}
