use async_trait::async_trait;
use carousel_studio_lib::config::Config;
use carousel_studio_lib::db::models::Identity;
use carousel_studio_lib::db::profiles::SqliteProfiles;
use carousel_studio_lib::db::Database;
use carousel_studio_lib::errors::{classify, user_message, ErrorKind};
use carousel_studio_lib::i18n::I18n;
use carousel_studio_lib::llm::{
    CaptionRequest, CarouselRequest, EditImageRequest, FieldRequest, GeneratedSlide, GenerationBackend,
    ImageRequest, LlmError, VideoRequest,
};
use carousel_studio_lib::models::{Carousel, PreferencesPatch};
use carousel_studio_lib::render::{RenderError, SlideRasterizer};
use carousel_studio_lib::router::View;
use carousel_studio_lib::App;
use std::path::Path;
use std::sync::Arc;

/// Backend producing `slide_count` slides and images of `image_bytes` base64 chars.
struct ScriptedBackend {
    image_bytes: usize,
    quota_error: bool,
}

impl ScriptedBackend {
    fn new(image_bytes: usize) -> Self {
        Self {
            image_bytes,
            quota_error: false,
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate_slides(&self, _: &str, request: &CarouselRequest) -> Result<Vec<GeneratedSlide>, LlmError> {
        if self.quota_error {
            return Err(LlmError::Api {
                status: 429,
                message: r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#.into(),
            });
        }
        Ok((1..=request.slide_count)
            .map(|i| GeneratedSlide {
                headline: format!("{} #{i}", request.topic),
                body: format!("Tip {i} for {}", request.niche),
                visual_prompt: format!("{} photo {i}", request.topic),
            })
            .collect())
    }

    async fn rewrite_field(&self, _: &str, request: &FieldRequest) -> Result<String, LlmError> {
        Ok(format!("{} (rewritten)", request.headline))
    }

    async fn generate_image(&self, _: &str, _: &ImageRequest) -> Result<String, LlmError> {
        Ok(format!("data:image/png;base64,{}", "A".repeat(self.image_bytes)))
    }

    async fn edit_image(&self, _: &str, request: &EditImageRequest) -> Result<String, LlmError> {
        Ok(request.image_url.clone())
    }

    async fn generate_video(&self, _: &str, _: &VideoRequest) -> Result<String, LlmError> {
        Ok("data:video/mp4;base64,AAAAIGZ0eXBpc29t".into())
    }

    async fn generate_caption(&self, _: &str, request: &CaptionRequest) -> Result<String, LlmError> {
        Ok(format!("All about {} #{}", request.topic, request.niche))
    }
}

struct PlainRasterizer;

impl SlideRasterizer for PlainRasterizer {
    fn render_slide(&self, carousel: &Carousel, index: usize) -> Result<Vec<u8>, RenderError> {
        Ok(carousel.slides[index].headline.clone().into_bytes())
    }

    fn render_overlay(&self, _: &Carousel, _: usize) -> Result<Vec<u8>, RenderError> {
        Ok(b"overlay".to_vec())
    }
}

fn build_app(db: Arc<Database>, downloads: &Path, backend: ScriptedBackend) -> App {
    let config = Config {
        download_dir: Some(downloads.to_path_buf()),
        ..Default::default()
    };
    let profiles = Arc::new(SqliteProfiles::new(db.clone()));
    App::new(config, db, profiles, Arc::new(backend), Box::new(PlainRasterizer))
}

async fn signed_in(app: &mut App) {
    let identity = Identity {
        id: "creator-7".into(),
        email: "creator@example.com".into(),
        name: Some("Creator".into()),
        picture: None,
    };
    assert!(app.sign_in(identity).await);
    assert!(app.complete_profile("Creator", vec!["Food".into()]).await);
    app.set_api_key("AIzaSyTestKey0000");
    assert!(app.navigate(View::Generator));
}

#[tokio::test]
async fn generated_carousel_is_newest_in_history() {
    let downloads = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
    let mut app = build_app(db, downloads.path(), ScriptedBackend::new(16));
    signed_in(&mut app).await;

    let id = app.generate("Coffee Brewing", Some("Food")).await.unwrap();
    let current = app.current().unwrap();
    assert_eq!(current.title, "Coffee Brewing");
    assert_eq!(current.category, "Food");
    assert!(!current.slides.is_empty());
    assert!(current.slides.iter().all(|s| s.image_url.is_some()));
    assert_eq!(app.history()[0].id, id);
    assert!(app.banner().is_none());
}

#[tokio::test]
async fn quota_error_shows_quota_message() {
    let downloads = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
    let mut backend = ScriptedBackend::new(16);
    backend.quota_error = true;
    let mut app = build_app(db, downloads.path(), backend);
    signed_in(&mut app).await;

    assert!(app.generate("Coffee Brewing", None).await.is_none());
    assert_eq!(app.banner().unwrap().message, app.i18n().tr("error-quota-exceeded"));
    assert!(app.history().is_empty());
}

#[test]
fn classifier_recognises_both_error_shapes() {
    let i18n = I18n::new(Some("en-US"));
    assert_eq!(
        classify(r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#),
        ErrorKind::QuotaExceeded
    );
    assert_eq!(classify("API key not valid. Please pass a valid API key."), ErrorKind::InvalidCredential);
    assert_eq!(classify("API key not configured"), ErrorKind::NotConfigured);
    assert_eq!(user_message("socket hang up", &i18n), "socket hang up");
    assert_eq!(
        user_message(r#"{"error":{"code":500,"message":"Internal error"}}"#, &i18n),
        "Internal error"
    );
}

#[tokio::test]
async fn history_evicts_oldest_when_storage_is_full() {
    let downloads = tempfile::tempdir().unwrap();
    // A single carousel of three 1.5 KB images fits, four do not.
    let db = Arc::new(Database::open_in_memory(12 * 1024).unwrap());
    let mut app = build_app(db.clone(), downloads.path(), ScriptedBackend::new(1500));
    signed_in(&mut app).await;
    app.patch_preferences(PreferencesPatch {
        slide_count: Some(3),
        ..Default::default()
    });

    let mut ids = Vec::new();
    for topic in ["Espresso", "Pour Over", "Cold Brew", "French Press"] {
        ids.push(app.generate(topic, None).await.unwrap());
        assert!(app.banner().is_none());
        assert!(app.navigate(View::Dashboard));
        assert!(app.navigate(View::Generator));
    }

    let history = app.history();
    assert!(!history.is_empty());
    assert!(history.len() < ids.len());
    assert_eq!(history[0].id, *ids.last().unwrap());
    let kept: Vec<&str> = history.iter().map(|c| c.id.as_str()).collect();
    let newest: Vec<&str> = ids.iter().rev().take(kept.len()).map(String::as_str).collect();
    assert_eq!(kept, newest);

    // Persisted history matches what the session holds.
    let reopened = build_app(db, downloads.path(), ScriptedBackend::new(16));
    assert_eq!(reopened.history().len(), kept.len());
}

#[tokio::test]
async fn inline_video_is_never_persisted() {
    let downloads = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
    let mut app = build_app(db.clone(), downloads.path(), ScriptedBackend::new(16));
    signed_in(&mut app).await;

    let id = app.generate("Latte Art", None).await.unwrap();
    let slide_id = app.current().unwrap().slides[0].id.clone();
    assert!(app.generate_video(&slide_id).await);
    assert!(app.current().unwrap().slides[0].has_video());
    assert!(app.generate_caption().await.is_some());
    assert!(app.navigate(View::Dashboard));

    let raw = db.get_item("carousel_studio.history").unwrap().unwrap();
    assert!(!raw.contains("data:video/"));

    let reopened = build_app(db, downloads.path(), ScriptedBackend::new(16));
    let stored = &reopened.history()[0];
    assert_eq!(stored.id, id);
    assert!(stored.slides[0].video_url.is_none());
    assert!(stored.caption.is_some());
}

#[tokio::test]
async fn export_writes_archive_in_authored_order() {
    let downloads = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
    let mut app = build_app(db, downloads.path(), ScriptedBackend::new(16));
    signed_in(&mut app).await;
    app.generate("Moka Pot", None).await.unwrap();

    let mut mounted: Vec<String> = app.current().unwrap().slides.iter().map(|s| s.id.clone()).collect();
    mounted.reverse();
    let outcome = app.export(Some(mounted)).await.unwrap();
    assert_eq!(outcome.download_count, 1);
    assert_eq!(app.download_count(), 1);

    let file = std::fs::File::open(&outcome.path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    assert_eq!(archive.len(), outcome.entries);
    let first = archive.by_index(0).unwrap().name().to_string();
    assert_eq!(first, "slide-1.png");
}
