//! Root application state: wires the stores, the session, the generator and
//! the exporter together and turns every failure into a dismissible banner.

use crate::config::Config;
use crate::db::models::{Identity, UserProfile};
use crate::db::profiles::{ProfileBackend, SqliteProfiles};
use crate::db::{Database, StorageError, USER_PROFILE_KEY};
use crate::errors;
use crate::export::{ExportError, ExportOutcome, Exporter};
use crate::generator::{GenerationError, Generator};
use crate::history::{HistoryError, HistoryStore};
use crate::i18n::I18n;
use crate::llm::gemini::{GeminiBackend, GeminiConfig};
use crate::llm::{GenerationBackend, TextField};
use crate::models::{AppSettings, BrandKit, Carousel, DesignPreferences, OverrideField, PreferencesPatch};
use crate::render::{SlideRasterizer, SvgRasterizer};
use crate::router::{Router, Transition, View};
use crate::session::{CarouselSession, Direction, SlideUpdate};
use crate::settings::SettingsStore;
use std::sync::Arc;

const DEFAULT_NICHE: &str = "General";

/// A user-facing error message scoped to the view it was raised on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub view: View,
    pub message: String,
}

pub struct App {
    config: Config,
    db: Arc<Database>,
    i18n: I18n,
    settings_store: SettingsStore,
    settings: AppSettings,
    session: CarouselSession,
    router: Router,
    profile: Option<UserProfile>,
    profiles: Arc<dyn ProfileBackend>,
    generator: Generator,
    exporter: Exporter,
    banner: Option<Banner>,
    on_status: Option<Box<dyn FnMut(&str)>>,
}

impl App {
    /// Opens the on-disk database under the configured data directory and
    /// uses the Gemini backend and the SVG rasterizer.
    pub fn open(config: Config) -> Result<Self, StorageError> {
        let db = Arc::new(Database::new(&config.resolved_data_dir(), config.storage_quota_bytes)?);
        let profiles = Arc::new(SqliteProfiles::new(db.clone()));
        let backend = Arc::new(GeminiBackend::new(GeminiConfig::from(&config)));
        Ok(Self::new(config, db, profiles, backend, Box::new(SvgRasterizer::new())))
    }

    pub fn new(
        config: Config,
        db: Arc<Database>,
        profiles: Arc<dyn ProfileBackend>,
        backend: Arc<dyn GenerationBackend>,
        rasterizer: Box<dyn SlideRasterizer>,
    ) -> Self {
        let settings_store = SettingsStore::new(db.clone());
        let settings = settings_store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read settings, using defaults");
            AppSettings::default()
        });
        let locale = config.locale.clone().unwrap_or_else(|| settings.locale.clone());
        let i18n = I18n::new(Some(&locale));
        let session = CarouselSession::load(HistoryStore::new(db.clone()));
        let exporter = Exporter::new(db.clone(), rasterizer, config.resolved_download_dir());

        let mut app = Self {
            config,
            db,
            i18n,
            settings_store,
            settings,
            session,
            router: Router::default(),
            profile: None,
            profiles,
            generator: Generator::new(backend),
            exporter,
            banner: None,
            on_status: None,
        };
        app.restore_cached_profile();
        app
    }

    /// Status lines (progress, export results) go to `sink`.
    pub fn set_status_sink(&mut self, sink: impl FnMut(&str) + 'static) {
        self.on_status = Some(Box::new(sink));
    }

    fn restore_cached_profile(&mut self) {
        let cached = match self.db.get_item(USER_PROFILE_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<UserProfile>(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read cached profile");
                None
            }
        };
        if let Some(profile) = cached {
            tracing::info!(user = %profile.id, "Restored signed-in profile");
            self.router.on_signed_in(&profile);
            self.profile = Some(profile);
        }
    }

    fn cache_profile(&self, profile: &UserProfile) {
        let json = serde_json::to_string(profile).unwrap_or_default();
        if let Err(e) = self.db.set_item(USER_PROFILE_KEY, &json) {
            tracing::warn!(error = %e, "Could not cache profile");
        }
    }

    fn status(&mut self, message: &str) {
        tracing::info!("{}", message);
        if let Some(sink) = self.on_status.as_mut() {
            sink(message);
        }
    }

    fn show_error(&mut self, message: String) {
        tracing::warn!(view = ?self.router.view(), "{}", message);
        self.banner = Some(Banner {
            view: self.router.view(),
            message,
        });
    }

    fn history_message(&self, error: &HistoryError) -> String {
        match error {
            HistoryError::TooLarge => self.i18n.tr("error-storage-full"),
            other => other.to_string(),
        }
    }

    fn generation_message(&self, error: &GenerationError) -> String {
        match error {
            GenerationError::Llm(e) => errors::describe(e, &self.i18n),
            GenerationError::History(e) => self.history_message(e),
            GenerationError::NoImage => self.i18n.tr("error-no-image"),
        }
    }

    fn report_history(&mut self, result: Result<(), HistoryError>) {
        if let Err(e) = result {
            let message = self.history_message(&e);
            self.show_error(message);
        }
    }

    fn report_generation(&mut self, result: Result<(), GenerationError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                let message = self.generation_message(&e);
                self.show_error(message);
                false
            }
        }
    }

    fn apply_transition(&mut self, transition: Transition) {
        if transition.from != transition.to {
            self.banner = None;
        }
        if transition.flush_session {
            let result = self.session.flush_into_history();
            self.report_history(result);
        }
    }

    // ── Accessors ──

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn view(&self) -> View {
        self.router.view()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn session(&self) -> &CarouselSession {
        &self.session
    }

    pub fn current(&self) -> Option<&Carousel> {
        self.session.current()
    }

    pub fn history(&self) -> &[Carousel] {
        self.session.history()
    }

    pub fn i18n(&self) -> &I18n {
        &self.i18n
    }

    /// The banner, if it belongs to the current view.
    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref().filter(|b| b.view == self.router.view())
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn download_count(&self) -> u64 {
        self.db.download_count().unwrap_or(0)
    }

    // ── Authentication & profile ──

    /// Handles a sign-in event. Profile lookup failures sign the user out
    /// again with an explanatory banner.
    pub async fn sign_in(&mut self, identity: Identity) -> bool {
        let profile = match self.profiles.find_profile(&identity.id).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => {
                let profile = UserProfile::from_identity(&identity);
                tracing::info!(user = %profile.id, "Creating profile on first sign-in");
                self.profiles.save_profile(&profile).await.map(|()| profile)
            }
            Err(e) => Err(e),
        };

        match profile {
            Ok(profile) => {
                self.cache_profile(&profile);
                let transition = self.router.on_signed_in(&profile);
                self.profile = Some(profile);
                self.apply_transition(transition);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, user = %identity.id, "Profile lookup failed");
                self.sign_out();
                let message = self.i18n.tr("error-profile-load");
                self.show_error(message);
                false
            }
        }
    }

    pub fn sign_out(&mut self) {
        let transition = self.router.on_signed_out();
        self.apply_transition(transition);
        self.session.close();
        self.profile = None;
        if let Err(e) = self.db.remove_item(USER_PROFILE_KEY) {
            tracing::warn!(error = %e, "Could not clear cached profile");
        }
    }

    /// One-time setup step: a display name and at least one niche.
    pub async fn complete_profile(&mut self, name: &str, niches: Vec<String>) -> bool {
        let Some(mut profile) = self.profile.clone() else {
            return false;
        };
        let niches: Vec<String> = niches
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if name.trim().is_empty() || niches.is_empty() {
            let message = self.i18n.tr("error-profile-incomplete");
            self.show_error(message);
            return false;
        }

        profile.name = name.trim().to_string();
        profile.niches = niches;
        profile.is_complete = true;
        if let Err(e) = self.profiles.save_profile(&profile).await {
            self.show_error(e.to_string());
            return false;
        }
        self.cache_profile(&profile);
        self.profile = Some(profile);
        let transition = self.router.on_profile_completed();
        self.apply_transition(transition);
        true
    }

    pub fn navigate(&mut self, view: View) -> bool {
        match self.router.navigate(view) {
            Some(transition) => {
                self.apply_transition(transition);
                true
            }
            None => false,
        }
    }

    // ── Settings ──

    pub fn set_api_key(&mut self, api_key: &str) {
        match self.settings_store.set_api_key(&mut self.settings, api_key) {
            Ok(()) => {
                let message = self.i18n.tr("settings-api-key-saved");
                self.status(&message);
            }
            Err(e) => self.show_error(e.to_string()),
        }
    }

    pub fn set_brand_kit(&mut self, kit: BrandKit) {
        let name = kit.name.clone();
        match self.settings_store.set_brand_kit(&mut self.settings, kit) {
            Ok(()) => {
                let message = self.i18n.tr_args("settings-brand-kit-saved", &[("name", name)]);
                self.status(&message);
            }
            Err(e) => self.show_error(e.to_string()),
        }
    }

    pub fn set_locale(&mut self, locale: &str) {
        if let Ok(id) = locale.parse() {
            self.i18n.set_locale(id);
        }
        self.settings.locale = self.i18n.current_locale().to_string();
        if let Err(e) = self.settings_store.save(&self.settings) {
            self.show_error(e.to_string());
        }
    }

    // ── Editing ──

    pub fn open_from_history(&mut self, id: &str) -> bool {
        self.session.open_from_history(id)
    }

    pub fn delete_from_history(&mut self, id: &str) {
        let result = self.session.delete_from_history(id);
        self.report_history(result);
    }

    pub fn update_slide(&mut self, slide_id: &str, update: SlideUpdate) {
        let result = self.session.update_slide(slide_id, update);
        self.report_history(result);
    }

    pub fn move_slide(&mut self, slide_id: &str, direction: Direction) {
        let result = self.session.move_slide(slide_id, direction);
        self.report_history(result);
    }

    pub fn set_preferences(&mut self, preferences: DesignPreferences) {
        let result = self.session.set_preferences(preferences);
        self.report_history(result);
    }

    pub fn patch_preferences(&mut self, patch: PreferencesPatch) {
        let result = self.session.patch_preferences(patch);
        self.report_history(result);
    }

    pub fn apply_brand_kit(&mut self) {
        let kit = self.settings.brand_kit.clone();
        let result = self.session.apply_brand_kit(&kit);
        self.report_history(result);
    }

    pub fn clear_override(&mut self, field: OverrideField) {
        let result = self.session.clear_override(field);
        self.report_history(result);
    }

    // ── Generation ──

    /// Generates a carousel for `topic`. The niche defaults to the profile's
    /// first niche; preferences come from the carousel being edited, if any.
    /// Returns the new carousel id.
    pub async fn generate(&mut self, topic: &str, niche: Option<&str>) -> Option<String> {
        let niche = niche
            .map(str::to_string)
            .or_else(|| self.profile.as_ref().and_then(|p| p.primary_niche()).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_NICHE.to_string());
        let preferences = self
            .session
            .current()
            .map(|c| c.preferences.clone())
            .unwrap_or_default();

        let message = self
            .i18n
            .tr_args("progress-generating-content", &[("topic", topic.to_string())]);
        self.status(&message);

        let i18n = &self.i18n;
        let on_status = &mut self.on_status;
        let result = self
            .generator
            .generate_carousel(&mut self.session, &self.settings, topic, &niche, preferences, |p| {
                let message = i18n.tr_args(
                    "progress-generating-image",
                    &[("current", p.current.to_string()), ("total", p.total.to_string())],
                );
                tracing::info!("{}", message);
                if let Some(sink) = on_status.as_mut() {
                    sink(&message);
                }
            })
            .await;

        match result {
            Ok(report) => {
                if let Some(e) = report.history_error {
                    let message = self.history_message(&e);
                    self.show_error(message);
                }
                Some(report.carousel_id)
            }
            Err(e) => {
                let message = self.generation_message(&e);
                self.show_error(message);
                None
            }
        }
    }

    fn slide_position(&self, slide_id: &str) -> usize {
        self.session
            .current()
            .and_then(|c| c.slide_index(slide_id))
            .map_or(0, |i| i + 1)
    }

    pub async fn regenerate_field(&mut self, slide_id: &str, field: TextField) -> bool {
        let result = self
            .generator
            .regenerate_field(&mut self.session, &self.settings, slide_id, field)
            .await;
        self.report_generation(result)
    }

    pub async fn regenerate_image(&mut self, slide_id: &str) -> bool {
        let message = self.i18n.tr_args(
            "progress-generating-image",
            &[
                ("current", self.slide_position(slide_id).to_string()),
                ("total", self.current().map_or(0, |c| c.slides.len()).to_string()),
            ],
        );
        self.status(&message);
        let result = self
            .generator
            .regenerate_image(&mut self.session, &self.settings, slide_id)
            .await;
        self.report_generation(result)
    }

    pub async fn edit_image(&mut self, slide_id: &str, instruction: &str) -> bool {
        let message = self.i18n.tr_args(
            "progress-editing-image",
            &[("current", self.slide_position(slide_id).to_string())],
        );
        self.status(&message);
        let result = self
            .generator
            .edit_image(&mut self.session, &self.settings, slide_id, instruction)
            .await;
        self.report_generation(result)
    }

    pub async fn generate_video(&mut self, slide_id: &str) -> bool {
        let message = self.i18n.tr_args(
            "progress-generating-video",
            &[("current", self.slide_position(slide_id).to_string())],
        );
        self.status(&message);
        let result = self
            .generator
            .generate_video(&mut self.session, &self.settings, slide_id)
            .await;
        self.report_generation(result)
    }

    pub async fn generate_caption(&mut self) -> Option<String> {
        let message = self.i18n.tr("progress-generating-caption");
        self.status(&message);
        let result = self.generator.generate_caption(&mut self.session, &self.settings).await;
        if self.report_generation(result) {
            self.current().and_then(|c| c.caption.clone())
        } else {
            None
        }
    }

    // ── Export ──

    /// Exports the current carousel. `mounted` lists the rendered slide ids in
    /// any order; `None` exports every slide.
    pub async fn export(&mut self, mounted: Option<Vec<String>>) -> Option<ExportOutcome> {
        let Some(carousel) = self.session.current().cloned() else {
            let message = self
                .i18n
                .tr_args("error-export-failed", &[("reason", ExportError::NothingToExport.to_string())]);
            self.show_error(message);
            return None;
        };
        let mounted = mounted.unwrap_or_else(|| carousel.slides.iter().map(|s| s.id.clone()).collect());

        match self.exporter.export(&carousel, &mounted).await {
            Ok(outcome) => {
                let message = self.i18n.tr_args(
                    "export-complete",
                    &[
                        ("path", outcome.path.display().to_string()),
                        ("count", outcome.download_count.to_string()),
                    ],
                );
                self.status(&message);
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                let message = self.i18n.tr_args("error-export-failed", &[("reason", e.to_string())]);
                self.show_error(message);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::profiles::ProfileError;
    use crate::generator::testing::FakeBackend;
    use crate::render::RenderError;
    use async_trait::async_trait;

    struct TextRasterizer;

    impl SlideRasterizer for TextRasterizer {
        fn render_slide(&self, carousel: &Carousel, index: usize) -> Result<Vec<u8>, RenderError> {
            Ok(carousel.slides[index].headline.clone().into_bytes())
        }

        fn render_overlay(&self, carousel: &Carousel, index: usize) -> Result<Vec<u8>, RenderError> {
            Ok(carousel.slides[index].body.clone().into_bytes())
        }
    }

    struct DownProfiles;

    #[async_trait]
    impl ProfileBackend for DownProfiles {
        async fn find_profile(&self, _: &str) -> Result<Option<UserProfile>, ProfileError> {
            Err(ProfileError::Unavailable("connection refused".into()))
        }

        async fn save_profile(&self, _: &UserProfile) -> Result<(), ProfileError> {
            Err(ProfileError::Unavailable("connection refused".into()))
        }
    }

    fn identity() -> Identity {
        Identity {
            id: "user-1".into(),
            email: "ana@example.com".into(),
            name: Some("Ana".into()),
            picture: None,
        }
    }

    fn app_with(db: Arc<Database>, download_dir: &std::path::Path) -> App {
        let config = Config {
            download_dir: Some(download_dir.to_path_buf()),
            ..Default::default()
        };
        let profiles = Arc::new(SqliteProfiles::new(db.clone()));
        App::new(
            config,
            db,
            profiles,
            Arc::new(FakeBackend::with_slides(3)),
            Box::new(TextRasterizer),
        )
    }

    #[tokio::test]
    async fn test_first_sign_in_requires_setup() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
        let mut app = app_with(db.clone(), dir.path());

        assert_eq!(app.view(), View::Login);
        assert!(app.sign_in(identity()).await);
        assert_eq!(app.view(), View::ProfileSetup);
        assert!(!app.navigate(View::Dashboard));

        assert!(!app.complete_profile("Ana", vec!["  ".into()]).await);
        assert!(app.banner().is_some());
        assert!(app.complete_profile("Ana", vec!["Food".into()]).await);
        assert_eq!(app.view(), View::Dashboard);
        assert!(app.banner().is_none());
        assert!(db.find_profile("user-1").unwrap().unwrap().is_complete);

        // A restart restores the signed-in profile from the cache.
        let app = app_with(db, dir.path());
        assert_eq!(app.view(), View::Dashboard);
        assert_eq!(app.profile().unwrap().niches, vec!["Food".to_string()]);
    }

    #[tokio::test]
    async fn test_profile_failure_forces_sign_out() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
        let mut app = App::new(
            Config {
                download_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            db,
            Arc::new(DownProfiles),
            Arc::new(FakeBackend::with_slides(1)),
            Box::new(TextRasterizer),
        );

        assert!(!app.sign_in(identity()).await);
        assert_eq!(app.view(), View::Login);
        assert!(app.profile().is_none());
        assert_eq!(app.banner().unwrap().message, app.i18n().tr("error-profile-load"));
    }

    #[tokio::test]
    async fn test_generation_without_key_shows_banner() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
        let mut app = app_with(db, dir.path());
        app.sign_in(identity()).await;
        app.complete_profile("Ana", vec!["Food".into()]).await;
        app.navigate(View::Generator);

        assert!(app.generate("Coffee Brewing", None).await.is_none());
        assert_eq!(app.banner().unwrap().message, app.i18n().tr("error-not-configured"));
        app.dismiss_banner();
        assert!(app.banner().is_none());
    }

    #[tokio::test]
    async fn test_generate_edit_leave_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
        let mut app = app_with(db, dir.path());
        app.sign_in(identity()).await;
        app.complete_profile("Ana", vec!["Food".into()]).await;
        app.set_api_key("key-123");
        app.navigate(View::Generator);

        let id = app.generate("Coffee Brewing", None).await.unwrap();
        assert_eq!(app.history()[0].id, id);
        assert_eq!(app.current().unwrap().category, "Food");

        let slide_id = app.current().unwrap().slides[0].id.clone();
        app.move_slide(&slide_id, Direction::Down);
        assert_eq!(app.history()[0].slides[1].id, slide_id);

        assert!(app.navigate(View::Dashboard));
        assert!(app.open_from_history(&id));
        let outcome = app.export(None).await.unwrap();
        assert_eq!(outcome.entries, 3);
        assert_eq!(outcome.path, dir.path().join("coffee_brewing.zip"));
        assert_eq!(app.download_count(), 1);
    }

    #[tokio::test]
    async fn test_history_too_large_keeps_carousel_open() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory(600).unwrap());
        let mut app = app_with(db.clone(), dir.path());
        app.sign_in(identity()).await;
        app.complete_profile("Ana", vec!["Food".into()]).await;
        app.set_api_key("key-123");
        app.navigate(View::Generator);

        let id = app.generate("Coffee Brewing", None).await.unwrap();
        assert_eq!(app.view(), View::Generator);
        assert_eq!(app.banner().unwrap().message, app.i18n().tr("error-storage-full"));
        assert_eq!(app.current().unwrap().id, id);
        assert_eq!(app.current().unwrap().slides.len(), 3);
        assert_eq!(db.get_item(crate::db::HISTORY_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_export_without_carousel_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory(1 << 20).unwrap());
        let mut app = app_with(db, dir.path());
        app.sign_in(identity()).await;
        app.complete_profile("Ana", vec!["Food".into()]).await;
        assert!(app.export(None).await.is_none());
        assert!(app.banner().unwrap().message.starts_with("Export failed"));
        assert_eq!(app.download_count(), 0);
    }
}
