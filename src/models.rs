use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SLIDE_COUNT: u8 = 5;
pub const MIN_SLIDE_COUNT: u8 = 3;
pub const MAX_SLIDE_COUNT: u8 = 10;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Carousel {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub category: String,
    pub slides: Vec<SlideData>,
    pub preferences: DesignPreferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Carousel {
    pub fn new(title: impl Into<String>, category: impl Into<String>, preferences: DesignPreferences) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: Utc::now(),
            category: category.into(),
            slides: Vec::new(),
            preferences,
            caption: None,
        }
    }

    pub fn slide(&self, slide_id: &str) -> Option<&SlideData> {
        self.slides.iter().find(|s| s.id == slide_id)
    }

    pub fn slide_mut(&mut self, slide_id: &str) -> Option<&mut SlideData> {
        self.slides.iter_mut().find(|s| s.id == slide_id)
    }

    pub fn slide_index(&self, slide_id: &str) -> Option<usize> {
        self.slides.iter().position(|s| s.id == slide_id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SlideData {
    pub id: String,
    pub headline: String,
    pub body: String,
    pub visual_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default)]
    pub overrides: SlideOverrides,
}

impl SlideData {
    pub fn new(headline: impl Into<String>, body: impl Into<String>, visual_prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            headline: headline.into(),
            body: body.into(),
            visual_prompt: visual_prompt.into(),
            ..Default::default()
        }
    }

    /// A slide whose visual is a video is exported as video + overlay.
    pub fn has_video(&self) -> bool {
        self.video_url.is_some()
    }
}

/// Returns true when a video slot holds a `data:` payload embedded in the
/// slide itself, whatever its declared mime type.
pub fn is_inline_video(url: &str) -> bool {
    crate::data_url::is_data_url(url)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SlideOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_position: Option<TextPosition>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverrideField {
    HeadlineColor,
    BodyColor,
    BackgroundColor,
    HeadlineSize,
    BodySize,
    TextPosition,
}

impl SlideOverrides {
    pub fn clear(&mut self, field: OverrideField) {
        match field {
            OverrideField::HeadlineColor => self.headline_color = None,
            OverrideField::BodyColor => self.body_color = None,
            OverrideField::BackgroundColor => self.background_color = None,
            OverrideField::HeadlineSize => self.headline_size = None,
            OverrideField::BodySize => self.body_size = None,
            OverrideField::TextPosition => self.text_position = None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait,
    Story,
}

impl AspectRatio {
    /// Export canvas size in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1080, 1080),
            AspectRatio::Portrait => (1080, 1350),
            AspectRatio::Story => (1080, 1920),
        }
    }

    /// Ratio string understood by the image/video models.
    pub fn as_ratio(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Story => "9:16",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrandingPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TextStyle {
    pub font_size: u32,
    pub font_weight: u16,
    pub stroke_width: u32,
    pub stroke_color: String,
    pub position: TextPosition,
    pub align: TextAlign,
}

impl TextStyle {
    pub fn headline() -> Self {
        Self {
            font_size: 72,
            font_weight: 800,
            ..Self::default()
        }
    }

    pub fn body() -> Self {
        Self {
            font_size: 40,
            font_weight: 400,
            ..Self::default()
        }
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 40,
            font_weight: 400,
            stroke_width: 0,
            stroke_color: "#000000".to_string(),
            position: TextPosition::Center,
            align: TextAlign::Center,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DesignPreferences {
    pub background_color: String,
    pub text_color: String,
    pub accent_color: String,
    pub headline_font: String,
    pub body_font: String,
    pub aspect_ratio: AspectRatio,
    pub headline: TextStyle,
    pub body: TextStyle,
    pub branding_text: Option<String>,
    pub branding_position: BrandingPosition,
    pub show_slide_numbers: bool,
    pub slide_count: u8,
    pub generate_images: bool,
}

impl Default for DesignPreferences {
    fn default() -> Self {
        Self {
            background_color: "#111827".to_string(),
            text_color: "#ffffff".to_string(),
            accent_color: "#f59e0b".to_string(),
            headline_font: "Inter".to_string(),
            body_font: "Inter".to_string(),
            aspect_ratio: AspectRatio::Square,
            headline: TextStyle::headline(),
            body: TextStyle::body(),
            branding_text: None,
            branding_position: BrandingPosition::BottomRight,
            show_slide_numbers: true,
            slide_count: DEFAULT_SLIDE_COUNT,
            generate_images: true,
        }
    }
}

impl DesignPreferences {
    pub fn clamped_slide_count(&self) -> u8 {
        self.slide_count.clamp(MIN_SLIDE_COUNT, MAX_SLIDE_COUNT)
    }
}

/// Partial update of [`DesignPreferences`]; `None` fields are left untouched.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PreferencesPatch {
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub accent_color: Option<String>,
    pub headline_font: Option<String>,
    pub body_font: Option<String>,
    pub aspect_ratio: Option<AspectRatio>,
    pub headline: Option<TextStyle>,
    pub body: Option<TextStyle>,
    pub branding_text: Option<Option<String>>,
    pub branding_position: Option<BrandingPosition>,
    pub show_slide_numbers: Option<bool>,
    pub slide_count: Option<u8>,
    pub generate_images: Option<bool>,
}

impl PreferencesPatch {
    pub fn apply(self, prefs: &mut DesignPreferences) {
        if let Some(v) = self.background_color {
            prefs.background_color = v;
        }
        if let Some(v) = self.text_color {
            prefs.text_color = v;
        }
        if let Some(v) = self.accent_color {
            prefs.accent_color = v;
        }
        if let Some(v) = self.headline_font {
            prefs.headline_font = v;
        }
        if let Some(v) = self.body_font {
            prefs.body_font = v;
        }
        if let Some(v) = self.aspect_ratio {
            prefs.aspect_ratio = v;
        }
        if let Some(v) = self.headline {
            prefs.headline = v;
        }
        if let Some(v) = self.body {
            prefs.body = v;
        }
        if let Some(v) = self.branding_text {
            prefs.branding_text = v;
        }
        if let Some(v) = self.branding_position {
            prefs.branding_position = v;
        }
        if let Some(v) = self.show_slide_numbers {
            prefs.show_slide_numbers = v;
        }
        if let Some(v) = self.slide_count {
            prefs.slide_count = v;
        }
        if let Some(v) = self.generate_images {
            prefs.generate_images = v;
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrandKit {
    pub name: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub text_color: String,
    pub headline_font: String,
    pub body_font: String,
    pub branding_text: Option<String>,
    pub branding_position: BrandingPosition,
}

impl Default for BrandKit {
    fn default() -> Self {
        let prefs = DesignPreferences::default();
        Self {
            name: "My Brand".to_string(),
            primary_color: prefs.background_color,
            secondary_color: prefs.accent_color,
            text_color: prefs.text_color,
            headline_font: prefs.headline_font,
            body_font: prefs.body_font,
            branding_text: None,
            branding_position: prefs.branding_position,
        }
    }
}

impl BrandKit {
    /// Copies the kit's palette, fonts and branding into `prefs`.
    pub fn apply_to(&self, prefs: &mut DesignPreferences) {
        prefs.background_color = self.primary_color.clone();
        prefs.accent_color = self.secondary_color.clone();
        prefs.text_color = self.text_color.clone();
        prefs.headline_font = self.headline_font.clone();
        prefs.body_font = self.body_font.clone();
        prefs.branding_text = self.branding_text.clone();
        prefs.branding_position = self.branding_position;
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub api_key: String,
    pub brand_kit: BrandKit,
    pub locale: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            brand_kit: BrandKit::default(),
            locale: "en-US".to_string(),
        }
    }
}
