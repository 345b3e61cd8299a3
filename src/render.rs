//! Slide rasterization: lays a slide out as SVG and renders it with resvg.

use crate::models::{BrandingPosition, Carousel, SlideData, TextAlign, TextPosition, TextStyle};
use resvg::usvg;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Slide {0} does not exist")]
    MissingSlide(usize),
    #[error("Invalid slide markup: {0}")]
    Svg(#[from] usvg::Error),
    #[error("Could not allocate a {0}x{1} canvas")]
    Canvas(u32, u32),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Turns one slide of a carousel into PNG bytes.
pub trait SlideRasterizer {
    /// Background, visual and overlay text.
    fn render_slide(&self, carousel: &Carousel, index: usize) -> Result<Vec<u8>, RenderError>;

    /// Overlay text and graphics only, on a transparent background.
    fn render_overlay(&self, carousel: &Carousel, index: usize) -> Result<Vec<u8>, RenderError>;
}

const PADDING: u32 = 96;

pub struct SvgRasterizer {
    options: usvg::Options<'static>,
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgRasterizer {
    pub fn new() -> Self {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        Self { options }
    }

    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
        let tree = usvg::Tree::from_str(svg, &self.options)?;
        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or(RenderError::Canvas(width, height))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
        pixmap.encode_png().map_err(|e| RenderError::Encode(e.to_string()))
    }

    fn render(&self, carousel: &Carousel, index: usize, with_background: bool) -> Result<Vec<u8>, RenderError> {
        let slide = carousel.slides.get(index).ok_or(RenderError::MissingSlide(index))?;
        let (width, height) = carousel.preferences.aspect_ratio.dimensions();
        let svg = slide_svg(carousel, slide, index, with_background);
        self.rasterize(&svg, width, height)
    }
}

impl SlideRasterizer for SvgRasterizer {
    fn render_slide(&self, carousel: &Carousel, index: usize) -> Result<Vec<u8>, RenderError> {
        self.render(carousel, index, true)
    }

    fn render_overlay(&self, carousel: &Carousel, index: usize) -> Result<Vec<u8>, RenderError> {
        self.render(carousel, index, false)
    }
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Greedy word wrap on an average glyph width of ~0.55em.
pub(crate) fn wrap_text(text: &str, font_size: u32, max_width: u32) -> Vec<String> {
    let max_chars = ((max_width as f32) / (font_size.max(1) as f32 * 0.55)).floor().max(1.0) as usize;
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let needed = if line.is_empty() { word.chars().count() } else { line.chars().count() + 1 + word.chars().count() };
            if needed > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

fn anchor(align: TextAlign, width: u32) -> (&'static str, u32) {
    match align {
        TextAlign::Left => ("start", PADDING),
        TextAlign::Center => ("middle", width / 2),
        TextAlign::Right => ("end", width - PADDING),
    }
}

fn text_block(
    lines: &[String],
    style: &TextStyle,
    size: u32,
    font: &str,
    color: &str,
    x: u32,
    anchor: &str,
    top: u32,
) -> String {
    let line_height = size * 6 / 5;
    let mut svg = format!(
        r#"<text font-family="{font}, sans-serif" font-size="{size}" font-weight="{weight}" fill="{color}" text-anchor="{anchor}""#,
        font = escape_xml(font),
        weight = style.font_weight,
        color = escape_xml(color),
    );
    if style.stroke_width > 0 {
        svg.push_str(&format!(
            r#" stroke="{}" stroke-width="{}" paint-order="stroke""#,
            escape_xml(&style.stroke_color),
            style.stroke_width
        ));
    }
    svg.push('>');
    for (i, line) in lines.iter().enumerate() {
        let y = top + size + i as u32 * line_height;
        svg.push_str(&format!(r#"<tspan x="{x}" y="{y}">{}</tspan>"#, escape_xml(line)));
    }
    svg.push_str("</text>");
    svg
}

/// SVG markup for one slide. Without background only the overlay is drawn.
pub(crate) fn slide_svg(carousel: &Carousel, slide: &SlideData, index: usize, with_background: bool) -> String {
    let prefs = &carousel.preferences;
    let overrides = &slide.overrides;
    let (width, height) = prefs.aspect_ratio.dimensions();
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );

    if with_background {
        let background = overrides.background_color.as_deref().unwrap_or(&prefs.background_color);
        svg.push_str(&format!(
            r#"<rect width="{width}" height="{height}" fill="{}"/>"#,
            escape_xml(background)
        ));
        if let Some(image) = slide.image_url.as_deref().filter(|u| u.starts_with("data:image/")) {
            svg.push_str(&format!(
                r#"<image href="{}" width="{width}" height="{height}" preserveAspectRatio="xMidYMid slice"/>"#,
                escape_xml(image)
            ));
            svg.push_str(&format!(
                r##"<rect width="{width}" height="{height}" fill="#000000" fill-opacity="0.35"/>"##
            ));
        }
    }

    let text_width = width - 2 * PADDING;
    let headline_size = overrides.headline_size.unwrap_or(prefs.headline.font_size);
    let body_size = overrides.body_size.unwrap_or(prefs.body.font_size);
    let headline_lines = wrap_text(&slide.headline, headline_size, text_width);
    let body_lines = wrap_text(&slide.body, body_size, text_width);
    let headline_height = headline_lines.len() as u32 * headline_size * 6 / 5;
    let body_height = body_lines.len() as u32 * body_size * 6 / 5;
    let gap = if body_lines.is_empty() { 0 } else { body_size };
    let block_height = headline_height + gap + body_height;

    let position = overrides.text_position.unwrap_or(prefs.headline.position);
    let top = match position {
        TextPosition::Top => PADDING,
        TextPosition::Center => height.saturating_sub(block_height) / 2,
        TextPosition::Bottom => height.saturating_sub(block_height + PADDING * 2),
    };

    let (headline_anchor, headline_x) = anchor(prefs.headline.align, width);
    let headline_color = overrides.headline_color.as_deref().unwrap_or(&prefs.text_color);
    svg.push_str(&text_block(
        &headline_lines,
        &prefs.headline,
        headline_size,
        &prefs.headline_font,
        headline_color,
        headline_x,
        headline_anchor,
        top,
    ));

    let (body_anchor, body_x) = anchor(prefs.body.align, width);
    let body_color = overrides.body_color.as_deref().unwrap_or(&prefs.text_color);
    svg.push_str(&text_block(
        &body_lines,
        &prefs.body,
        body_size,
        &prefs.body_font,
        body_color,
        body_x,
        body_anchor,
        top + headline_height + gap,
    ));

    let small = 28;
    if let Some(branding) = prefs.branding_text.as_deref().filter(|b| !b.trim().is_empty()) {
        let (x, y, text_anchor) = match prefs.branding_position {
            BrandingPosition::TopLeft => (PADDING / 2, PADDING / 2 + small, "start"),
            BrandingPosition::TopRight => (width - PADDING / 2, PADDING / 2 + small, "end"),
            BrandingPosition::BottomLeft => (PADDING / 2, height - PADDING / 2, "start"),
            BrandingPosition::BottomRight => (width - PADDING / 2, height - PADDING / 2, "end"),
        };
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-family="{}, sans-serif" font-size="{small}" fill="{}" text-anchor="{text_anchor}">{}</text>"#,
            escape_xml(&prefs.body_font),
            escape_xml(&prefs.accent_color),
            escape_xml(branding)
        ));
    }

    if prefs.show_slide_numbers {
        // Opposite corner from the branding so the two never overlap.
        let (x, text_anchor) = match prefs.branding_position {
            BrandingPosition::TopLeft | BrandingPosition::BottomLeft => (width - PADDING / 2, "end"),
            BrandingPosition::TopRight | BrandingPosition::BottomRight => (PADDING / 2, "start"),
        };
        svg.push_str(&format!(
            r#"<text x="{x}" y="{}" font-family="{}, sans-serif" font-size="{small}" fill="{}" text-anchor="{text_anchor}">{}/{}</text>"#,
            height - PADDING / 2,
            escape_xml(&prefs.body_font),
            escape_xml(&prefs.text_color),
            index + 1,
            carousel.slides.len()
        ));
    }

    svg.push_str("</svg>");
    svg
}
