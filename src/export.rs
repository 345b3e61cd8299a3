use crate::data_url;
use crate::db::Database;
use crate::models::{is_inline_video, Carousel};
use crate::render::{RenderError, SlideRasterizer};
use futures::StreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("There are no slides to export")]
    NothingToExport,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Could not read the video for slide {slide}: {reason}")]
    Video { slide: usize, reason: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub entries: usize,
    pub download_count: u64,
}

/// `"Coffee Brewing 101!"` -> `"coffee_brewing_101_"`.
pub fn sanitize_filename(title: &str) -> String {
    let name: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if name.is_empty() {
        "carousel".to_string()
    } else {
        name
    }
}

/// Slide indices in authored order for the mounted slide ids; unknown and
/// repeated ids are dropped.
pub fn authored_order(carousel: &Carousel, mounted: &[String]) -> Vec<usize> {
    let index_of: HashMap<&str, usize> = carousel
        .slides
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    let mut order: Vec<usize> = mounted
        .iter()
        .filter_map(|id| index_of.get(id.as_str()).copied())
        .collect();
    order.sort_unstable();
    order.dedup();
    order
}

pub struct Exporter {
    db: Arc<Database>,
    rasterizer: Box<dyn SlideRasterizer>,
    client: Client,
    download_dir: PathBuf,
}

impl Exporter {
    pub fn new(db: Arc<Database>, rasterizer: Box<dyn SlideRasterizer>, download_dir: PathBuf) -> Self {
        Self {
            db,
            rasterizer,
            client: Client::new(),
            download_dir,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn video_bytes(&self, slide: usize, url: &str) -> Result<(String, Vec<u8>), ExportError> {
        if is_inline_video(url) {
            return data_url::decode(url).ok_or_else(|| ExportError::Video {
                slide,
                reason: "malformed data URL".to_string(),
            });
        }

        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ExportError::Video {
                slide,
                reason: format!("download returned {}", resp.status()),
            });
        }
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|m| m.starts_with("video/"))
            .unwrap_or_else(|| "video/mp4".to_string());
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok((mime, bytes))
    }

    /// Rasterizes the mounted slides in authored order. Video slides yield the
    /// video itself plus a transparent overlay image.
    pub async fn collect_entries(
        &self,
        carousel: &Carousel,
        mounted: &[String],
    ) -> Result<Vec<ArchiveEntry>, ExportError> {
        let order = authored_order(carousel, mounted);
        if order.is_empty() {
            return Err(ExportError::NothingToExport);
        }

        let mut entries = Vec::with_capacity(order.len());
        for index in order {
            let slide = &carousel.slides[index];
            let position = index + 1;
            match slide.video_url.as_deref() {
                Some(url) => {
                    let (mime, bytes) = self.video_bytes(position, url).await?;
                    entries.push(ArchiveEntry {
                        name: format!("slide-{}.{}", position, data_url::video_extension_for(&mime)),
                        bytes,
                    });
                    entries.push(ArchiveEntry {
                        name: format!("slide-{}-overlay.png", position),
                        bytes: self.rasterizer.render_overlay(carousel, index)?,
                    });
                }
                None => entries.push(ArchiveEntry {
                    name: format!("slide-{}.png", position),
                    bytes: self.rasterizer.render_slide(carousel, index)?,
                }),
            }
            tracing::debug!(slide = position, "Slide rendered");
        }
        Ok(entries)
    }

    /// Writes the archive and bumps the download counter. On any failure no
    /// archive is left behind.
    pub async fn export(&self, carousel: &Carousel, mounted: &[String]) -> Result<ExportOutcome, ExportError> {
        let entries = self.collect_entries(carousel, mounted).await?;
        let archive = build_archive(&entries)?;

        std::fs::create_dir_all(&self.download_dir)?;
        let path = self
            .download_dir
            .join(format!("{}.zip", sanitize_filename(&carousel.title)));
        let partial = path.with_extension("zip.part");
        if let Err(e) = std::fs::write(&partial, &archive).and_then(|()| std::fs::rename(&partial, &path)) {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }

        let download_count = match self.db.increment_download_count() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Download counter not updated");
                self.db.download_count().unwrap_or(0)
            }
        };
        tracing::info!(path = %path.display(), entries = entries.len(), "Carousel exported");
        Ok(ExportOutcome {
            path,
            entries: entries.len(),
            download_count,
        })
    }
}

pub fn build_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, ExportError> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);
        zip.start_file(entry.name.as_str(), options)?;
        zip.write_all(&entry.bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}
