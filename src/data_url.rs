//! `data:<mime>;base64,<payload>` helpers for inline image/video payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// True when `url` uses the `data:` scheme (scheme matched case-insensitively).
pub fn is_data_url(url: &str) -> bool {
    url.get(..5).is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Splits a base64 data URL into its mime type and still-encoded payload.
pub fn split(url: &str) -> Option<(&str, &str)> {
    if !is_data_url(url) {
        return None;
    }
    let rest = &url[5..];
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, payload))
}

pub fn decode(url: &str) -> Option<(String, Vec<u8>)> {
    let (mime, payload) = split(url)?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

/// File extension for an image/video mime type.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        m if m.starts_with("video/") => "mp4",
        _ => "bin",
    }
}

/// Extension for a payload stored as a slide video; non-video types fall back to `mp4`.
pub fn video_extension_for(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let url = encode("image/png", b"\x89PNG");
        assert!(url.starts_with("data:image/png;base64,"));
        let (mime, bytes) = decode(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"\x89PNG");
    }

    #[test]
    fn test_rejects_non_data_urls() {
        assert!(split("https://example.com/a.png").is_none());
        assert!(split("data:text/plain,hello").is_none());
        assert!(decode("data:image/png;base64,!!!").is_none());
    }

    #[test]
    fn test_extensions() {
        assert_eq!(extension_for("video/mp4"), "mp4");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/x-unknown"), "bin");
        assert_eq!(video_extension_for("video/webm"), "webm");
        assert_eq!(video_extension_for("application/octet-stream"), "mp4");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert!(is_data_url("DATA:video/mp4;base64,AAAA"));
        assert!(is_data_url("data:application/octet-stream;base64,AAAA"));
        assert!(!is_data_url("https://example.com/data:x"));
        assert!(!is_data_url("dat"));
        let (mime, bytes) = decode("Data:video/mp4;base64,AAAA").unwrap();
        assert_eq!(mime, "video/mp4");
        assert_eq!(bytes, vec![0, 0, 0]);
    }
}
