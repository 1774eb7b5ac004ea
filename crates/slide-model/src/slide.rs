//! Slide records fed to the compositor.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One photo with the name and message of whoever shared it.
///
/// Slides are immutable once handed to the compositor; the order of a slide
/// list is the presentation order in the output video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    /// Author name shown as the caption heading.
    pub name: String,

    /// Message shown under the name, word-wrapped.
    pub message: String,

    /// URL or filesystem path of the photo.
    #[serde(alias = "imageSource", alias = "photo", alias = "image_url")]
    pub image_source: String,
}

/// Errors raised while reading slide lists.
#[derive(Debug, thiserror::Error)]
pub enum SlideError {
    #[error("Failed to read slide list {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse slide list {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
}

impl Slide {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        image_source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            image_source: image_source.into(),
        }
    }

    /// Whether the image source is fetched over HTTP(S).
    pub fn is_remote(&self) -> bool {
        is_remote_source(&self.image_source)
    }
}

/// Whether a media source string refers to an HTTP(S) resource.
pub fn is_remote_source(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Read an ordered slide list from a JSON array file.
pub fn load_slides_file(path: impl AsRef<Path>) -> Result<Vec<Slide>, SlideError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| SlideError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SlideError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_accepts_source_aliases() {
        let json = r#"[
            {"name": "A", "message": "hi", "imageSource": "img1"},
            {"name": "B", "message": "bye", "photo": "https://cdn.example/img2.jpg"}
        ]"#;
        let slides: Vec<Slide> = serde_json::from_str(json).unwrap();
        assert_eq!(slides[0].image_source, "img1");
        assert!(!slides[0].is_remote());
        assert!(slides[1].is_remote());
    }

    #[test]
    fn test_remote_detection_is_case_insensitive() {
        assert!(is_remote_source("HTTPS://example.com/a.png"));
        assert!(!is_remote_source("/tmp/https.png"));
    }
}
