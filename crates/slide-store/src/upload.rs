//! Unsigned uploads to the image CDN.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use keepsake_common::config::UploadConfig;
use keepsake_common::error::{KeepsakeError, KeepsakeResult};

/// Largest accepted upload, 5 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Accepted file extensions, lowercase.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

const DEFAULT_ENDPOINT: &str = "https://api.cloudinary.com";

/// Stores a media file and returns its public URL.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> KeepsakeResult<String>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Unsigned multipart upload using an upload preset.
#[derive(Debug, Clone)]
pub struct CloudinaryUploader {
    client: reqwest::Client,
    endpoint: String,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryUploader {
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        }
    }

    /// Uploader for the configured account, or `None` without a cloud name.
    pub fn from_config(config: &UploadConfig) -> Option<Self> {
        config
            .cloud_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| Self::new(name, config.upload_preset.clone()))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn upload_url(&self) -> String {
        format!("{}/v1_1/{}/image/upload", self.endpoint, self.cloud_name)
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> KeepsakeResult<String> {
        let size = bytes.len();
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("upload_preset", self.upload_preset.clone());

        let response: UploadResponse = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| KeepsakeError::upload(format!("{file_name}: {e}")))?
            .json()
            .await
            .map_err(|e| KeepsakeError::upload(format!("{file_name}: bad response: {e}")))?;

        tracing::info!(file = file_name, bytes = size, url = %response.secure_url, "Upload complete");
        Ok(response.secure_url)
    }
}

/// Reject files the CDN preset would refuse.
pub fn validate_upload(path: &Path, size: u64) -> KeepsakeResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(KeepsakeError::upload(format!(
            "{}: only {} files can be uploaded",
            path.display(),
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(KeepsakeError::upload(format!(
            "{}: {size} bytes exceeds the {MAX_UPLOAD_BYTES} byte limit",
            path.display()
        )));
    }
    Ok(())
}

/// Validate and upload a file from disk.
pub async fn upload_file(uploader: &dyn MediaUploader, path: &Path) -> KeepsakeResult<String> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => KeepsakeError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => KeepsakeError::Io(e),
    })?;
    validate_upload(path, metadata.len())?;

    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    uploader.upload(&file_name, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingUploader {
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl MediaUploader for RecordingUploader {
        async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> KeepsakeResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((file_name.to_string(), bytes.len()));
            Ok(format!("https://cdn.example/{file_name}"))
        }
    }

    #[test]
    fn test_upload_url() {
        let uploader = CloudinaryUploader::new("demo", "ml_default");
        assert_eq!(
            uploader.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
        let local = uploader.with_endpoint("http://127.0.0.1:9000/");
        assert_eq!(local.upload_url(), "http://127.0.0.1:9000/v1_1/demo/image/upload");
    }

    #[test]
    fn test_from_config_requires_cloud_name() {
        assert!(CloudinaryUploader::from_config(&UploadConfig::default()).is_none());
    }

    #[test]
    fn test_validation() {
        assert!(validate_upload(Path::new("a.JPG"), 10).is_ok());
        assert!(validate_upload(Path::new("a.webp"), 10).is_err());
        assert!(validate_upload(Path::new("noext"), 10).is_err());
        assert!(validate_upload(Path::new("a.png"), MAX_UPLOAD_BYTES + 1).is_err());
    }

    #[test]
    fn test_five_mebibytes_is_accepted() {
        assert!(validate_upload(Path::new("a.jpg"), 5_242_880).is_ok());
        assert!(validate_upload(Path::new("a.jpg"), 5_242_881).is_err());
    }

    #[tokio::test]
    async fn test_upload_file_reads_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("party.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let uploader = RecordingUploader::default();

        let url = upload_file(&uploader, &path).await.unwrap();
        assert_eq!(url, "https://cdn.example/party.png");
        assert_eq!(
            uploader.calls.lock().unwrap().as_slice(),
            &[("party.png".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let uploader = RecordingUploader::default();
        let err = upload_file(&uploader, Path::new("/nonexistent/x.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeepsakeError::FileNotFound { .. }));
    }
}
