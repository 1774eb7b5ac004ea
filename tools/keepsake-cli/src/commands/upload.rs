//! Upload a photo and add it to the slideshow.

use std::path::Path;

use keepsake_common::config::AppConfig;
use keepsake_slide_store::upload::upload_file;
use keepsake_slide_store::CloudinaryUploader;

pub async fn run(config: &AppConfig, file: &Path) -> anyhow::Result<()> {
    let uploader = CloudinaryUploader::from_config(&config.upload).ok_or_else(|| {
        anyhow::anyhow!("No upload account configured (set upload.cloud_name in the config)")
    })?;

    println!("Uploading {}", file.display());
    let url = upload_file(&uploader, file).await?;

    let mut loader = super::slide_loader(config)?;
    loader.add_photo(&url).await?;
    println!("Uploaded: {url}");
    Ok(())
}
