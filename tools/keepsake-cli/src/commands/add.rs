//! Add a message for a photo.

use keepsake_common::config::AppConfig;

pub async fn run(config: &AppConfig, name: &str, message: &str, photo: &str) -> anyhow::Result<()> {
    let mut loader = super::slide_loader(config)?;
    let entry = loader.add_message(name, message, photo).await?;
    println!(
        "Message from {} added ({} in cache).",
        entry.name,
        loader.messages().len()
    );
    Ok(())
}
