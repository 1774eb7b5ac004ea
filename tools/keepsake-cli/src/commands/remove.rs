//! Remove one uploaded photo from the local cache.

use keepsake_common::config::AppConfig;

pub fn run(config: &AppConfig, number: usize) -> anyhow::Result<()> {
    if number == 0 {
        anyhow::bail!("Photo numbers start at 1");
    }
    let mut loader = super::slide_loader(config)?;
    let url = loader.remove_photo(number - 1)?;
    println!("Removed photo {number}: {url}");
    Ok(())
}
