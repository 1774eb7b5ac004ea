//! Clear cached photos and messages.

use keepsake_common::config::AppConfig;

pub fn run(config: &AppConfig, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This deletes every cached photo and message and cannot be undone.");
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }
    super::slide_loader(config)?.clear()?;
    println!("All photos cleared.");
    Ok(())
}
