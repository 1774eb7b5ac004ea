//! Contribution counts from the local cache and the record store.

use keepsake_common::config::AppConfig;

pub async fn run(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let stats = super::slide_loader(config)?.stats().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Local photos:   {}", stats.local_photos);
    println!("Local messages: {}", stats.local_messages);
    match stats.remote_photos {
        Some(count) => println!("Store photos:   {count}"),
        None => println!("Store photos:   unavailable"),
    }
    Ok(())
}
