pub mod add;
pub mod card;
pub mod check;
pub mod clear;
pub mod export;
pub mod list;
pub mod plan;
pub mod remove;
pub mod stats;
pub mod upload;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use keepsake_common::config::AppConfig;
use keepsake_slide_model::{load_slides_file, Slide};
use keepsake_slide_store::{LocalCache, RecordStore, RestRecordStore, SlideLoader};

/// Slide loader wired to the configured store and cache.
pub fn slide_loader(config: &AppConfig) -> anyhow::Result<SlideLoader> {
    let store = RestRecordStore::from_config(&config.store)?
        .map(|store| Arc::new(store) as Arc<dyn RecordStore>);
    if store.is_none() {
        tracing::debug!("No record store configured, using local cache only");
    }
    let cache = LocalCache::open(&config.store.cache_path)
        .with_context(|| format!("Failed to open cache {}", config.store.cache_path.display()))?;
    Ok(SlideLoader::new(store, cache).with_table(config.store.table.clone()))
}

/// Slides from `file` when given, otherwise from the store or cache.
pub async fn load_slides(config: &AppConfig, file: Option<&Path>) -> anyhow::Result<Vec<Slide>> {
    match file {
        Some(path) => Ok(load_slides_file(path)?),
        None => Ok(slide_loader(config)?.load().await.slides),
    }
}
