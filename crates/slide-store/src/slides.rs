//! Slide lists assembled from the record store, with the local cache as
//! fallback, and the write path for new contributions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keepsake_common::error::{KeepsakeError, KeepsakeResult};
use keepsake_slide_model::Slide;

use crate::cache::LocalCache;
use crate::record::{PhotoRecord, CLOUD_NAME, DEFAULT_MESSAGE, PHOTOS_TABLE};
use crate::remote::{Query, RecordStore, SortOrder};

/// Cached contributor messages.
pub const MESSAGES_KEY: &str = "ellenMessages";

/// Cached URLs of uploaded photos.
pub const PHOTOS_KEY: &str = "ellenPhotos";

/// Cached URLs of photos imported from the legacy cloud bucket.
pub const CLOUD_PHOTOS_KEY: &str = "ellenFirebasePhotos";

/// Name used when a contributor leaves theirs blank.
pub const ANONYMOUS: &str = "Anonymous";

/// A message as kept in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMessage {
    pub name: String,
    pub message: String,
    pub photo: String,
    #[serde(default = "Utc::now")]
    pub date: DateTime<Utc>,
}

/// Where a slide list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideSource {
    Remote,
    Cache,
    /// Neither source had anything.
    Empty,
}

/// Contribution counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlideStats {
    /// Uploaded photos kept in the local cache.
    pub local_photos: usize,
    pub local_messages: usize,
    /// Rows in the record store; `None` when it is unconfigured or unreachable.
    pub remote_photos: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSlides {
    pub slides: Vec<Slide>,
    pub source: SlideSource,
}

/// Reads and writes contributions.
pub struct SlideLoader {
    store: Option<Arc<dyn RecordStore>>,
    cache: LocalCache,
    table: String,
}

impl SlideLoader {
    pub fn new(store: Option<Arc<dyn RecordStore>>, cache: LocalCache) -> Self {
        Self {
            store,
            cache,
            table: PHOTOS_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Slides in presentation order.
    ///
    /// Remote rows win when there are any. Otherwise cached messages come
    /// first, followed by cached cloud photos. Store failures are logged and
    /// never returned.
    pub async fn load(&self) -> LoadedSlides {
        if let Some(store) = &self.store {
            let query = Query::new().order_by("created_at", SortOrder::Ascending);
            match store.select(&self.table, &query).await {
                Ok(rows) if !rows.is_empty() => {
                    tracing::info!(rows = rows.len(), "Loaded slides from record store");
                    return LoadedSlides {
                        slides: rows.iter().map(PhotoRecord::to_slide).collect(),
                        source: SlideSource::Remote,
                    };
                }
                Ok(_) => tracing::info!("Record store is empty, using local cache"),
                Err(e) => {
                    tracing::warn!(error = %e, "Record store unavailable, using local cache")
                }
            }
        }

        let messages: Vec<CachedMessage> = self.cache.get_json(MESSAGES_KEY);
        let cloud_photos: Vec<String> = self.cache.get_json(CLOUD_PHOTOS_KEY);
        let slides: Vec<Slide> = messages
            .iter()
            .map(|m| Slide::new(m.name.clone(), m.message.clone(), m.photo.clone()))
            .chain(
                cloud_photos
                    .iter()
                    .map(|url| Slide::new(CLOUD_NAME, DEFAULT_MESSAGE, url.clone())),
            )
            .collect();

        let source = if slides.is_empty() {
            SlideSource::Empty
        } else {
            SlideSource::Cache
        };
        tracing::info!(slides = slides.len(), ?source, "Loaded slides from local cache");
        LoadedSlides { slides, source }
    }

    pub fn messages(&self) -> Vec<CachedMessage> {
        self.cache.get_json(MESSAGES_KEY)
    }

    pub fn photos(&self) -> Vec<String> {
        self.cache.get_json(PHOTOS_KEY)
    }

    /// Add a message for `photo`. The cache write must succeed; the store
    /// insert is best-effort.
    pub async fn add_message(
        &mut self,
        name: &str,
        message: &str,
        photo: &str,
    ) -> KeepsakeResult<CachedMessage> {
        if photo.trim().is_empty() {
            return Err(KeepsakeError::store("a message needs a photo"));
        }
        let name = name.trim();
        let entry = CachedMessage {
            name: if name.is_empty() { ANONYMOUS } else { name }.to_string(),
            message: message.to_string(),
            photo: photo.to_string(),
            date: Utc::now(),
        };

        let mut messages = self.messages();
        messages.push(entry.clone());
        self.cache.set_json(MESSAGES_KEY, &messages)?;

        let record =
            PhotoRecord::captioned(&entry.photo, &entry.name, &entry.message, entry.date);
        self.insert_remote(&record).await;
        Ok(entry)
    }

    /// Add an uploaded photo URL.
    pub async fn add_photo(&mut self, url: &str) -> KeepsakeResult<()> {
        let mut photos = self.photos();
        photos.push(url.to_string());
        self.cache.set_json(PHOTOS_KEY, &photos)?;

        self.insert_remote(&PhotoRecord::photo(url)).await;
        Ok(())
    }

    /// Remove the cached photo at `index` and return its URL. The record
    /// store is left as is.
    pub fn remove_photo(&mut self, index: usize) -> KeepsakeResult<String> {
        let mut photos = self.photos();
        if index >= photos.len() {
            return Err(KeepsakeError::store(format!(
                "no photo at position {} ({} cached)",
                index + 1,
                photos.len()
            )));
        }
        let removed = photos.remove(index);
        self.cache.set_json(PHOTOS_KEY, &photos)?;
        tracing::info!(index, url = %removed, "Removed cached photo");
        Ok(removed)
    }

    /// Drop every cached photo and message. Cloud imports and the record
    /// store are untouched.
    pub fn clear(&mut self) -> KeepsakeResult<()> {
        self.cache.remove(PHOTOS_KEY)?;
        self.cache.remove(MESSAGES_KEY)?;
        tracing::info!("Cleared cached photos and messages");
        Ok(())
    }

    pub async fn stats(&self) -> SlideStats {
        let remote_photos = match &self.store {
            Some(store) => match store.select(&self.table, &Query::new()).await {
                Ok(rows) => Some(rows.len()),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not count record store photos");
                    None
                }
            },
            None => None,
        };
        SlideStats {
            local_photos: self.photos().len(),
            local_messages: self.messages().len(),
            remote_photos,
        }
    }

    async fn insert_remote(&self, record: &PhotoRecord) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.insert(&self.table, record).await {
            tracing::warn!(error = %e, image_url = %record.image_url, "Failed to save to record store");
        }
    }
}
