//! Keepsake Slide Store
//!
//! Where slides come from and where new contributions go:
//! - **Remote:** a PostgREST-style record store holding photo records
//! - **Cache:** a local JSON key-value file used when the store is unreachable
//! - **Slides:** ordered slide lists assembled from either source
//! - **Upload:** unsigned uploads to an image CDN, returning a public URL

pub mod cache;
pub mod record;
pub mod remote;
pub mod slides;
pub mod upload;

pub use cache::LocalCache;
pub use record::PhotoRecord;
pub use remote::{MemoryRecordStore, Query, RecordStore, RestRecordStore, SortOrder};
pub use slides::{CachedMessage, LoadedSlides, SlideLoader, SlideSource, SlideStats};
pub use upload::{CloudinaryUploader, MediaUploader};
