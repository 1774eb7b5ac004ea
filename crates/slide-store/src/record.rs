//! Photo records as stored in the remote `photos` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keepsake_slide_model::Slide;

/// Table holding photo records.
pub const PHOTOS_TABLE: &str = "photos";

/// Caption heading for records uploaded without a name.
pub const CLOUD_NAME: &str = "From The Cloud";

/// Caption for records uploaded without a message.
pub const DEFAULT_MESSAGE: &str = "A special memory shared with love";

/// One row of the photos table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Assigned by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub image_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PhotoRecord {
    /// A bare photo, stamped now.
    pub fn photo(image_url: impl Into<String>) -> Self {
        Self {
            id: None,
            image_url: image_url.into(),
            name: None,
            message: None,
            created_at: Some(Utc::now()),
        }
    }

    /// A photo with its contributor's caption.
    pub fn captioned(
        image_url: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            image_url: image_url.into(),
            name: Some(name.into()),
            message: Some(message.into()),
            created_at: Some(created_at),
        }
    }

    /// Value of a column as text, for filtering.
    pub fn column(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.map(|id| id.to_string()),
            "image_url" => Some(self.image_url.clone()),
            "name" => self.name.clone(),
            "message" => self.message.clone(),
            "created_at" => self.created_at.map(|t| t.to_rfc3339()),
            _ => None,
        }
    }

    /// Slide for this record; blank captions get the cloud defaults.
    pub fn to_slide(&self) -> Slide {
        Slide::new(
            non_blank(self.name.as_deref()).unwrap_or(CLOUD_NAME),
            non_blank(self.message.as_deref()).unwrap_or(DEFAULT_MESSAGE),
            self.image_url.clone(),
        )
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
