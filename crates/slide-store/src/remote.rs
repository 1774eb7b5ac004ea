//! Remote record store.
//!
//! The hosted store speaks PostgREST: rows live under `/rest/v1/<table>`,
//! filters are `column=eq.value` query pairs, and ordering is
//! `order=column.asc|desc`. Every request carries the anonymous key both as
//! `apikey` and as a bearer token.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use keepsake_common::config::StoreConfig;
use keepsake_common::error::{KeepsakeError, KeepsakeResult};

use crate::record::PhotoRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn suffix(self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Row selection: equality filters, one sort column, optional limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, String)>,
    pub order: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query string pairs in PostgREST form.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        for (column, value) in &self.filters {
            params.push((column.clone(), format!("eq.{value}")));
        }
        if let Some((column, order)) = &self.order {
            params.push(("order".to_string(), format!("{column}.{}", order.suffix())));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Table-oriented record storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, table: &str, record: &PhotoRecord) -> KeepsakeResult<()>;

    async fn select(&self, table: &str, query: &Query) -> KeepsakeResult<Vec<PhotoRecord>>;
}

/// HTTP client for a hosted PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct RestRecordStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestRecordStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> KeepsakeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeepsakeError::store(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Store described by the config, or `None` when no URL is configured.
    pub fn from_config(config: &StoreConfig) -> KeepsakeResult<Option<Self>> {
        let Some(url) = config.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let timeout = Duration::from_secs_f64(config.timeout_secs.max(0.1));
        Self::new(url, config.api_key.clone().unwrap_or_default(), timeout).map(Some)
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

fn http_err(table: &str, err: reqwest::Error) -> KeepsakeError {
    KeepsakeError::store(format!("{table}: {err}"))
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn insert(&self, table: &str, record: &PhotoRecord) -> KeepsakeResult<()> {
        self.request(reqwest::Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(&[record])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| http_err(table, e))?;
        tracing::debug!(table, image_url = %record.image_url, "Record inserted");
        Ok(())
    }

    async fn select(&self, table: &str, query: &Query) -> KeepsakeResult<Vec<PhotoRecord>> {
        let rows: Vec<PhotoRecord> = self
            .request(reqwest::Method::GET, table)
            .query(&query.to_params())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| http_err(table, e))?
            .json()
            .await
            .map_err(|e| http_err(table, e))?;
        tracing::debug!(table, rows = rows.len(), "Records selected");
        Ok(rows)
    }
}

/// In-process store for offline runs and tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, Vec<PhotoRecord>>>,
    unavailable: bool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails, as when the network is down.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn rows(&self, table: &str) -> Vec<PhotoRecord> {
        self.tables
            .lock()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn check(&self) -> KeepsakeResult<()> {
        if self.unavailable {
            Err(KeepsakeError::store("record store unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, table: &str, record: &PhotoRecord) -> KeepsakeResult<()> {
        self.check()?;
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| KeepsakeError::store("record store lock poisoned"))?;
        let rows = tables.entry(table.to_string()).or_default();
        let mut record = record.clone();
        record.id = Some(rows.len() as i64 + 1);
        rows.push(record);
        Ok(())
    }

    async fn select(&self, table: &str, query: &Query) -> KeepsakeResult<Vec<PhotoRecord>> {
        self.check()?;
        let mut rows: Vec<PhotoRecord> = self
            .rows(table)
            .into_iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|(column, value)| row.column(column).as_deref() == Some(value.as_str()))
            })
            .collect();

        if let Some((column, order)) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_column(a, b, column);
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

fn compare_column(a: &PhotoRecord, b: &PhotoRecord, column: &str) -> Ordering {
    match column {
        "id" => a.id.cmp(&b.id),
        "created_at" => a.created_at.cmp(&b.created_at),
        _ => a.column(column).cmp(&b.column(column)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_query_params_follow_postgrest() {
        let query = Query::new()
            .eq("name", "Ama")
            .order_by("created_at", SortOrder::Ascending)
            .limit(5);
        assert_eq!(
            query.to_params(),
            vec![
                ("select".to_string(), "*".to_string()),
                ("name".to_string(), "eq.Ama".to_string()),
                ("order".to_string(), "created_at.asc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_table_url_strips_trailing_slash() {
        let store =
            RestRecordStore::new("https://db.example.co/", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(store.table_url("photos"), "https://db.example.co/rest/v1/photos");
    }

    #[test]
    fn test_from_config_without_url_is_none() {
        assert!(RestRecordStore::from_config(&StoreConfig::default())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_memory_store_orders_and_filters() {
        let store = MemoryRecordStore::new();
        let later = Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 2, 20, 8, 0, 0).unwrap();
        store
            .insert("photos", &PhotoRecord::captioned("b", "Kojo", "hey", later))
            .await
            .unwrap();
        store
            .insert("photos", &PhotoRecord::captioned("a", "Ama", "hi", earlier))
            .await
            .unwrap();

        let ordered = store
            .select("photos", &Query::new().order_by("created_at", SortOrder::Ascending))
            .await
            .unwrap();
        let urls: Vec<&str> = ordered.iter().map(|r| r.image_url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b"]);
        assert_eq!(ordered[0].id, Some(2));

        let filtered = store
            .select("photos", &Query::new().eq("name", "Kojo"))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].image_url, "b");
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryRecordStore::unavailable();
        let err = store.select("photos", &Query::new()).await.unwrap_err();
        assert!(matches!(err, KeepsakeError::Store { .. }));
    }
}
