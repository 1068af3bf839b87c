//! REST client for the Airtable record API.
//!
//! Every HTTP request, including each page of a listing, passes through the
//! client's [`RateLimiter`] first.

use std::future::Future;

use async_trait::async_trait;
use heirloom_core::rate_limit::RateLimiter;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::AirtableConfig;
use crate::error::RecordStoreError;

/// Raw field map of a record.
pub type Fields = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One Airtable record as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            created_time: None,
        }
    }

    /// Non-empty string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Checkbox field; missing counts as unchecked.
    pub fn bool_field(&self, name: &str) -> bool {
        match self.fields.get(name) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
            }
            Some(serde_json::Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            _ => false,
        }
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        match self.fields.get(name)? {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Linked-record or multi-select field as a list of strings. A single
    /// string is treated as a one-element list.
    pub fn string_list(&self, name: &str) -> Vec<String> {
        match self.fields.get(name) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
            Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Options for [`RecordStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Airtable formula, e.g. `AND({Status} = 'Active')`.
    pub filter_formula: Option<String>,
    /// Stop after this many records across all pages.
    pub max_records: Option<usize>,
    pub sort: Vec<Sort>,
}

impl ListQuery {
    pub fn filtered(formula: impl Into<String>) -> Self {
        Self {
            filter_formula: Some(formula.into()),
            ..Self::default()
        }
    }

    pub fn limit(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    /// Query-string parameters, without the pagination offset.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(formula) = &self.filter_formula {
            params.push(("filterByFormula".to_string(), formula.clone()));
        }
        if let Some(max) = self.max_records {
            params.push(("maxRecords".to_string(), max.to_string()));
        }
        for (i, sort) in self.sort.iter().enumerate() {
            params.push((format!("sort[{i}][field]"), sort.field.clone()));
            params.push((format!("sort[{i}][direction]"), sort.direction.as_str().to_string()));
        }
        params
    }
}

/// One page of a listing.
#[derive(Debug, Deserialize)]
pub struct ListPage {
    #[serde(default)]
    pub records: Vec<Record>,
    /// Cursor for the next page; absent on the last page.
    pub offset: Option<String>,
}

#[derive(Serialize)]
struct FieldsBody<'a> {
    fields: &'a Fields,
    typecast: bool,
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// CRUD over a remote tabular record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records matching `query`, following pagination until exhausted.
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>, RecordStoreError>;

    /// One record, or `None` if the store reports it missing.
    async fn get(&self, table: &str, record_id: &str) -> Result<Option<Record>, RecordStoreError>;

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, RecordStoreError>;

    /// Partial update: only the given fields change.
    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<Record, RecordStoreError>;
}

/// Drain a paginated listing. `fetch` receives the cursor of the page to
/// load (`None` for the first).
pub async fn collect_pages<F, Fut>(
    max_records: Option<usize>,
    mut fetch: F,
) -> Result<Vec<Record>, RecordStoreError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListPage, RecordStoreError>>,
{
    let mut records = Vec::new();
    let mut offset = None;
    loop {
        let page = fetch(offset.take()).await?;
        records.extend(page.records);

        if let Some(max) = max_records {
            if records.len() >= max {
                records.truncate(max);
                break;
            }
        }

        match page.offset {
            Some(next) if !next.is_empty() => offset = Some(next),
            _ => break,
        }
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// AirtableClient
// ---------------------------------------------------------------------------

/// HTTP client for one Airtable base.
pub struct AirtableClient {
    client: reqwest::Client,
    api_url: String,
    base_id: String,
    api_key: String,
    limiter: RateLimiter,
}

impl AirtableClient {
    pub fn new(config: &AirtableConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, config: &AirtableConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            base_id: config.base_id.clone(),
            api_key: config.api_key.clone(),
            limiter: RateLimiter::new(config.requests_per_second),
        }
    }

    /// `<api_url>/<base_id>/<table>[/<record_id>]` with each segment
    /// percent-encoded.
    pub fn table_url(&self, table: &str, record_id: Option<&str>) -> Result<Url, RecordStoreError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| RecordStoreError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RecordStoreError::InvalidUrl(self.api_url.clone()))?;
            segments.pop_if_empty().push(&self.base_id).push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn fetch_page(
        &self,
        url: &Url,
        params: &[(String, String)],
        offset: Option<String>,
    ) -> Result<ListPage, RecordStoreError> {
        self.limiter.wait_if_needed().await;

        let mut request = self
            .client
            .get(url.clone())
            .bearer_auth(&self.api_key)
            .query(params);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = request.send().await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Return the response unchanged on 2xx, otherwise an
    /// [`RecordStoreError::Api`] carrying status and body.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RecordStoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RecordStoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RecordStoreError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RecordStore for AirtableClient {
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>, RecordStoreError> {
        let url = self.table_url(table, None)?;
        let params = query.to_params();
        let records = collect_pages(query.max_records, |offset| {
            self.fetch_page(&url, &params, offset)
        })
        .await?;
        tracing::debug!(table, count = records.len(), "Listed records");
        Ok(records)
    }

    async fn get(&self, table: &str, record_id: &str) -> Result<Option<Record>, RecordStoreError> {
        let url = self.table_url(table, Some(record_id))?;
        self.limiter.wait_if_needed().await;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        match Self::parse_response::<Record>(response).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, RecordStoreError> {
        let url = self.table_url(table, None)?;
        self.limiter.wait_if_needed().await;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&FieldsBody {
                fields: &fields,
                typecast: true,
            })
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<Record, RecordStoreError> {
        let url = self.table_url(table, Some(record_id))?;
        self.limiter.wait_if_needed().await;

        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.api_key)
            .json(&FieldsBody {
                fields: &fields,
                typecast: true,
            })
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn record(id: &str) -> Record {
        Record::new(id, Fields::new())
    }

    fn page(ids: &[&str], offset: Option<&str>) -> ListPage {
        ListPage {
            records: ids.iter().map(|id| record(id)).collect(),
            offset: offset.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn follows_offsets_until_exhausted() {
        let pages = Mutex::new(VecDeque::from([
            page(&["a", "b"], Some("itr1")),
            page(&["c"], Some("itr2")),
            page(&["d"], None),
        ]));
        let seen = Mutex::new(Vec::new());

        let records = collect_pages(None, |offset| {
            seen.lock().unwrap().push(offset);
            let next = pages.lock().unwrap().pop_front();
            async move { Ok(next.expect("no more pages")) }
        })
        .await
        .unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("itr1".to_string()), Some("itr2".to_string())]
        );
    }

    #[tokio::test]
    async fn max_records_stops_early() {
        let calls = Mutex::new(0);
        let records = collect_pages(Some(3), |_| {
            *calls.lock().unwrap() += 1;
            async { Ok(page(&["x", "y"], Some("more"))) }
        })
        .await
        .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn page_error_aborts_listing() {
        let result = collect_pages(None, |_| async {
            Err(RecordStoreError::Api {
                status: 422,
                body: "INVALID_FILTER_BY_FORMULA".into(),
            })
        })
        .await;
        assert_matches!(result, Err(RecordStoreError::Api { status: 422, .. }));
    }

    #[test]
    fn list_query_params() {
        let params = ListQuery::filtered("AND({Status} = 'Active')")
            .limit(50)
            .sort_by("Last_Updated", SortDirection::Desc)
            .to_params();
        assert_eq!(
            params,
            vec![
                ("filterByFormula".into(), "AND({Status} = 'Active')".into()),
                ("maxRecords".into(), "50".into()),
                ("sort[0][field]".into(), "Last_Updated".into()),
                ("sort[0][direction]".into(), "desc".into()),
            ]
        );
        assert!(ListQuery::default().to_params().is_empty());
    }

    #[test]
    fn table_url_encodes_segments() {
        let client = AirtableClient::new(&AirtableConfig::new("key", "app123"));
        let url = client.table_url("Test Runs", None).unwrap();
        assert_eq!(url.as_str(), "https://api.airtable.com/v0/app123/Test%20Runs");

        let url = client.table_url("Restorations", Some("rec42")).unwrap();
        assert_eq!(url.as_str(), "https://api.airtable.com/v0/app123/Restorations/rec42");
    }

    #[test]
    fn record_field_accessors() {
        let record: Record = serde_json::from_value(json!({
            "id": "rec1",
            "createdTime": "2025-01-01T00:00:00.000Z",
            "fields": {
                "Name": "Wedding",
                "Blank": "  ",
                "Reprocess_Request": true,
                "Priority": "7",
                "Workflow": ["recW"],
                "Single": "recX"
            }
        }))
        .unwrap();

        assert_eq!(record.str_field("Name"), Some("Wedding"));
        assert_eq!(record.str_field("Blank"), None);
        assert!(record.bool_field("Reprocess_Request"));
        assert!(!record.bool_field("Missing"));
        assert_eq!(record.i64_field("Priority"), Some(7));
        assert_eq!(record.string_list("Workflow"), vec!["recW"]);
        assert_eq!(record.string_list("Single"), vec!["recX"]);
        assert!(record.string_list("Missing").is_empty());
    }

    #[test]
    fn not_found_detection() {
        let err = RecordStoreError::Api {
            status: 404,
            body: "NOT_FOUND".into(),
        };
        assert!(err.is_not_found());
        assert!(!RecordStoreError::Schema("x".into()).is_not_found());
    }
}
