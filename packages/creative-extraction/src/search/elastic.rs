//! Elasticsearch-compatible search index over HTTP.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SinkError, SinkResult};
use crate::search::mapping::index_mapping;
use crate::security::SecretString;
use crate::traits::resource::RunResource;
use crate::traits::search::SearchIndex;
use crate::types::creative::MediaType;
use crate::types::document::{BulkFailure, BulkReport, SearchDocument};

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct DeleteByQueryResponse {
    #[serde(default)]
    deleted: u64,
}

/// Client for an Elasticsearch-compatible cluster.
pub struct ElasticsearchIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    request_timeout: Duration,
}

impl ElasticsearchIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Authenticate with `Authorization: ApiKey <key>`.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key));
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Deadline for index management calls. Bulk writes are bounded by the
    /// sink instead.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header(
                reqwest::header::AUTHORIZATION,
                format!("ApiKey {}", key.expose()),
            ),
            None => builder,
        }
    }
}

async fn status_error(target: &str, response: reqwest::Response) -> SinkError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SinkError::Status {
        target: target.to_string(),
        status,
        body,
    }
}

fn bulk_body(index: &str, documents: &[SearchDocument]) -> SinkResult<String> {
    let mut body = String::new();
    for doc in documents {
        let action = json!({"index": {"_index": index, "_id": doc.id}});
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(
            &serde_json::to_string(&doc.body).map_err(|e| SinkError::Malformed(e.to_string()))?,
        );
        body.push('\n');
    }
    Ok(body)
}

fn bulk_report(response: BulkResponse, sent: usize) -> BulkReport {
    if !response.errors {
        return BulkReport::all_succeeded(sent);
    }

    let mut report = BulkReport::default();
    for item in response.items.into_iter().flat_map(HashMap::into_values) {
        match item.error {
            Some(error) if item.status >= 300 || item.status == 0 => {
                report.failures.push(BulkFailure {
                    id: item.id.unwrap_or_default(),
                    reason: error
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string()),
                });
            }
            _ => report.succeeded += 1,
        }
    }
    report
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn ensure_index(&self, index: &str, media_type: MediaType) -> SinkResult<()> {
        let response = self
            .request(reqwest::Method::HEAD, index)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if response.status().is_success() {
            debug!(index = %index, "search index exists");
            return Ok(());
        }
        if response.status().as_u16() != 404 {
            return Err(status_error(index, response).await);
        }

        let response = self
            .request(reqwest::Method::PUT, index)
            .timeout(self.request_timeout)
            .json(&index_mapping(media_type))
            .send()
            .await?;

        if response.status().is_success() {
            info!(index = %index, media_type = %media_type, "created search index");
            return Ok(());
        }

        let error = status_error(index, response).await;
        // Lost a creation race with another writer
        if let SinkError::Status { status: 400, body, .. } = &error {
            if body.contains("resource_already_exists_exception") {
                return Ok(());
            }
        }
        Err(error)
    }

    async fn bulk_index(&self, index: &str, documents: &[SearchDocument]) -> SinkResult<BulkReport> {
        if documents.is_empty() {
            return Ok(BulkReport::default());
        }

        let body = bulk_body(index, documents)?;
        let response = self
            .request(reqwest::Method::POST, "_bulk?refresh=true")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(index, response).await);
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Malformed(e.to_string()))?;
        let report = bulk_report(parsed, documents.len());

        for failure in &report.failures {
            warn!(index = %index, id = %failure.id, reason = %failure.reason, "bulk item failed");
        }
        Ok(report)
    }

    async fn delete_for_page(&self, index: &str, page_id: &str) -> SinkResult<u64> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("{index}/_delete_by_query?refresh=true&conflicts=proceed"),
            )
            .timeout(self.request_timeout)
            .json(&json!({"query": {"term": {"page_id": page_id}}}))
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(status_error(index, response).await);
        }

        let parsed: DeleteByQueryResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Malformed(e.to_string()))?;
        Ok(parsed.deleted)
    }
}

#[async_trait]
impl RunResource for ElasticsearchIndex {
    fn name(&self) -> &str {
        "search-index"
    }

    async fn release(&self) {
        // reqwest pools close when the client drops; nothing is held server-side
        debug!(base_url = %self.base_url, "search index client released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_body_is_ndjson() {
        let docs = vec![
            SearchDocument {
                id: "a".into(),
                body: json!({"page_id": "p"}),
            },
            SearchDocument {
                id: "b".into(),
                body: json!({"page_id": "p"}),
            },
        ];
        let body = bulk_body("image_idx", &docs).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "image_idx");
        assert_eq!(action["index"]["_id"], "a");
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_bulk_report_collects_item_errors() {
        let response: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                {"index": {"_id": "a", "status": 201}},
                {"index": {"_id": "b", "status": 400, "error": {"type": "mapper_parsing_exception", "reason": "bad date"}}}
            ]
        }))
        .unwrap();

        let report = bulk_report(response, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures, vec![BulkFailure { id: "b".into(), reason: "bad date".into() }]);
    }
}
