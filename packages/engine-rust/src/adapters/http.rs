//! REST adapter for a CRM-style object API.
//!
//! Bulk calls go to `POST {base}/crm/v3/objects/{type}/batch/{create|update|archive}`
//! with an `{"inputs": [...]}` body. Single-item calls use
//! `POST {base}/crm/v3/objects/{type}` and `PATCH`/`DELETE` on `.../{type}/{id}`.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use batchwise_core::{
    Action, ItemError, ItemOutcome, Payload, RemoteRecord, RemoteStore, StoreError,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

const MISSING_ID: &str = "missing object id";
const MISSING_RESULT: &str = "missing result for item";

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL without trailing slash, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Transport-level timeout; the call pipeline enforces its own as well.
    pub request_timeout_ms: u64,
    /// Concurrent request budget advertised to the engine.
    pub max_concurrent_requests: usize,
}

impl HttpStoreConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            request_timeout_ms: 30_000,
            max_concurrent_requests: 1,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<RemoteRecord>,
    #[serde(default)]
    errors: Vec<BatchItemError>,
}

#[derive(Debug, Deserialize)]
struct BatchItemError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    context: Map<String, Value>,
}

impl BatchItemError {
    /// Input positions this error refers to.
    fn positions(&self, items: &[Payload]) -> Vec<usize> {
        if let Some(index) = self.index {
            return vec![index];
        }

        let mut positions: Vec<usize> = self
            .context
            .get("index")
            .map(context_values)
            .unwrap_or_default()
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect();

        if let Some(ids) = self.context.get("ids").map(context_values) {
            positions.extend(items.iter().enumerate().filter_map(|(i, item)| {
                item.remote_id
                    .as_ref()
                    .filter(|id| ids.contains(id))
                    .map(|_| i)
            }));
        }
        positions
    }
}

/// Context values arrive as a scalar or an array of strings or numbers.
fn context_values(value: &Value) -> Vec<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match value {
        Value::Array(values) => values.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}

/// Extract a human-readable message from an error body.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.to_string())
}

/// Map a non-success status to a call-level error.
fn status_error(status: StatusCode, body: &str) -> StoreError {
    let message = error_message(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => StoreError::Transport(format!("rate limited: {message}")),
        s if s.is_server_error() => StoreError::Transport(format!("{s}: {message}")),
        _ => StoreError::Rejected(message),
    }
}

/// Whether a single-item failure belongs to the item rather than the call.
fn is_item_status(status: StatusCode) -> bool {
    status.is_client_error()
        && !matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
        )
}

/// Whether `record` carries every property `item` asked for.
///
/// The store returns property values as strings, so values compare by text.
fn echoes(record: &RemoteRecord, item: &Payload) -> bool {
    let text = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    item.properties.iter().all(|(name, value)| {
        record
            .properties
            .get(name)
            .is_some_and(|returned| text(returned) == text(value))
    })
}

/// Spread a batch response over index-aligned outcome slots.
///
/// Errors land on the positions they name. Remaining slots are filled by
/// returned `id` for update/delete. Creates fill positionally unless some
/// error named no position; then records are matched by their properties and
/// anything left takes that error.
fn demultiplex(action: Action, items: &[Payload], response: BatchResponse) -> Vec<ItemOutcome> {
    let mut slots: Vec<Option<ItemOutcome>> = vec![None; items.len()];
    let mut unplaced_error = None;

    for error in &response.errors {
        let positions = error.positions(items);
        let mut placed = false;
        for i in positions {
            match slots.get_mut(i) {
                Some(slot) if slot.is_none() => {
                    *slot = Some(Err(ItemError::new(error.message.clone())));
                    placed = true;
                }
                _ => {}
            }
        }
        if !placed && unplaced_error.is_none() {
            unplaced_error = Some(error.message.clone());
        }
    }

    let no_results = response.results.is_empty();
    match action {
        // With an error we could not place, positions no longer line up with
        // results; only records that echo exactly one open item are kept.
        Action::Create if unplaced_error.is_some() => {
            for record in response.results {
                let mut open = items
                    .iter()
                    .enumerate()
                    .filter(|(i, item)| slots[*i].is_none() && echoes(&record, item));
                if let (Some((i, _)), None) = (open.next(), open.next()) {
                    slots[i] = Some(Ok(record));
                }
            }
        }
        Action::Create => {
            let mut results = response.results.into_iter();
            for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
                match results.next() {
                    Some(record) => *slot = Some(Ok(record)),
                    None => break,
                }
            }
        }
        Action::Update | Action::Delete => {
            for record in response.results {
                let position = items.iter().enumerate().position(|(i, item)| {
                    slots[i].is_none() && item.remote_id.as_deref() == Some(record.id.as_str())
                });
                if let Some(i) = position {
                    slots[i] = Some(Ok(record));
                }
            }
        }
    }

    // Archive answers 204 with no body: every item not named by an error succeeded.
    if action == Action::Delete && no_results && unplaced_error.is_none() {
        for (slot, item) in slots.iter_mut().zip(items) {
            if slot.is_none() {
                if let Some(id) = &item.remote_id {
                    *slot = Some(Ok(RemoteRecord::new(id.clone())));
                }
            }
        }
    }

    let fallback = unplaced_error.unwrap_or_else(|| MISSING_RESULT.to_string());
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(ItemError::new(fallback.clone()))))
        .collect()
}

fn bulk_input(action: Action, item: &Payload) -> Value {
    match action {
        Action::Create => json!({ "properties": item.properties }),
        Action::Update => json!({ "id": item.remote_id, "properties": item.properties }),
        Action::Delete => json!({ "id": item.remote_id }),
    }
}

fn batch_verb(action: Action) -> &'static str {
    match action {
        Action::Create => "create",
        Action::Update => "update",
        Action::Delete => "archive",
    }
}

/// [`RemoteStore`] backed by a CRM-style REST API.
pub struct HttpStore {
    client: reqwest::Client,
    config: HttpStoreConfig,
}

impl HttpStore {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: HttpStoreConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn objects_url(&self, target_type: &str) -> String {
        format!("{}/crm/v3/objects/{target_type}", self.config.base_url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn transport_error(&self, err: &reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout {
                timeout_ms: self.config.request_timeout_ms,
            }
        } else {
            StoreError::Transport(err.to_string())
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String), StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;
        Ok((status, body))
    }

    async fn bulk(
        &self,
        action: Action,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        let url = format!(
            "{}/batch/{}",
            self.objects_url(target_type),
            batch_verb(action)
        );
        let inputs: Vec<Value> = items.iter().map(|item| bulk_input(action, item)).collect();
        let (status, body) = self
            .send(self.request(Method::POST, &url).json(&json!({ "inputs": inputs })))
            .await?;

        debug!(%status, target_type, action = action.as_str(), items = items.len(), "batch response");

        // 207 Multi-Status carries per-item errors in the body.
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let response = if body.trim().is_empty() {
            BatchResponse::default()
        } else {
            serde_json::from_str(&body)
                .map_err(|e| StoreError::Transport(format!("malformed batch response: {e}")))?
        };
        Ok(demultiplex(action, items, response))
    }

    async fn single(
        &self,
        action: Action,
        target_type: &str,
        item: &Payload,
    ) -> Result<ItemOutcome, StoreError> {
        let request = match (action, item.remote_id.as_deref()) {
            (Action::Create, _) => self
                .request(Method::POST, &self.objects_url(target_type))
                .json(&json!({ "properties": item.properties })),
            (Action::Update, Some(id)) => self
                .request(Method::PATCH, &format!("{}/{id}", self.objects_url(target_type)))
                .json(&json!({ "properties": item.properties })),
            (Action::Delete, Some(id)) => {
                self.request(Method::DELETE, &format!("{}/{id}", self.objects_url(target_type)))
            }
            (Action::Update | Action::Delete, None) => return Ok(Err(ItemError::new(MISSING_ID))),
        };

        let (status, body) = self.send(request).await?;
        if is_item_status(status) {
            return Ok(Err(ItemError::new(error_message(status, &body))));
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        match (action, item.remote_id.as_deref()) {
            (Action::Delete, Some(id)) => Ok(Ok(RemoteRecord::new(id))),
            _ => serde_json::from_str(&body)
                .map(Ok)
                .map_err(|e| StoreError::Transport(format!("malformed response: {e}"))),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn create_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        self.bulk(Action::Create, target_type, items).await
    }

    async fn update_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        self.bulk(Action::Update, target_type, items).await
    }

    async fn delete_many(
        &self,
        target_type: &str,
        items: &[Payload],
    ) -> Result<Vec<ItemOutcome>, StoreError> {
        self.bulk(Action::Delete, target_type, items).await
    }

    async fn create_one(
        &self,
        target_type: &str,
        item: &Payload,
    ) -> Result<ItemOutcome, StoreError> {
        self.single(Action::Create, target_type, item).await
    }

    async fn update_one(
        &self,
        target_type: &str,
        item: &Payload,
    ) -> Result<ItemOutcome, StoreError> {
        self.single(Action::Update, target_type, item).await
    }

    async fn delete_one(
        &self,
        target_type: &str,
        item: &Payload,
    ) -> Result<ItemOutcome, StoreError> {
        self.single(Action::Delete, target_type, item).await
    }

    fn max_concurrent_requests(&self) -> usize {
        self.config.max_concurrent_requests.max(1)
    }
}
