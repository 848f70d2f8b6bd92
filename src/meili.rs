//! Meilisearch adapter for the [`VectorIndex`] contract.
//!
//! Talks to the Meilisearch REST API with `reqwest`. Vectors are stored
//! under `_vectors.{embedder}` with a `userProvided` embedder, and
//! neighbor search is a hybrid query with `semanticRatio = 1.0`.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create-or-get | `GET /indexes/{uid}`, then `POST /indexes` when missing |
//! | delete | `DELETE /indexes/{uid}` |
//! | settings | `GET` / `PATCH /indexes/{uid}/settings` |
//! | upsert | `POST /indexes/{uid}/documents` |
//! | fetch page | `GET /indexes/{uid}/documents?offset&limit&fields` |
//! | search | `POST /indexes/{uid}/search` |
//!
//! Write operations are asynchronous tasks; with `wait` the adapter polls
//! `GET /tasks/{taskUid}` until the task finishes or the configured timeout
//! elapses.
//!
//! # Error mapping
//!
//! - network failures, 5xx, undecodable bodies, failed tasks → `IndexUnavailable`
//! - `code == "index_not_found"` (response or failed task) → `IndexNotFound`

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

use semdedup_core::index::{IndexSettings, SettingsOutcome, VectorIndex};
use semdedup_core::models::{DocumentPayload, IndexedDocument};
use semdedup_core::{Error, Result};

use crate::config::IndexConfig;

const POLL_START: Duration = Duration::from_millis(50);
const POLL_MAX: Duration = Duration::from_secs(1);

/// A Meilisearch index handle.
pub struct MeiliIndex {
    client: reqwest::Client,
    base: String,
    uid: String,
    api_key: Option<String>,
    task_timeout: Duration,
}

impl MeiliIndex {
    pub fn new(config: &IndexConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.task_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base: config.url.trim_end_matches('/').to_string(),
            uid: config.uid.clone(),
            api_key: config.resolved_api_key(),
            task_timeout: Duration::from_secs(config.task_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    /// Send a request and decode the JSON body, mapping failures.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| {
                Error::IndexUnavailable(format!("request to {} failed: {}", self.base, e))
            })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::IndexUnavailable(format!("reading response failed: {}", e)))?;

        if !status.is_success() {
            return Err(api_error(&self.uid, status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::IndexUnavailable(format!("undecodable response: {}", e)))
    }

    /// Send a task-producing request and, with `wait`, block until it ends.
    async fn enqueue(&self, builder: reqwest::RequestBuilder, wait: bool) -> Result<()> {
        let body = self.send(builder).await?;
        if !wait {
            return Ok(());
        }
        let task_uid = body
            .get("taskUid")
            .or_else(|| body.get("uid"))
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::IndexUnavailable("response carries no task uid".to_string()))?;
        self.wait_for_task(task_uid).await
    }

    async fn wait_for_task(&self, task_uid: u64) -> Result<()> {
        let started = Instant::now();
        let mut delay = POLL_START;
        loop {
            let task = self
                .send(self.client.get(self.url(&format!("/tasks/{}", task_uid))))
                .await?;
            match task.get("status").and_then(Value::as_str) {
                Some("succeeded") => return Ok(()),
                Some("failed") => return Err(task_error(&self.uid, &task)),
                Some("canceled") => {
                    return Err(Error::IndexUnavailable(format!("task {} was canceled", task_uid)))
                }
                _ => {}
            }
            if started.elapsed() >= self.task_timeout {
                return Err(Error::IndexUnavailable(format!(
                    "task {} did not finish within {}s",
                    task_uid,
                    self.task_timeout.as_secs()
                )));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(POLL_MAX);
        }
    }
}

#[async_trait]
impl VectorIndex for MeiliIndex {
    fn uid(&self) -> &str {
        &self.uid
    }

    async fn create_or_get(&self) -> Result<()> {
        match self
            .send(self.client.get(self.url(&format!("/indexes/{}", self.uid))))
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!(uid = %self.uid, "index missing; creating");
            }
            Err(e) => return Err(e),
        }

        let create = self
            .client
            .post(self.url("/indexes"))
            .json(&json!({"uid": self.uid, "primaryKey": "id"}));
        match self.enqueue(create, true).await {
            Ok(()) => Ok(()),
            // Lost a creation race; the index is there either way.
            Err(Error::IndexUnavailable(msg)) if msg.contains("index_already_exists") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self) -> Result<()> {
        let request = self.client.delete(self.url(&format!("/indexes/{}", self.uid)));
        self.enqueue(request, true).await
    }

    async fn ensure_settings(&self, desired: &IndexSettings) -> Result<SettingsOutcome> {
        let path = format!("/indexes/{}/settings", self.uid);
        let current = match self.send(self.client.get(self.url(&path))).await {
            Ok(value) => value,
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => return Ok(SettingsOutcome::Unsupported(format!("reading settings: {e}"))),
        };

        let (patch, fields) = settings_delta(&current, desired);
        if fields.is_empty() {
            return Ok(SettingsOutcome::Unchanged);
        }
        let request = self.client.patch(self.url(&path)).json(&Value::Object(patch));
        match self.enqueue(request, true).await {
            Ok(()) => Ok(SettingsOutcome::Updated(fields)),
            Err(e) => Ok(SettingsOutcome::Unsupported(format!("updating settings: {e}"))),
        }
    }

    async fn upsert_batch(
        &self,
        docs: &[IndexedDocument],
        embedder: &str,
        wait: bool,
    ) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let body: Vec<Value> = docs.iter().map(|d| document_json(d, embedder)).collect();
        let request = self
            .client
            .post(self.url(&format!("/indexes/{}/documents?primaryKey=id", self.uid)))
            .json(&body);
        self.enqueue(request, wait).await
    }

    async fn fetch_page(
        &self,
        fields: &[&str],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DocumentPayload>> {
        let mut query: Vec<(&str, String)> =
            vec![("offset", offset.to_string()), ("limit", limit.to_string())];
        if !fields.is_empty() {
            query.push(("fields", fields.join(",")));
        }
        let request = self
            .client
            .get(self.url(&format!("/indexes/{}/documents", self.uid)))
            .query(&query);
        let body = self.send(request).await?;
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::IndexUnavailable("document page has no results array".into()))?;
        Ok(results.iter().map(payload_from_json).collect())
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        limit: usize,
        embedder: &str,
    ) -> Result<Vec<DocumentPayload>> {
        let body = json!({
            "vector": vector,
            "hybrid": {"semanticRatio": 1.0, "embedder": embedder},
            "limit": limit,
        });
        let request = self
            .client
            .post(self.url(&format!("/indexes/{}/search", self.uid)))
            .json(&body);
        let response = self.send(request).await?;
        let hits = response
            .get("hits")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedNeighbor("search response has no hits array".into()))?;
        Ok(hits.iter().map(payload_from_json).collect())
    }
}

// ============ Wire helpers ============

/// Map an error response to the core taxonomy.
fn api_error(uid: &str, status: u16, body: &str) -> Error {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = parsed.get("code").and_then(Value::as_str).unwrap_or("");
    let message = parsed
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(body);
    if code == "index_not_found" {
        return Error::IndexNotFound(uid.to_string());
    }
    Error::IndexUnavailable(format!("HTTP {} {}: {}", status, code, message))
}

/// Map a failed task to the core taxonomy.
fn task_error(uid: &str, task: &Value) -> Error {
    let error = task.get("error");
    let code = error
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("task failed");
    if code == "index_not_found" {
        return Error::IndexNotFound(uid.to_string());
    }
    Error::IndexUnavailable(format!("task failed ({}): {}", code, message))
}

/// Settings that differ from `current`, and the names of the changed keys.
///
/// Only the configured embedder is sent; Meilisearch merges embedder
/// entries, so other embedders on the index are kept.
fn settings_delta(current: &Value, desired: &IndexSettings) -> (Map<String, Value>, Vec<String>) {
    let mut patch = Map::new();
    let mut fields = Vec::new();

    let existing = current
        .get("embedders")
        .and_then(|e| e.get(&desired.embedder));
    let matches = existing
        .map(|e| {
            e.get("source").and_then(Value::as_str) == Some("userProvided")
                && e.get("dimensions").and_then(Value::as_u64) == Some(desired.dimensions as u64)
        })
        .unwrap_or(false);
    if !matches {
        let mut embedders = Map::new();
        embedders.insert(
            desired.embedder.clone(),
            json!({"source": "userProvided", "dimensions": desired.dimensions}),
        );
        patch.insert("embedders".to_string(), Value::Object(embedders));
        fields.push("embedders".to_string());
    }

    for (key, wanted) in [
        ("searchableAttributes", &desired.searchable),
        ("displayedAttributes", &desired.displayed),
    ] {
        let have: Option<Vec<&str>> = current
            .get(key)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect());
        let same = have
            .map(|h| h.len() == wanted.len() && h.iter().zip(wanted).all(|(a, b)| *a == b.as_str()))
            .unwrap_or(false);
        if !same {
            patch.insert(key.to_string(), json!(wanted));
            fields.push(key.to_string());
        }
    }

    (patch, fields)
}

fn document_json(doc: &IndexedDocument, embedder: &str) -> Value {
    let mut obj = Map::new();
    obj.insert("id".into(), json!(doc.id));
    obj.insert("name".into(), json!(doc.record.name));
    if let Some(path) = &doc.record.path {
        obj.insert("path".into(), json!(path));
    }
    if let Some(ctime) = doc.record.ctime {
        obj.insert("ctime".into(), json!(ctime));
    }
    if let Some(mtime) = doc.record.mtime {
        obj.insert("mtime".into(), json!(mtime));
    }
    if let Some(size) = doc.record.size {
        obj.insert("size".into(), json!(size));
    }
    let mut vectors = Map::new();
    vectors.insert(embedder.to_string(), json!(doc.vector));
    obj.insert("_vectors".into(), Value::Object(vectors));
    Value::Object(obj)
}

/// Decode a stored document or hit. Ids must be non-negative integers
/// (or strings holding one); anything else becomes `None`.
fn payload_from_json(value: &Value) -> DocumentPayload {
    let id = match value.get("id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    DocumentPayload {
        id,
        name: value.get("name").and_then(Value::as_str).map(str::to_string),
        path: value.get("path").and_then(Value::as_str).map(str::to_string),
        ctime: value.get("ctime").and_then(Value::as_f64),
        mtime: value.get("mtime").and_then(Value::as_f64),
        size: value.get("size").and_then(Value::as_u64),
    }
}
