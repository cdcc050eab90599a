//! HttpStore: Elasticsearch REST backend
//!
//! Speaks the document, search, delete-by-query, bulk and index-admin APIs
//! over a blocking `ureq` agent. Every call is a single round trip; nothing
//! is retried here.
//!
//! Status handling:
//! - 404 on document reads is "not found", on searches an empty result
//! - 409 is a lost conditional write (`Error::Conflict`)
//! - 400 `resource_already_exists_exception` on index creation is success
//! - any other non-2xx becomes `Error::Store { status, body }`
//!
//! Ids travel as percent-encoded path segments, so any uid reaches its own
//! document. The collection mapping keeps string fields unanalyzed, which
//! makes the `term` clauses predicates render to exact matches.

use base64::Engine;
use esorm_core::{
    BulkItem, BulkItemResult, BulkResponse, DeleteByQueryResponse, Document, DocumentStore,
    Error, Hit, IndexResponse, Query, Result, WriteMode, WriteResult, COORDINATES_FIELD,
    UID_FIELD,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default number of hits requested per search (the store's result window)
pub const DEFAULT_SEARCH_SIZE: usize = 10_000;

/// Largest response body read into memory
const MAX_RESPONSE_BYTES: u64 = 512 * 1024 * 1024;

/// Connection settings for [`HttpStore`]
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL, e.g. `http://localhost:9200`
    pub base_url: String,
    /// Global per-request timeout
    pub timeout: Duration,
    /// Optional basic-auth credentials
    pub credentials: Option<(String, String)>,
    /// Hits requested per search
    pub search_size: usize,
}

impl HttpStoreConfig {
    /// Settings for `base_url` with defaults for everything else
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpStoreConfig {
            base_url: base_url.into(),
            timeout: Duration::from_secs(3000),
            credentials: None,
            search_size: DEFAULT_SEARCH_SIZE,
        }
    }
}

/// Document store backed by an Elasticsearch cluster
pub struct HttpStore {
    agent: ureq::Agent,
    base: Url,
    authorization: Option<String>,
    search_size: usize,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize)]
struct WireIndexResponse {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version")]
    version: u64,
    result: String,
    #[serde(rename = "_seq_no", default)]
    seq_no: u64,
    #[serde(rename = "_primary_term", default)]
    primary_term: u64,
}

#[derive(Deserialize)]
struct WireHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version", default)]
    version: u64,
    #[serde(rename = "_seq_no", default)]
    seq_no: u64,
    #[serde(rename = "_primary_term", default)]
    primary_term: u64,
    #[serde(rename = "_source")]
    source: Option<Document>,
    #[serde(default)]
    found: Option<bool>,
}

#[derive(Deserialize)]
struct WireTotal {
    value: u64,
}

#[derive(Deserialize)]
struct WireHits {
    #[serde(default)]
    total: Option<WireTotal>,
    hits: Vec<WireHit>,
}

#[derive(Deserialize)]
struct WireSearchResponse {
    hits: WireHits,
}

#[derive(Deserialize)]
struct WireDeleteByQuery {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    deleted: u64,
    #[serde(default)]
    failures: Vec<Value>,
}

#[derive(Deserialize)]
struct WireBulkResponse {
    errors: bool,
    items: Vec<std::collections::HashMap<String, WireBulkItem>>,
}

#[derive(Deserialize)]
struct WireBulkItem {
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl WireHit {
    fn into_hit(self) -> Result<Hit> {
        let source = self
            .source
            .ok_or_else(|| Error::Serialization(format!("hit {} has no _source", self.id)))?;
        Ok(Hit {
            id: self.id,
            version: self.version,
            seq_no: self.seq_no,
            primary_term: self.primary_term,
            source,
        })
    }
}

// =============================================================================
// HttpStore
// =============================================================================

impl HttpStore {
    /// Build a store for the given connection settings
    ///
    /// Fails with `Config` when `base_url` is not an absolute http(s) URL.
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("invalid store URL '{}': {}", config.base_url, e)))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "store URL '{}' must be an http(s) URL",
                config.base_url
            )));
        }

        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);

        let authorization = config.credentials.map(|(user, password)| {
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", user, password));
            format!("Basic {}", token)
        });

        Ok(HttpStore {
            agent,
            base,
            authorization,
            search_size: config.search_size,
        })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path
    /// segment, plus optional query pairs
    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("store URL '{}' cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Issue a request and return `(status, body)`
    fn send(
        &self,
        method: &str,
        url: &Url,
        body: Option<(&str, Vec<u8>)>,
    ) -> Result<(u16, String)> {
        let url = url.as_str();
        debug!(target: "esorm::http", method, url, "request");

        let transport = |e: ureq::Error| Error::Transport(e.to_string());

        let mut response = match method {
            "HEAD" => self.authorized_without_body(self.agent.head(url)).call(),
            "GET" => self.authorized_without_body(self.agent.get(url)).call(),
            "PUT" => {
                let (content_type, bytes) = body.unwrap_or(("application/json", Vec::new()));
                self.authorized_with_body(self.agent.put(url))
                    .header("Content-Type", content_type)
                    .send(&bytes[..])
            }
            "POST" => {
                let (content_type, bytes) = body.unwrap_or(("application/json", Vec::new()));
                self.authorized_with_body(self.agent.post(url))
                    .header("Content-Type", content_type)
                    .send(&bytes[..])
            }
            other => return Err(Error::invalid_argument(format!("unsupported method {}", other))),
        }
        .map_err(transport)?;

        let status = response.status().as_u16();
        let text = if method == "HEAD" {
            String::new()
        } else {
            // Search pages can exceed the agent's default body limit
            response
                .body_mut()
                .with_config()
                .limit(MAX_RESPONSE_BYTES)
                .read_to_string()
                .map_err(transport)?
        };
        Ok((status, text))
    }

    fn authorized_without_body(
        &self,
        request: ureq::RequestBuilder<ureq::typestate::WithoutBody>,
    ) -> ureq::RequestBuilder<ureq::typestate::WithoutBody> {
        match &self.authorization {
            Some(auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    fn authorized_with_body(
        &self,
        request: ureq::RequestBuilder<ureq::typestate::WithBody>,
    ) -> ureq::RequestBuilder<ureq::typestate::WithBody> {
        match &self.authorization {
            Some(auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    fn send_json(&self, method: &str, url: &Url, body: &Value) -> Result<(u16, String)> {
        let bytes = serde_json::to_vec(body)?;
        self.send(method, url, Some(("application/json", bytes)))
    }

    fn search_body(&self, query: &Query) -> Value {
        let mut body = query.to_dsl();
        if let Value::Object(obj) = &mut body {
            obj.insert("size".to_string(), json!(self.search_size));
            obj.insert("version".to_string(), json!(true));
            obj.insert("seq_no_primary_term".to_string(), json!(true));
            obj.insert("track_total_hits".to_string(), json!(true));
        }
        body
    }

    fn store_error(status: u16, body: String) -> Error {
        Error::Store { status, body }
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Longest string value still indexed for exact matching
const KEYWORD_IGNORE_ABOVE: u32 = 8191;

/// Collection mapping
///
/// Strings are `keyword` everywhere, so equality predicates never match on
/// shared tokens. The meta scalars are typed and `data.coordinates` is a
/// geo point.
pub fn default_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic_templates": [{
                "strings_as_keywords": {
                    "match_mapping_type": "string",
                    "mapping": {"type": "keyword", "ignore_above": KEYWORD_IGNORE_ABOVE}
                }
            }],
            "properties": {
                "meta": {
                    "properties": {
                        "class": {"type": "keyword"},
                        "last_modified": {"type": "date"},
                        "deleted": {"type": "boolean"},
                        "version": {"type": "long"}
                    }
                },
                "data": {
                    "properties": {
                        UID_FIELD: {"type": "keyword"},
                        COORDINATES_FIELD: {"type": "geo_point"}
                    }
                }
            }
        }
    })
}

impl DocumentStore for HttpStore {
    fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        let url = self.endpoint(&[collection, "_doc", id], &[])?;
        let (status, body) = self.send("HEAD", &url, None)?;
        match status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::store_error(status, body)),
        }
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Hit>> {
        let url = self.endpoint(&[collection, "_doc", id], &[])?;
        let (status, body) = self.send("GET", &url, None)?;
        match status {
            404 => Ok(None),
            s if is_success(s) => {
                let hit: WireHit = serde_json::from_str(&body)?;
                if hit.found == Some(false) {
                    return Ok(None);
                }
                Ok(Some(hit.into_hit()?))
            }
            _ => Err(Self::store_error(status, body)),
        }
    }

    fn index(
        &self,
        collection: &str,
        document: &Document,
        mode: &WriteMode,
    ) -> Result<IndexResponse> {
        let body = document.to_value()?;
        let (method, url) = match mode {
            WriteMode::Auto => ("POST", self.endpoint(&[collection, "_doc"], &[])?),
            WriteMode::Upsert(id) => ("PUT", self.endpoint(&[collection, "_doc", id], &[])?),
            WriteMode::Create(id) => ("PUT", self.endpoint(&[collection, "_create", id], &[])?),
            WriteMode::IfMatch {
                id,
                seq_no,
                primary_term,
            } => (
                "PUT",
                self.endpoint(
                    &[collection, "_doc", id],
                    &[
                        ("if_seq_no", seq_no.to_string()),
                        ("if_primary_term", primary_term.to_string()),
                    ],
                )?,
            ),
        };

        let (status, text) = self.send_json(method, &url, &body)?;
        match status {
            409 => Err(Error::Conflict {
                collection: collection.to_string(),
                id: mode.id().unwrap_or_default().to_string(),
            }),
            // Conditional write against a missing document
            404 if matches!(mode, WriteMode::IfMatch { .. }) => Err(Error::Conflict {
                collection: collection.to_string(),
                id: mode.id().unwrap_or_default().to_string(),
            }),
            s if is_success(s) => {
                let wire: WireIndexResponse = serde_json::from_str(&text)?;
                let result = match wire.result.as_str() {
                    "created" => WriteResult::Created,
                    _ => WriteResult::Updated,
                };
                Ok(IndexResponse {
                    collection: wire.index,
                    id: wire.id,
                    version: wire.version,
                    result,
                    seq_no: wire.seq_no,
                    primary_term: wire.primary_term,
                })
            }
            _ => Err(Self::store_error(status, text)),
        }
    }

    fn search(&self, collection: &str, query: &Query) -> Result<Vec<Hit>> {
        let body = self.search_body(query);
        let url = self.endpoint(&[collection, "_search"], &[])?;
        let (status, text) = self.send_json("POST", &url, &body)?;
        match status {
            404 => Ok(Vec::new()),
            s if is_success(s) => {
                let wire: WireSearchResponse = serde_json::from_str(&text)?;
                let returned = wire.hits.hits.len();
                match wire.hits.total {
                    Some(total) if total.value > returned as u64 => {
                        Err(Error::ResultWindowExceeded {
                            collection: collection.to_string(),
                            total: total.value,
                            returned,
                        })
                    }
                    _ => wire.hits.hits.into_iter().map(WireHit::into_hit).collect(),
                }
            }
            _ => Err(Self::store_error(status, text)),
        }
    }

    fn delete_by_query(&self, collection: &str, query: &Query) -> Result<DeleteByQueryResponse> {
        let body = query.to_dsl();
        let url = self.endpoint(
            &[collection, "_delete_by_query"],
            &[("refresh", "true".to_string())],
        )?;
        let (status, text) = self.send_json("POST", &url, &body)?;
        match status {
            404 => Ok(DeleteByQueryResponse::default()),
            s if is_success(s) => {
                let wire: WireDeleteByQuery = serde_json::from_str(&text)?;
                Ok(DeleteByQueryResponse {
                    total: wire.total,
                    deleted: wire.deleted,
                    failures: wire.failures.iter().map(Value::to_string).collect(),
                })
            }
            _ => Err(Self::store_error(status, text)),
        }
    }

    fn bulk(&self, collection: &str, items: &[BulkItem]) -> Result<BulkResponse> {
        let mut ndjson = Vec::new();
        for item in items {
            let action = match &item.id {
                Some(id) => json!({"index": {"_index": collection, "_id": id}}),
                None => json!({"index": {"_index": collection}}),
            };
            serde_json::to_writer(&mut ndjson, &action)?;
            ndjson.push(b'\n');
            serde_json::to_writer(&mut ndjson, &item.document)?;
            ndjson.push(b'\n');
        }

        let url = self.endpoint(&["_bulk"], &[])?;
        let (status, text) = self.send("POST", &url, Some(("application/x-ndjson", ndjson)))?;
        if !is_success(status) {
            return Err(Self::store_error(status, text));
        }

        let wire: WireBulkResponse = serde_json::from_str(&text)?;
        let items = wire
            .items
            .into_iter()
            .filter_map(|mut entry| entry.remove("index"))
            .map(|item| BulkItemResult {
                id: item.id,
                status: item.status,
                error: item.error.map(|e| e.to_string()),
            })
            .collect();
        Ok(BulkResponse {
            errors: wire.errors,
            items,
        })
    }

    fn refresh(&self, collection: &str) -> Result<()> {
        let url = self.endpoint(&[collection, "_refresh"], &[])?;
        let (status, text) = self.send("POST", &url, None)?;
        if is_success(status) || status == 404 {
            Ok(())
        } else {
            Err(Self::store_error(status, text))
        }
    }

    fn ensure_mapping(&self, collection: &str) -> Result<()> {
        let url = self.endpoint(&[collection], &[])?;
        let (status, text) = self.send_json("PUT", &url, &default_mapping())?;
        if is_success(status)
            || (status == 400 && text.contains("resource_already_exists_exception"))
        {
            Ok(())
        } else {
            Err(Self::store_error(status, text))
        }
    }
}
