//! REST client for the remote document store
//!
//! Fetches whole collections page by page and upserts documents with a
//! field mask, so fields not written by dumpsync are left untouched.

use reqwest::{Client, Response, Url};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::StoreError;
use crate::record::Record;
use crate::store::codec::{decode_document, encode_fields};

#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    /// Collection root, e.g. `https://host/v1/projects/p/databases/(default)/documents`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure_tls: bool,
    pub timeout: Duration,
    pub page_size: usize,
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            insecure_tls: false,
            timeout: Duration::from_secs(60),
            page_size: 1000,
        }
    }
}

/// Operations the reconciliation pipeline needs from a store.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Every document in `collection`, decoded, with `_docId` set.
    async fn fetch_collection(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    /// Create or partially update document `id`, writing exactly the given
    /// fields.
    async fn upsert(&self, collection: &str, id: &str, fields: &Record) -> Result<(), StoreError>;
}

#[derive(Clone, Debug)]
pub struct StoreClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    page_size: usize,
}

impl StoreClient {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(config.base_url.clone()));
        }

        let mut builder = Client::builder().timeout(config.timeout);
        if config.insecure_tls {
            tracing::warn!("TLS certificate verification disabled for {}", config.base_url);
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            api_key: config.api_key.clone(),
            page_size: config.page_size.max(1),
        })
    }

    fn collection_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }
}

impl DocumentStore for StoreClient {
    async fn fetch_collection(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.collection_url(&[collection]);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", &self.page_size.to_string());
                if let Some(key) = &self.api_key {
                    query.append_pair("key", key);
                }
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = Self::check(self.http.get(url).send().await?).await?;
            let payload: Value = response
                .json()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()))?;

            if let Some(batch) = payload.get("documents").and_then(Value::as_array) {
                documents.extend(batch.iter().map(decode_document));
            }
            tracing::debug!("Fetched {} documents from {} so far", documents.len(), collection);

            page_token = payload
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        tracing::info!("Fetched {} documents from {}", documents.len(), collection);
        Ok(documents)
    }

    async fn upsert(&self, collection: &str, id: &str, fields: &Record) -> Result<(), StoreError> {
        let encoded = encode_fields(fields);

        let mut url = self.collection_url(&[collection, id]);
        {
            let mut query = url.query_pairs_mut();
            for name in encoded.keys() {
                query.append_pair("updateMask.fieldPaths", &field_path(name));
            }
            if let Some(key) = &self.api_key {
                query.append_pair("key", key);
            }
        }

        Self::check(
            self.http
                .patch(url)
                .json(&json!({ "fields": &encoded }))
                .send()
                .await?,
        )
        .await?;

        tracing::debug!("Upserted {}/{} ({} fields)", collection, id, encoded.len());
        Ok(())
    }
}

/// Quote a field name for use in a field mask when it is not a simple
/// identifier.
pub fn field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Pull `error.message` out of a store error body, falling back to the raw
/// body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
