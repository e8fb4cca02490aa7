//! REST adapter for the remote document store.
//!
//! `GET {base_url}/{id}` reads a document, `PATCH {base_url}/{id}` with a JSON
//! object body shallow-merges top-level fields. Responses are either a
//! `{ "id", "attributes" }` envelope or the bare attribute object.

use std::time::Duration;

use reqwest::Url;
use serde_json::{Map, Value};

use crate::{
    config::StoreConfig,
    document_store::{Document, DocumentStore},
    Error, Result,
};

#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpDocumentStore {
    /// Build a client for `base_url` with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a non-http(s) URL or when the
    /// HTTP client cannot be constructed.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::InvalidConfig(format!("store base_url '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "store base_url must be http or https, got '{base_url}'"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: parsed,
            token,
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `store.base_url` is missing.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("store.base_url is not set".to_string()))?;
        Self::new(
            base_url,
            config.token.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// `{base_url}/{id}` with `id` escaped as a single path segment.
    pub fn document_url(&self, id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidConfig(format!("cannot append to '{}'", self.base_url)))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, id: &str, request: reqwest::RequestBuilder) -> Result<Document> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Error::RemoteStore(format!("request for '{id}' failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("document '{id}'")));
        }
        if !status.is_success() {
            return Err(Error::RemoteStore(format!(
                "store answered {status} for '{id}'"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::RemoteStore(format!("unreadable body for '{id}': {e}")))?;
        document_from_body(id, body)
    }
}

#[async_trait::async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn show(&self, id: &str) -> Result<Document> {
        tracing::trace!(id, "GET document");
        self.send(id, self.client.get(self.document_url(id)?)).await
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<Document> {
        tracing::trace!(id, fields = fields.len(), "PATCH document");
        self.send(id, self.client.patch(self.document_url(id)?).json(&fields))
            .await
    }
}

fn document_from_body(id: &str, body: Value) -> Result<Document> {
    let Value::Object(mut object) = body else {
        return Err(Error::MalformedDocument(format!(
            "document '{id}' is not a JSON object"
        )));
    };
    match object.remove("attributes") {
        Some(Value::Object(attributes)) => {
            let id = object
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(id)
                .to_string();
            Ok(Document::new(id, attributes))
        }
        Some(other) => {
            object.insert("attributes".to_string(), other);
            Ok(Document::new(id, object))
        }
        None => Ok(Document::new(id, object)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use serde_json::json;

    use super::*;

    #[test]
    fn document_url_joins_and_escapes() {
        let store =
            HttpDocumentStore::new("https://api.example.com/docs/", None, Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            store.document_url("p1").unwrap().as_str(),
            "https://api.example.com/docs/p1"
        );
        assert_eq!(
            store.document_url("a b/c?d#e").unwrap().as_str(),
            "https://api.example.com/docs/a%20b%2Fc%3Fd%23e"
        );
        assert_eq!(
            store.document_url("../p1").unwrap().as_str(),
            "https://api.example.com/docs/..%2Fp1"
        );
    }

    #[test]
    fn document_url_on_a_bare_host() {
        let store =
            HttpDocumentStore::new("http://store.local", None, Duration::from_secs(1)).unwrap();
        assert_eq!(store.document_url("o1").unwrap().as_str(), "http://store.local/o1");
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let err = HttpDocumentStore::new("ftp://host", None, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
        let err = HttpDocumentStore::new("not a url", None, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn from_config_requires_base_url() {
        assert!(HttpDocumentStore::from_config(&StoreConfig::default()).is_err());
    }

    #[test]
    fn envelope_and_bare_bodies_both_parse() {
        let doc = document_from_body(
            "p1",
            json!({ "id": "p1", "attributes": { "orderDetail": {} } }),
        )
        .unwrap();
        assert_eq!(doc.attributes["orderDetail"], json!({}));

        let doc = document_from_body("o1", json!({ "participants": ["u1"] })).unwrap();
        assert_eq!(doc.id, "o1");
        assert_eq!(doc.attributes["participants"], json!(["u1"]));

        assert!(document_from_body("x", json!([1])).is_err());
    }
}
