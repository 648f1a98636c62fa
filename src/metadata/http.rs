// src/metadata/http.rs

//! Metadata store backed by an HTTP key/value endpoint.
//!
//! Reads: `<method> <url>?key=<key>` returning the raw value in the body.
//! Writes: `POST <url>` with a JSON `{"key": …, "value": …}` payload.
//! Deletes: `DELETE <url>?key=<key>`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use crate::config::MetadataConfig;
use crate::errors::{Error, Result};
use crate::metadata::MetadataStore;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct HttpMetadataStore {
    url: String,
    read_method: Method,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl HttpMetadataStore {
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let url = config
            .data
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::ConfigError("http metadata store requires url".to_string()))?
            .to_string();

        let read_method = match config.data.get("method").and_then(|v| v.as_str()) {
            Some(m) if !m.is_empty() => Method::from_bytes(m.as_bytes())
                .map_err(|_| Error::ConfigError(format!("invalid http method `{m}`")))?,
            _ => Method::GET,
        };

        let mut headers = HashMap::new();
        if let Some(serde_json::Value::Object(map)) = config.data.get("headers") {
            for (k, v) in map {
                if let Some(s) = v.as_str() {
                    headers.insert(k.clone(), s.to_string());
                }
            }
        }

        let timeout = config
            .data
            .get("timeout")
            .and_then(|v| v.as_str())
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_TIMEOUT);

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            url,
            read_method,
            headers,
            client,
        })
    }

    fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (k, v) in &self.headers {
            request = request.header(k, v);
        }
        request
    }
}

#[async_trait]
impl MetadataStore for HttpMetadataStore {
    async fn get(&self, key: &str) -> Result<String> {
        let request = self
            .client
            .request(self.read_method.clone(), &self.url)
            .query(&[("key", key)]);
        let response = self.apply_headers(request).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::MetadataKeyNotFound(key.to_string()));
        }
        let response = response.error_for_status()?;

        Ok(response.text().await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let request = self
            .client
            .post(&self.url)
            .json(&json!({ "key": key, "value": value }));
        self.apply_headers(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let request = self.client.delete(&self.url).query(&[("key", key)]);
        self.apply_headers(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Duration strings of the form `500ms`, `30s`, `5m`, `2h`.
fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let value: u64 = text[..split].parse().ok()?;
    match &text[split..] {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}
