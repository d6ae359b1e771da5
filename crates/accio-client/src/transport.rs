//! HTTP transport to the gateway.
//!
//! Every request attaches the bearer token held by the [`TokenStore`] (subject
//! to the [`Credentials`] policy) and decodes the response leniently: any 2xx
//! without a usable JSON body resolves to an empty object, anything else is a
//! [`ClientError::Http`] carrying the status.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::pending::Pending;

/// When to attach the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credentials {
    /// Only for URLs on the configured gateway.
    #[default]
    SameOrigin,
    Include,
    Omit,
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Merged over `Content-Type: application/json`; later entries win.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub credentials: Credentials,
    /// Return the raw body instead of decoding JSON.
    pub blob: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: vec![],
            body: None,
            credentials: Credentials::SameOrigin,
            blob: false,
        }
    }
}

impl RequestOptions {
    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_string(body)?);
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn blob(mut self) -> Self {
        self.blob = true;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut merged = BTreeMap::new();
        merged.insert("content-type".to_string(), "application/json".to_string());
        for (name, value) in &self.headers {
            merged.insert(name.to_ascii_lowercase(), value.clone());
        }
        let mut map = HeaderMap::new();
        for (name, value) in merged {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidUrl(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ClientError::InvalidUrl(format!("header value {value}: {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Blob(Vec<u8>),
}

impl Payload {
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Payload::Json(value) => Ok(serde_json::from_value(value)?),
            Payload::Blob(bytes) => Ok(serde_json::from_slice(&bytes)?),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Json(value) => value.to_string().into_bytes(),
            Payload::Blob(bytes) => bytes,
        }
    }
}

/// Handle to the gateway. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base: Url,
    tokens: TokenStore,
    per_page: u32,
}

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut base = Url::parse(&config.server)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", config.server)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base,
            tokens: TokenStore::new(&config.token_path),
            per_page: config.per_page,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Jobs requested per page.
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Resolves `path` against the gateway; absolute URLs pass through.
    pub fn url(&self, path: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(path) {
            return Ok(url);
        }
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    fn same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base.origin()
    }

    /// Issues a request. The token is read when the request is built.
    pub fn xhr(&self, path: &str, options: RequestOptions) -> Pending<Payload> {
        let url = match self.url(path) {
            Ok(url) => url,
            Err(e) => return Pending::ready(Err(e)),
        };
        let mut headers = match options.header_map() {
            Ok(headers) => headers,
            Err(e) => return Pending::ready(Err(e)),
        };
        let attach = match options.credentials {
            Credentials::Include => true,
            Credentials::SameOrigin => self.same_origin(&url),
            Credentials::Omit => false,
        };
        if attach {
            if let Some(token) = self.tokens.load() {
                if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                    headers.insert(AUTHORIZATION, value);
                }
            }
        }

        let mut request = self.http.request(options.method.clone(), url.clone()).headers(headers);
        if let Some(body) = options.body {
            request = request.body(body);
        }
        let method = options.method;
        let blob = options.blob;
        debug!(%method, %url, "request");

        Pending::spawn(async move {
            let outcome = execute(request, blob).await;
            if let Err(e) = &outcome {
                warn!(%method, %url, error = %e, "request failed");
            }
            outcome
        })
    }

    pub fn get_json<T>(&self, path: &str) -> Pending<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.xhr(path, RequestOptions::default())
            .then_try(Payload::decode)
    }

    pub fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Pending<T>
    where
        B: Serialize,
        T: DeserializeOwned + Send + 'static,
    {
        match RequestOptions::method(method).json(body) {
            Ok(options) => self.xhr(path, options).then_try(Payload::decode),
            Err(e) => Pending::ready(Err(e)),
        }
    }
}

async fn execute(request: reqwest::RequestBuilder, blob: bool) -> Result<Payload> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Http {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("Unknown").to_string(),
        });
    }
    let bytes = response.bytes().await?;
    if blob {
        return Ok(Payload::Blob(bytes.to_vec()));
    }
    if status == StatusCode::NO_CONTENT || bytes.is_empty() {
        return Ok(Payload::Json(json!({})));
    }
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Payload::Json(value)),
        Err(e) => {
            debug!(error = %e, "response body is not JSON");
            Ok(Payload::Json(json!({})))
        }
    }
}
