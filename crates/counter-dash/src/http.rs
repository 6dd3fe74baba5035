//! HTTP seam between the sync loops and the network.
//!
//! The loops only see [`HttpClient`]; [`ReqwestClient`] is the production
//! implementation, tests substitute their own.

use std::time::Duration;

use async_trait::async_trait;
use counter_proto::config::join_url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// A JSON call against the API base URL.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    pub method: Method,
    /// Path plus query, relative to the API base (e.g. `/api/me`).
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

impl JsonRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            bearer: None,
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            bearer: None,
            body: Some(body),
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a JSON call; any non-2xx status is an error.
    async fn request_json(&self, req: JsonRequest) -> Result<Value, FetchError>;

    /// Unauthenticated liveness probe against an absolute URL.  The body is
    /// ignored; only the status matters.
    async fn probe(&self, url: &str) -> Result<(), FetchError>;
}

/// Perform `req` and decode the body into `T`.
pub async fn fetch<T: DeserializeOwned>(
    client: &dyn HttpClient,
    req: JsonRequest,
) -> Result<T, FetchError> {
    let value = client.request_json(req).await?;
    serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
}

pub struct ReqwestClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("counter-dash/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request_json(&self, req: JsonRequest) -> Result<Value, FetchError> {
        let url = join_url(&self.base_url, &req.path);
        let mut builder = match req.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
        };
        builder = builder.header("Accept", "application/json");
        if let Some(token) = &req.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!("[http] {:?} {} -> {}", req.method, req.path, status);
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn probe(&self, url: &str) -> Result<(), FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(FetchError::Status(status.as_u16()))
        }
    }
}
