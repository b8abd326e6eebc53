//! REST gateway for the backup server's job endpoints
//!
//! Each call performs exactly one HTTP exchange and reports the result as an
//! [`Outcome`]. Nothing here retries or interprets lifecycle semantics.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use veeam_common::{JobId, Operation, RemoteResource};

/// Success status for each lifecycle operation
pub fn expected_status(op: Operation) -> u16 {
    match op {
        Operation::Create => 201,
        Operation::Read | Operation::Update => 200,
        Operation::Delete => 204,
    }
}

/// Bearer token presented to the server
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Where and as whom requests are made
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub endpoint: Url,
    pub credential: Credential,
    pub api_version: String,
}

impl ExecutionContext {
    pub fn new(endpoint: Url, credential: Credential, api_version: impl Into<String>) -> Self {
        Self {
            endpoint,
            credential,
            api_version: api_version.into(),
        }
    }

    /// `/api/v1/jobs`, or `/api/v1/jobs/{id}` with the id percent-encoded
    pub fn jobs_url(&self, id: Option<&JobId>) -> Result<Url, TransportError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                TransportError(format!("endpoint {} cannot be used as a base URL", self.endpoint))
            })?;
            segments.pop_if_empty().extend(["api", "v1", "jobs"]);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }
}

/// A fully prepared HTTP request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and raw body of an HTTP response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Connection-level failure: no HTTP status was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// HTTP-capable transport supplied by the caller
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(format!("reading response body: {}", e)))?;

        Ok(ApiResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Result of a single gateway call
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    NotFound,
    Conflict { body: String },
    TransportError(String),
    UnexpectedStatus { status: u16, body: String },
    /// Expected status, but the body lacked something it must carry
    Malformed(String),
}

impl<T> Outcome<T> {
    fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Success(v) => f(v),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Conflict { body } => Outcome::Conflict { body },
            Outcome::TransportError(e) => Outcome::TransportError(e),
            Outcome::UnexpectedStatus { status, body } => {
                Outcome::UnexpectedStatus { status, body }
            }
            Outcome::Malformed(e) => Outcome::Malformed(e),
        }
    }
}

/// Stateless job operations against one server
#[derive(Clone)]
pub struct JobGateway {
    transport: Arc<dyn Transport>,
    context: ExecutionContext,
}

impl JobGateway {
    pub fn new(transport: Arc<dyn Transport>, context: ExecutionContext) -> Self {
        Self { transport, context }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// `POST /api/v1/jobs`; the new job's id is taken from the response
    pub async fn create(&self, payload: &Map<String, Value>) -> Outcome<JobId> {
        self.execute(Method::POST, None, Some(payload), Operation::Create)
            .await
            .and_then(|body| {
                let parsed: Value = match serde_json::from_slice(&body) {
                    Ok(v) => v,
                    Err(e) => {
                        return Outcome::Malformed(format!("invalid JSON in create response: {}", e))
                    }
                };
                match parsed.get("id").and_then(Value::as_str).and_then(JobId::new) {
                    Some(id) => Outcome::Success(id),
                    None => Outcome::Malformed("create response has no job id".to_string()),
                }
            })
    }

    /// `GET /api/v1/jobs/{id}`
    pub async fn read(&self, id: &JobId) -> Outcome<RemoteResource> {
        self.execute(Method::GET, Some(id), None, Operation::Read)
            .await
            .and_then(|body| {
                let parsed: Value = match serde_json::from_slice(&body) {
                    Ok(v) => v,
                    Err(e) => {
                        return Outcome::Malformed(format!("invalid JSON in read response: {}", e))
                    }
                };
                match RemoteResource::from_wire(&parsed) {
                    Ok(remote) => Outcome::Success(remote),
                    Err(e) => Outcome::Malformed(e),
                }
            })
    }

    /// `PUT /api/v1/jobs/{id}`; the response body is not used
    pub async fn update(&self, id: &JobId, payload: &Map<String, Value>) -> Outcome<()> {
        self.execute(Method::PUT, Some(id), Some(payload), Operation::Update)
            .await
            .and_then(|_| Outcome::Success(()))
    }

    /// `DELETE /api/v1/jobs/{id}`
    pub async fn delete(&self, id: &JobId) -> Outcome<()> {
        self.execute(Method::DELETE, Some(id), None, Operation::Delete)
            .await
            .and_then(|_| Outcome::Success(()))
    }

    async fn execute(
        &self,
        method: Method,
        id: Option<&JobId>,
        payload: Option<&Map<String, Value>>,
        op: Operation,
    ) -> Outcome<Vec<u8>> {
        let url = match self.context.jobs_url(id) {
            Ok(url) => url,
            Err(e) => return Outcome::TransportError(e.0),
        };

        let mut headers = vec![
            ("x-api-version", self.context.api_version.clone()),
            ("Authorization", self.context.credential.bearer()),
        ];
        let body = match payload {
            Some(payload) => {
                headers.push(("Content-Type", "application/json".to_string()));
                match serde_json::to_vec(payload) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        return Outcome::TransportError(format!("encoding request body: {}", e))
                    }
                }
            }
            None => None,
        };

        debug!("{} {}", method, url);
        let request = ApiRequest {
            method,
            url,
            headers,
            body,
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => return Outcome::TransportError(e.0),
        };
        debug!("{} responded with {}", op, response.status);

        classify(response, expected_status(op))
    }
}

fn classify(response: ApiResponse, expected: u16) -> Outcome<Vec<u8>> {
    match response.status {
        s if s == expected => Outcome::Success(response.body),
        404 => Outcome::NotFound,
        409 => Outcome::Conflict {
            body: String::from_utf8_lossy(&response.body).into_owned(),
        },
        status => Outcome::UnexpectedStatus {
            status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        },
    }
}
