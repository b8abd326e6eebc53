//! Scripted transport for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use crate::client::{
    ApiRequest, ApiResponse, Credential, ExecutionContext, JobGateway, Transport, TransportError,
};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<ApiResponse, TransportError>>,
    requests: Vec<ApiRequest>,
}

/// Replays canned responses in order and records every request
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: Value) -> Self {
        self.push(Ok(ApiResponse {
            status,
            body: serde_json::to_vec(&body).unwrap(),
        }))
    }

    pub fn respond_text(self, status: u16, body: &str) -> Self {
        self.push(Ok(ApiResponse {
            status,
            body: body.as_bytes().to_vec(),
        }))
    }

    pub fn fail(self, detail: &str) -> Self {
        self.push(Err(TransportError(detail.to_string())))
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    fn push(self, response: Result<ApiResponse, TransportError>) -> Self {
        self.script.lock().unwrap().responses.push_back(response);
        self
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request);
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted response left".to_string())))
    }
}

pub fn gateway(transport: &ScriptedTransport) -> JobGateway {
    let context = ExecutionContext::new(
        Url::parse("https://vbr.test:9419").unwrap(),
        Credential::new("test-token"),
        veeam_common::DEFAULT_API_VERSION,
    );
    JobGateway::new(Arc::new(transport.clone()), context)
}
