//! 远程端点客户端
//!
//! 把 `{command, payload}` 以 JSON POST 到 `{base_url}/commands`，原样返回回复信封。

use std::time::Duration;

use application::{BackendEndpoint, EndpointError};
use async_trait::async_trait;
use domain::{CommandName, CommandRequest, EndpointId};
use serde_json::Value;
use tracing::debug;

pub struct HttpBackendEndpoint {
    id: EndpointId,
    commands: Vec<CommandName>,
    url: String,
    client: reqwest::Client,
}

impl HttpBackendEndpoint {
    /// `request_timeout` 是传输层上限，分发器另有自己的等待上限
    pub fn new(
        id: EndpointId,
        base_url: &str,
        commands: Vec<CommandName>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            id,
            commands,
            url: format!("{}/commands", base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BackendEndpoint for HttpBackendEndpoint {
    fn id(&self) -> EndpointId {
        self.id.clone()
    }

    fn commands(&self) -> Vec<CommandName> {
        self.commands.clone()
    }

    async fn invoke(&self, request: CommandRequest) -> Result<Value, EndpointError> {
        debug!(endpoint = %self.id, command = %request.command, url = %self.url, "调用远程端点");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| EndpointError::Unreachable(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| EndpointError::Unreachable(err.to_string()))?;

        serde_json::from_slice(&body).map_err(|err| {
            EndpointError::MalformedReply(format!("HTTP {} with unparseable body: {}", status, err))
        })
    }
}
