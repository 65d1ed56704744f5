//! HTTP client for a remote completer service.

use super::client::CompleterClient;
use super::model::{
    AddCompletedValueRequest, AddDelayRequest, AddStageRequest, AddStageResponse,
    AddTerminationHookRequest, AwaitStageResponse, CommitRequest, CreateFlowRequest,
    CreateFlowResponse,
};
use crate::config::FlowConfig;
use crate::core::{CompletionResult, FlowId, FlowState, StageId};
use crate::errors::FlowError;
use crate::flow::Closure;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Completer client speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteCompleterClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl RemoteCompleterClient {
    /// Creates a client from configuration.
    pub fn new(config: &FlowConfig) -> Result<Self, FlowError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FlowError::completer(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.completer_base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Creates a client from the environment.
    pub fn from_env() -> Result<Self, FlowError> {
        Self::new(&FlowConfig::from_env())
    }

    /// Returns the service base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn flow_url(&self, flow_id: &FlowId, path: &str) -> String {
        format!("{}/v1/flows/{}/{}", self.base_url, flow_id, path)
    }

    async fn post<B, R>(&self, url: String, body: &B) -> Result<R, FlowError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(url = %url, "Completer request");
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| FlowError::completer(format!("request to {url} failed: {e}")))?;
        Self::read(response).await
    }

    async fn post_empty<B: Serialize + Sync>(&self, url: String, body: &B) -> Result<(), FlowError> {
        debug!(url = %url, "Completer request");
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| FlowError::completer(format!("request to {url} failed: {e}")))?;
        Self::check(response).await.map(|_| ())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, FlowError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FlowError::completer(format!("completer returned {status}: {body}")))
    }

    async fn read<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, FlowError> {
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| FlowError::codec(format!("failed to parse completer response: {e}")))
    }
}

#[async_trait]
impl CompleterClient for RemoteCompleterClient {
    async fn create_flow(&self, function_id: &str) -> Result<FlowId, FlowError> {
        let url = format!("{}/v1/flows", self.base_url);
        let response: CreateFlowResponse = self
            .post(
                url,
                &CreateFlowRequest {
                    function_id: function_id.to_string(),
                },
            )
            .await?;
        Ok(response.flow_id)
    }

    async fn add_stage(&self, flow_id: &FlowId, request: AddStageRequest) -> Result<StageId, FlowError> {
        let response: AddStageResponse = self.post(self.flow_url(flow_id, "stage"), &request).await?;
        Ok(response.stage_id)
    }

    async fn add_completed_value(
        &self,
        flow_id: &FlowId,
        result: CompletionResult,
    ) -> Result<StageId, FlowError> {
        let response: AddStageResponse = self
            .post(self.flow_url(flow_id, "value"), &AddCompletedValueRequest { result })
            .await?;
        Ok(response.stage_id)
    }

    async fn add_delay(&self, flow_id: &FlowId, delay: Duration) -> Result<StageId, FlowError> {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let response: AddStageResponse = self
            .post(self.flow_url(flow_id, "delay"), &AddDelayRequest { delay_ms })
            .await?;
        Ok(response.stage_id)
    }

    async fn await_stage(
        &self,
        flow_id: &FlowId,
        stage_id: &StageId,
        timeout: Option<Duration>,
    ) -> Result<CompletionResult, FlowError> {
        let url = self.flow_url(flow_id, &format!("stages/{stage_id}/await"));
        let mut request = self.client.get(&url);
        if let Some(timeout) = timeout {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            request = request.query(&[("timeout_ms", timeout_ms)]);
        }

        debug!(url = %url, "Awaiting stage");
        let response = request
            .send()
            .await
            .map_err(|e| FlowError::completer(format!("request to {url} failed: {e}")))?;
        if response.status() == StatusCode::REQUEST_TIMEOUT {
            return Err(FlowError::Timeout(stage_id.clone()));
        }
        let body: AwaitStageResponse = Self::read(response).await?;
        Ok(body.result)
    }

    async fn add_termination_hook(&self, flow_id: &FlowId, closure: Closure) -> Result<(), FlowError> {
        self.post_empty(
            self.flow_url(flow_id, "terminationHook"),
            &AddTerminationHookRequest { closure },
        )
        .await
    }

    async fn commit(&self, flow_id: &FlowId, state: FlowState) -> Result<(), FlowError> {
        self.post_empty(self.flow_url(flow_id, "commit"), &CommitRequest { state })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = FlowConfig::new().with_completer_base_url("http://localhost:8081/");
        let client = RemoteCompleterClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8081");
        assert_eq!(
            client.flow_url(&FlowId::new("f1"), "stage"),
            "http://localhost:8081/v1/flows/f1/stage"
        );
    }
}
