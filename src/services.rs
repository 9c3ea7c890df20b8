//! Clients for the remote text-generation services.
//!
//! All four services share one wire contract: `POST {prompt, agent?}`,
//! success is HTTP 200 with `{"response": string}`. Anything else is an
//! [`UpstreamError`] for that call.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;

/// Which remote service a call targets. Determines endpoint, timeout and
/// the `agent` field sent with the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Classifier,
    AgentsGenerator,
    WorkflowGenerator,
    Editor,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Classifier => "classifier",
            ServiceKind::AgentsGenerator => "agents",
            ServiceKind::WorkflowGenerator => "workflow",
            ServiceKind::Editor => "editor",
        }
    }

    /// The named remote agent persona, where the service expects one.
    fn agent_name(&self) -> Option<&'static str> {
        match self {
            ServiceKind::Classifier => Some("IntentClassifier"),
            ServiceKind::AgentsGenerator => Some("TaskInterpreter"),
            ServiceKind::WorkflowGenerator => Some("WorkflowYAMLBuilder"),
            ServiceKind::Editor => None,
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} service failed with status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to communicate with {service} service: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct PromptResponse {
    #[serde(default)]
    response: String,
}

/// HTTP client over the four generation/classification endpoints.
pub struct AgentServiceClient {
    http: HttpClient,
    classifier_url: String,
    agents_url: String,
    workflow_url: String,
    editor_url: String,
    classify_timeout: Duration,
    generate_timeout: Duration,
    edit_timeout: Duration,
}

impl AgentServiceClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: HttpClient::new(),
            classifier_url: config.classifier_url.clone(),
            agents_url: config.agents_url.clone(),
            workflow_url: config.workflow_url.clone(),
            editor_url: config.editor_url.clone(),
            classify_timeout: Duration::from_secs(config.classify_timeout_secs),
            generate_timeout: Duration::from_secs(config.generate_timeout_secs),
            edit_timeout: Duration::from_secs(config.edit_timeout_secs),
        }
    }

    fn endpoint(&self, kind: ServiceKind) -> (&str, Duration) {
        match kind {
            ServiceKind::Classifier => (&self.classifier_url, self.classify_timeout),
            ServiceKind::AgentsGenerator => (&self.agents_url, self.generate_timeout),
            ServiceKind::WorkflowGenerator => (&self.workflow_url, self.generate_timeout),
            ServiceKind::Editor => (&self.editor_url, self.edit_timeout),
        }
    }

    /// Send a prompt to one of the remote services and return the raw
    /// response text.
    pub async fn send_prompt(
        &self,
        kind: ServiceKind,
        prompt: &str,
    ) -> Result<String, UpstreamError> {
        let (url, timeout) = self.endpoint(kind);
        let service = kind.as_str();

        debug!(service, url, prompt_len = prompt.len(), "Sending prompt to remote service");

        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .json(&PromptRequest {
                prompt,
                agent: kind.agent_name(),
            })
            .send()
            .await
            .map_err(|source| UpstreamError::Transport { service, source })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                service,
                status: status.as_u16(),
                body,
            });
        }

        let payload: PromptResponse = resp
            .json()
            .await
            .map_err(|source| UpstreamError::Transport { service, source })?;

        debug!(service, response_len = payload.response.len(), "Remote service responded");

        Ok(payload.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str) -> AgentServiceClient {
        let mut config = Config::default();
        config.classifier_url = format!("{}/chat", server_uri);
        config.agents_url = format!("{}/chat", server_uri);
        config.workflow_url = format!("{}/chat", server_uri);
        config.editor_url = format!("{}/chat", server_uri);
        AgentServiceClient::new(&config)
    }

    #[tokio::test]
    async fn send_prompt_returns_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "hello",
                "agent": "TaskInterpreter"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "generated text"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let out = client
            .send_prompt(ServiceKind::AgentsGenerator, "hello")
            .await
            .unwrap();
        assert_eq!(out, "generated text");
    }

    #[tokio::test]
    async fn non_success_status_is_an_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let err = client
            .send_prompt(ServiceKind::Classifier, "hello")
            .await
            .unwrap_err();

        match err {
            UpstreamError::Status { service, status, body } => {
                assert_eq!(service, "classifier");
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn editor_request_carries_no_agent_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "ok"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        client.send_prompt(ServiceKind::Editor, "edit it").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("agent").is_none());
    }
}
