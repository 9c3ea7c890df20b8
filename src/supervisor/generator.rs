use std::sync::Arc;

use tracing::debug;

use super::prompts;
use crate::extract::{extract_yaml, parse_agent_infos, AgentInfo};
use crate::services::{AgentServiceClient, ServiceKind, UpstreamError};

/// A generated document: the raw model response and the YAML extracted
/// from it.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub raw: String,
    pub yaml: String,
}

impl GeneratedDocument {
    fn from_raw(raw: String) -> Self {
        let yaml = extract_yaml(&raw);
        Self { raw, yaml }
    }
}

/// Generates agents and workflow documents through the remote services.
pub struct DocumentGenerator {
    services: Arc<AgentServiceClient>,
}

impl DocumentGenerator {
    pub fn new(services: Arc<AgentServiceClient>) -> Self {
        Self { services }
    }

    /// Generate an agents document directly from the user request.
    pub async fn generate_agents(
        &self,
        user_input: &str,
    ) -> Result<GeneratedDocument, UpstreamError> {
        let raw = self
            .services
            .send_prompt(ServiceKind::AgentsGenerator, user_input)
            .await?;
        let doc = GeneratedDocument::from_raw(raw);
        debug!(yaml_len = doc.yaml.len(), "Generated agents document");
        Ok(doc)
    }

    /// Generate a workflow document from a previously generated agents
    /// document plus the original request.
    pub async fn generate_workflow(
        &self,
        agents_yaml: &str,
        user_input: &str,
    ) -> Result<GeneratedDocument, UpstreamError> {
        let agents = parse_agent_infos(agents_yaml);
        debug!(agent_count = agents.len(), "Building workflow prompt");

        let prompt = prompts::workflow_prompt(&agents, user_input);
        let raw = self
            .services
            .send_prompt(ServiceKind::WorkflowGenerator, &prompt)
            .await?;
        let doc = GeneratedDocument::from_raw(raw);
        debug!(yaml_len = doc.yaml.len(), "Generated workflow document");
        Ok(doc)
    }

    /// Agent records the workflow prompt will enumerate, exposed for
    /// progress reporting.
    pub fn agents_for(&self, agents_yaml: &str) -> Vec<AgentInfo> {
        parse_agent_infos(agents_yaml)
    }
}
