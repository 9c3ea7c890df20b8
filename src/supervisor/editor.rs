use std::sync::Arc;

use tracing::debug;

use super::generator::GeneratedDocument;
use super::prompts;
use crate::extract::extract_yaml;
use crate::services::{AgentServiceClient, ServiceKind, UpstreamError};

/// Applies a user instruction to an existing document via the remote
/// editing service.
pub struct YamlEditor {
    services: Arc<AgentServiceClient>,
}

impl YamlEditor {
    pub fn new(services: Arc<AgentServiceClient>) -> Self {
        Self { services }
    }

    pub async fn edit(
        &self,
        yaml_content: &str,
        file_label: &str,
        instruction: &str,
    ) -> Result<GeneratedDocument, UpstreamError> {
        let prompt = prompts::edit_prompt(yaml_content, file_label, instruction);
        let raw = self.services.send_prompt(ServiceKind::Editor, &prompt).await?;
        let yaml = extract_yaml(&raw);
        debug!(file = file_label, yaml_len = yaml.len(), "Edited document");
        Ok(GeneratedDocument { raw, yaml })
    }
}
