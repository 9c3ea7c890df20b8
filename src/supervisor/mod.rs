//! Request orchestration: classify a user request, then either edit an
//! existing document or generate the agents/workflow pair.

pub mod classifier;
pub mod editor;
pub mod generator;
pub mod prompts;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::database::messages::Message;
use crate::database::yaml_files::YamlFile;
use crate::database::DbPool;
use crate::progress::ProgressSink;
use crate::services::{AgentServiceClient, UpstreamError};
use classifier::IntentClassifier;
use editor::YamlEditor;
use generator::DocumentGenerator;

pub const AGENTS_FILE: &str = "agents.yaml";
pub const WORKFLOW_FILE: &str = "workflow.yaml";

/// The classified purpose of a user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    GenerateWorkflow,
    EditYaml,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::GenerateWorkflow => "GENERATE_WORKFLOW",
            Intent::EditYaml => "EDIT_YAML",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
}

impl Classification {
    /// The deterministic default used whenever the classifier's reply
    /// cannot be interpreted.
    pub fn parse_fallback(detail: impl fmt::Display) -> Self {
        Self {
            intent: Intent::GenerateWorkflow,
            confidence: 0.5,
            reasoning: format!("Defaulted due to classifier parsing error: {detail}"),
        }
    }
}

/// Terminal value of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
    pub response: String,
    pub yaml_files: Vec<YamlFile>,
    pub chat_id: String,
}

/// Failure of both the primary run and the degraded agents-only fallback.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct PipelineFailure {
    pub message: String,
}

/// Composes the classifier, the generators and the editor into the two
/// top-level flows, reporting progress through an injected sink.
pub struct Supervisor {
    classifier: IntentClassifier,
    generator: DocumentGenerator,
    editor: YamlEditor,
    sink: Arc<dyn ProgressSink>,
}

impl Supervisor {
    pub fn new(services: Arc<AgentServiceClient>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            classifier: IntentClassifier::new(Arc::clone(&services)),
            generator: DocumentGenerator::new(Arc::clone(&services)),
            editor: YamlEditor::new(services),
            sink,
        }
    }

    /// Run the full pipeline and fall back to an agents-only result when an
    /// upstream stage fails. Only a double failure surfaces as an error.
    pub async fn run_with_fallback(
        &self,
        db: &DbPool,
        chat_id: &str,
        user_input: &str,
    ) -> Result<PipelineResult, PipelineFailure> {
        if let Err(e) = Message::add(db, chat_id, "user", user_input).await {
            warn!("Could not record user message: {e}");
        }

        let result = match self.run(db, chat_id, user_input).await {
            Ok(result) => result,
            Err(primary) => {
                self.sink.error(&format!("Orchestration failed: {primary}"));
                self.sink
                    .warning("Attempting degraded agents-only generation");
                self.degraded_agents_only(db, chat_id, user_input, &primary)
                    .await?
            }
        };

        if let Err(e) = Message::add(db, chat_id, "assistant", &result.response).await {
            warn!("Could not record assistant message: {e}");
        }

        Ok(result)
    }

    /// The orchestration state machine. Classification problems degrade
    /// in place; generation and editing failures propagate.
    pub async fn run(
        &self,
        db: &DbPool,
        chat_id: &str,
        user_input: &str,
    ) -> Result<PipelineResult, UpstreamError> {
        self.sink.info("Processing your request...");

        let (agents_content, workflow_content) = self.load_context(db, chat_id).await;

        self.sink.info("Classifying user intent...");
        let classification = match self
            .classifier
            .classify(user_input, &agents_content, &workflow_content)
            .await
        {
            Ok(outcome) => outcome.classification,
            Err(e) => {
                // Classification being down never aborts a run.
                self.sink
                    .warning(&format!("Classification unavailable: {e}"));
                Classification {
                    intent: Intent::GenerateWorkflow,
                    confidence: 0.0,
                    reasoning: format!(
                        "Classification unavailable ({e}); defaulting to workflow generation"
                    ),
                }
            }
        };
        self.sink.info(&format!(
            "Intent classified as {} (confidence {:.2})",
            classification.intent, classification.confidence
        ));

        if classification.intent == Intent::EditYaml {
            if agents_content.is_empty() && workflow_content.is_empty() {
                // Editing with nothing to edit is invalid.
                self.sink.warning(
                    "No existing YAML documents found, switching to workflow generation",
                );
            } else {
                return self
                    .run_edit(
                        db,
                        chat_id,
                        user_input,
                        &classification,
                        &agents_content,
                        &workflow_content,
                    )
                    .await;
            }
        }

        self.run_generation(db, chat_id, user_input, &classification)
            .await
    }

    async fn run_edit(
        &self,
        db: &DbPool,
        chat_id: &str,
        user_input: &str,
        classification: &Classification,
        agents_content: &str,
        workflow_content: &str,
    ) -> Result<PipelineResult, UpstreamError> {
        // agents.yaml wins when both documents exist.
        let (file_to_edit, current) = if !agents_content.is_empty() {
            (AGENTS_FILE, agents_content)
        } else {
            (WORKFLOW_FILE, workflow_content)
        };

        self.sink.info(&format!("Editing {file_to_edit}..."));
        let edited = self.editor.edit(current, file_to_edit, user_input).await?;
        self.sink
            .info(&format!("Successfully edited {file_to_edit}"));

        self.save_yaml(db, chat_id, file_to_edit, &edited.yaml).await;

        let reasoning = if classification.reasoning.is_empty() {
            "Successfully routed to editing".to_string()
        } else {
            classification.reasoning.clone()
        };

        Ok(PipelineResult {
            intent: Intent::EditYaml,
            confidence: classification.confidence,
            reasoning,
            response: build_success_response(Intent::EditYaml, user_input, Some(file_to_edit)),
            yaml_files: vec![YamlFile {
                name: file_to_edit.to_string(),
                content: edited.yaml,
            }],
            chat_id: chat_id.to_string(),
        })
    }

    async fn run_generation(
        &self,
        db: &DbPool,
        chat_id: &str,
        user_input: &str,
        classification: &Classification,
    ) -> Result<PipelineResult, UpstreamError> {
        self.sink.info("Routing to workflow generation...");

        self.sink.info("Generating agents document...");
        let agents = self.generator.generate_agents(user_input).await?;
        self.sink.info(&format!(
            "Generated {AGENTS_FILE} ({} characters)",
            agents.yaml.len()
        ));

        // Saved immediately so a concurrent viewer sees partial progress.
        self.save_yaml(db, chat_id, AGENTS_FILE, &agents.yaml).await;

        let agent_infos = self.generator.agents_for(&agents.yaml);
        self.sink.info(&format!(
            "Found {} agents to include in workflow",
            agent_infos.len()
        ));

        self.sink.info("Generating workflow document...");
        let workflow = self
            .generator
            .generate_workflow(&agents.yaml, user_input)
            .await?;
        self.sink.info(&format!(
            "Generated {WORKFLOW_FILE} ({} characters)",
            workflow.yaml.len()
        ));

        self.save_yaml(db, chat_id, WORKFLOW_FILE, &workflow.yaml).await;

        let reasoning = if classification.reasoning.is_empty() {
            "Successfully routed to workflow generation".to_string()
        } else {
            classification.reasoning.clone()
        };

        self.sink.info("Workflow generation finished successfully");

        Ok(PipelineResult {
            intent: Intent::GenerateWorkflow,
            confidence: classification.confidence,
            reasoning,
            response: build_success_response(Intent::GenerateWorkflow, user_input, None),
            yaml_files: vec![
                YamlFile {
                    name: AGENTS_FILE.to_string(),
                    content: agents.yaml,
                },
                YamlFile {
                    name: WORKFLOW_FILE.to_string(),
                    content: workflow.yaml,
                },
            ],
            chat_id: chat_id.to_string(),
        })
    }

    async fn degraded_agents_only(
        &self,
        db: &DbPool,
        chat_id: &str,
        user_input: &str,
        primary: &UpstreamError,
    ) -> Result<PipelineResult, PipelineFailure> {
        let agents = match self.generator.generate_agents(user_input).await {
            Ok(doc) => doc,
            Err(fallback) => {
                self.sink.error(&format!(
                    "Degraded agents-only attempt also failed: {fallback}"
                ));
                return Err(PipelineFailure {
                    message: format!("{primary}; degraded agents-only attempt also failed: {fallback}"),
                });
            }
        };

        self.save_yaml(db, chat_id, AGENTS_FILE, &agents.yaml).await;
        self.sink
            .info("Produced agents document despite earlier failure");

        Ok(PipelineResult {
            intent: Intent::GenerateWorkflow,
            confidence: 0.0,
            reasoning: format!("Degraded result after failure: {primary}"),
            response: format!(
                "Generated {AGENTS_FILE} from your prompt. The rest of the pipeline was unavailable ({primary}); retry to produce {WORKFLOW_FILE}."
            ),
            yaml_files: vec![YamlFile {
                name: AGENTS_FILE.to_string(),
                content: agents.yaml,
            }],
            chat_id: chat_id.to_string(),
        })
    }

    /// Current documents for classification context; failures degrade to
    /// empty strings.
    async fn load_context(&self, db: &DbPool, chat_id: &str) -> (String, String) {
        self.sink.info("Loading existing YAML documents for context...");

        let files = match YamlFile::list(db, chat_id).await {
            Ok(files) => files,
            Err(e) => {
                self.sink
                    .warning(&format!("Could not fetch YAML documents for context: {e}"));
                return (String::new(), String::new());
            }
        };

        let mut agents_content = String::new();
        let mut workflow_content = String::new();
        for file in files {
            match file.name.as_str() {
                AGENTS_FILE => agents_content = file.content,
                WORKFLOW_FILE => workflow_content = file.content,
                _ => {}
            }
        }

        if agents_content.is_empty() && workflow_content.is_empty() {
            self.sink.info("No existing YAML documents found, starting fresh");
        } else {
            self.sink.info("Found existing YAML documents to use as context");
        }

        (agents_content, workflow_content)
    }

    /// Non-critical side effect: persistence failures are logged and the
    /// run continues.
    async fn save_yaml(&self, db: &DbPool, chat_id: &str, name: &str, content: &str) {
        match YamlFile::upsert(db, chat_id, name, content).await {
            Ok(()) => self.sink.info(&format!("Saved {name}")),
            Err(e) => self
                .sink
                .warning(&format!("Could not save {name} immediately: {e}")),
        }
    }
}

/// Human-readable success copy for the terminal response.
pub fn build_success_response(
    intent: Intent,
    user_request: &str,
    file_edited: Option<&str>,
) -> String {
    if intent == Intent::EditYaml {
        if let Some(file) = file_edited {
            return format!("Successfully edited {file} based on your request: {user_request}");
        }
    }

    format!(
        "Successfully generated both {AGENTS_FILE} and {WORKFLOW_FILE} from your prompt!\n\n\
         Your request: \"{user_request}\"\n\n\
         I've created:\n\
         - **{AGENTS_FILE}** - Contains the agent definitions\n\
         - **{WORKFLOW_FILE}** - Contains the workflow that uses those agents\n\n\
         Both files are now available in the YAML panel on the right. You can switch between tabs to view each file."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::database::create_test_pool;
    use crate::progress::TracingSink;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn supervisor_for(server: &MockServer) -> Supervisor {
        let mut config = Config::default();
        config.classifier_url = format!("{}/classify", server.uri());
        config.agents_url = format!("{}/agents", server.uri());
        config.workflow_url = format!("{}/workflow", server.uri());
        config.editor_url = format!("{}/edit", server.uri());
        Supervisor::new(
            Arc::new(AgentServiceClient::new(&config)),
            Arc::new(TracingSink),
        )
    }

    fn classifier_reply(intent: &str, confidence: f64) -> ResponseTemplate {
        let body = serde_json::json!({
            "intent": intent,
            "confidence": confidence,
            "reasoning": "test reasoning"
        });
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": body.to_string()
        }))
    }

    fn yaml_reply(yaml: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": format!("```yaml\n{yaml}\n```")
        }))
    }

    #[tokio::test]
    async fn generate_flow_produces_both_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(classifier_reply("GENERATE_WORKFLOW", 0.95))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents"))
            .respond_with(yaml_reply("metadata:\n  name: summarizer\nspec:\n  description: Summarizes PDFs"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workflow"))
            .respond_with(yaml_reply("steps:\n  - agent: summarizer"))
            .mount(&server)
            .await;

        let pool = create_test_pool().await;
        let chat_id = crate::database::sessions::ChatSession::create(&pool, None, None)
            .await
            .unwrap();

        let supervisor = supervisor_for(&server);
        let result = supervisor
            .run(&pool, &chat_id, "create an agent to summarize PDFs")
            .await
            .unwrap();

        assert_eq!(result.intent, Intent::GenerateWorkflow);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.yaml_files.len(), 2);
        assert_eq!(result.yaml_files[0].name, AGENTS_FILE);
        assert_eq!(result.yaml_files[1].name, WORKFLOW_FILE);
        assert!(!result.yaml_files[0].content.is_empty());
        assert!(!result.yaml_files[1].content.is_empty());

        // Both documents were persisted for the chat.
        let stored = YamlFile::list(&pool, &chat_id).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn edit_flow_prefers_agents_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(classifier_reply("EDIT_YAML", 0.88))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/edit"))
            .and(body_partial_json(serde_json::json!({})))
            .respond_with(yaml_reply("edited: true"))
            .mount(&server)
            .await;

        let pool = create_test_pool().await;
        let chat_id = crate::database::sessions::ChatSession::create(&pool, None, None)
            .await
            .unwrap();
        YamlFile::upsert(&pool, &chat_id, AGENTS_FILE, "a: 1").await.unwrap();
        YamlFile::upsert(&pool, &chat_id, WORKFLOW_FILE, "w: 1").await.unwrap();

        let supervisor = supervisor_for(&server);
        let result = supervisor
            .run(&pool, &chat_id, "change the agent name")
            .await
            .unwrap();

        assert_eq!(result.intent, Intent::EditYaml);
        assert_eq!(result.yaml_files.len(), 1);
        assert_eq!(result.yaml_files[0].name, AGENTS_FILE);
        assert_eq!(result.yaml_files[0].content, "edited: true");

        let stored = YamlFile::get(&pool, &chat_id, AGENTS_FILE).await.unwrap().unwrap();
        assert_eq!(stored.content, "edited: true");
    }

    #[tokio::test]
    async fn edit_without_target_coerces_to_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(classifier_reply("EDIT_YAML", 0.9))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents"))
            .respond_with(yaml_reply("metadata:\n  name: fresh"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workflow"))
            .respond_with(yaml_reply("steps: []"))
            .mount(&server)
            .await;

        let pool = create_test_pool().await;
        let chat_id = crate::database::sessions::ChatSession::create(&pool, None, None)
            .await
            .unwrap();

        let supervisor = supervisor_for(&server);
        let result = supervisor.run(&pool, &chat_id, "edit my yaml").await.unwrap();

        assert_eq!(result.intent, Intent::GenerateWorkflow);
        assert_eq!(result.yaml_files.len(), 2);
    }

    #[tokio::test]
    async fn classifier_outage_degrades_to_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents"))
            .respond_with(yaml_reply("metadata:\n  name: solo"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workflow"))
            .respond_with(yaml_reply("steps: []"))
            .mount(&server)
            .await;

        let pool = create_test_pool().await;
        let chat_id = crate::database::sessions::ChatSession::create(&pool, None, None)
            .await
            .unwrap();

        let supervisor = supervisor_for(&server);
        let result = supervisor.run(&pool, &chat_id, "make something").await.unwrap();

        assert_eq!(result.intent, Intent::GenerateWorkflow);
        assert!(result.reasoning.contains("Classification unavailable"));
    }

    #[tokio::test]
    async fn workflow_failure_falls_back_to_agents_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(classifier_reply("GENERATE_WORKFLOW", 0.9))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents"))
            .respond_with(yaml_reply("metadata:\n  name: partial"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workflow"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let pool = create_test_pool().await;
        let chat_id = crate::database::sessions::ChatSession::create(&pool, None, None)
            .await
            .unwrap();

        let supervisor = supervisor_for(&server);
        let result = supervisor
            .run_with_fallback(&pool, &chat_id, "make something")
            .await
            .unwrap();

        assert_eq!(result.intent, Intent::GenerateWorkflow);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.yaml_files.len(), 1);
        assert_eq!(result.yaml_files[0].name, AGENTS_FILE);
        assert!(result.reasoning.contains("Degraded result"));
    }

    #[tokio::test]
    async fn double_failure_surfaces_both_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(classifier_reply("GENERATE_WORKFLOW", 0.9))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents"))
            .respond_with(ResponseTemplate::new(500).set_body_string("agents down"))
            .mount(&server)
            .await;

        let pool = create_test_pool().await;
        let chat_id = crate::database::sessions::ChatSession::create(&pool, None, None)
            .await
            .unwrap();

        let supervisor = supervisor_for(&server);
        let failure = supervisor
            .run_with_fallback(&pool, &chat_id, "make something")
            .await
            .unwrap_err();

        assert!(failure.message.contains("agents down"));
        assert!(failure.message.contains("also failed"));
    }

    #[test]
    fn success_response_names_edited_file() {
        let msg = build_success_response(Intent::EditYaml, "tweak it", Some(AGENTS_FILE));
        assert!(msg.contains("Successfully edited agents.yaml"));
        assert!(msg.contains("tweak it"));
    }
}
