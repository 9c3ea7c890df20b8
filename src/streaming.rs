//! Streaming delivery of pipeline progress.
//!
//! Two channels: an NDJSON response that carries one orchestration run's
//! progress events and terminal result, and an SSE endpoint that tails a
//! named server log file. The NDJSON stream is always terminated by a
//! single `done` event; an `error` event, when present, immediately
//! precedes it.

use std::convert::Infallible;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{
    sse::{Event, KeepAlive, Sse},
    Response,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

use crate::database::messages::Message;
use crate::database::sessions::ChatSession;
use crate::database::yaml_files::YamlFile;
use crate::progress::LogLevel;
use crate::server::AppState;
use crate::supervisor::classifier::IntentClassifier;
use crate::supervisor::editor::YamlEditor;
use crate::supervisor::generator::DocumentGenerator;
use crate::supervisor::{
    build_success_response, Classification, Intent, PipelineResult, AGENTS_FILE, WORKFLOW_FILE,
};

/// One NDJSON progress event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ChatId {
        chat_id: String,
    },
    Status {
        message: String,
        level: LogLevel,
    },
    AiOutput {
        source: &'static str,
        line: String,
    },
    AgentsYaml {
        content: String,
    },
    WorkflowYaml {
        content: String,
    },
    Final {
        #[serde(flatten)]
        result: PipelineResult,
    },
    Error {
        message: String,
    },
    Done,
}

impl StreamEvent {
    fn status(message: impl Into<String>) -> Self {
        StreamEvent::Status {
            message: message.into(),
            level: LogLevel::Info,
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        StreamEvent::Status {
            message: message.into(),
            level: LogLevel::Warning,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamChatRequest {
    pub content: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// POST handler returning the whole pipeline's progress as one
/// `application/x-ndjson` response.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<StreamChatRequest>,
) -> Response {
    let events = pipeline_events(state, payload);
    let body = Body::from_stream(events.map(|event| {
        let mut line = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failure"}"#.to_string());
        line.push('\n');
        Ok::<_, Infallible>(line)
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .expect("static response parts are valid")
}

/// The cooperative pipeline generator. Single-threaded; event order is
/// emission order.
fn pipeline_events(
    state: AppState,
    payload: StreamChatRequest,
) -> impl Stream<Item = StreamEvent> {
    async_stream::stream! {
        let db = state.db.clone();
        let services = Arc::clone(&state.services);

        let chat_id = match ChatSession::ensure(&db, payload.chat_id.clone()).await {
            Ok(id) => id,
            Err(e) => {
                yield StreamEvent::Error { message: format!("Could not open chat session: {e}") };
                yield StreamEvent::Done;
                return;
            }
        };
        yield StreamEvent::ChatId { chat_id: chat_id.clone() };

        if let Err(e) = Message::add(&db, &chat_id, "user", &payload.content).await {
            warn!("Could not record user message: {e}");
        }

        yield StreamEvent::status("Loading existing YAML documents for context...");
        let (mut agents_content, mut workflow_content) = (String::new(), String::new());
        match YamlFile::list(&db, &chat_id).await {
            Ok(files) => {
                for file in files {
                    match file.name.as_str() {
                        AGENTS_FILE => agents_content = file.content,
                        WORKFLOW_FILE => workflow_content = file.content,
                        _ => {}
                    }
                }
            }
            Err(e) => {
                yield StreamEvent::warning(format!("Could not fetch YAML documents for context: {e}"));
            }
        }

        yield StreamEvent::status("Classifying user intent...");
        let classifier = IntentClassifier::new(Arc::clone(&services));
        let classification = match classifier
            .classify(&payload.content, &agents_content, &workflow_content)
            .await
        {
            Ok(outcome) => {
                for line in outcome.raw_response.lines() {
                    yield StreamEvent::AiOutput { source: "classifier", line: line.to_string() };
                }
                outcome.classification
            }
            Err(e) => {
                yield StreamEvent::warning(format!("Classification unavailable: {e}"));
                Classification {
                    intent: Intent::GenerateWorkflow,
                    confidence: 0.0,
                    reasoning: format!(
                        "Classification unavailable ({e}); defaulting to workflow generation"
                    ),
                }
            }
        };
        yield StreamEvent::status(format!(
            "Intent classified as {} (confidence {:.2})",
            classification.intent, classification.confidence
        ));

        let wants_edit = classification.intent == Intent::EditYaml
            && !(agents_content.is_empty() && workflow_content.is_empty());

        let result = if wants_edit {
            let (file_to_edit, current) = if !agents_content.is_empty() {
                (AGENTS_FILE, &agents_content)
            } else {
                (WORKFLOW_FILE, &workflow_content)
            };

            yield StreamEvent::status(format!("Editing {file_to_edit}..."));
            let editor = YamlEditor::new(Arc::clone(&services));
            let edited = match editor.edit(current, file_to_edit, &payload.content).await {
                Ok(doc) => doc,
                Err(e) => {
                    yield StreamEvent::Error { message: e.to_string() };
                    yield StreamEvent::Done;
                    return;
                }
            };
            for line in edited.raw.lines() {
                yield StreamEvent::AiOutput { source: "editor", line: line.to_string() };
            }
            match file_to_edit {
                AGENTS_FILE => yield StreamEvent::AgentsYaml { content: edited.yaml.clone() },
                _ => yield StreamEvent::WorkflowYaml { content: edited.yaml.clone() },
            }

            if let Err(e) = YamlFile::upsert(&db, &chat_id, file_to_edit, &edited.yaml).await {
                yield StreamEvent::warning(format!("Could not save {file_to_edit}: {e}"));
            }
            yield StreamEvent::status(format!("Successfully edited {file_to_edit}"));

            PipelineResult {
                intent: Intent::EditYaml,
                confidence: classification.confidence,
                reasoning: classification.reasoning.clone(),
                response: build_success_response(
                    Intent::EditYaml,
                    &payload.content,
                    Some(file_to_edit),
                ),
                yaml_files: vec![YamlFile {
                    name: file_to_edit.to_string(),
                    content: edited.yaml,
                }],
                chat_id: chat_id.clone(),
            }
        } else {
            if classification.intent == Intent::EditYaml {
                yield StreamEvent::warning(
                    "No existing YAML documents found, switching to workflow generation",
                );
            }

            let generator = DocumentGenerator::new(Arc::clone(&services));

            yield StreamEvent::status("Generating agents document...");
            let agents = match generator.generate_agents(&payload.content).await {
                Ok(doc) => doc,
                Err(e) => {
                    yield StreamEvent::Error { message: e.to_string() };
                    yield StreamEvent::Done;
                    return;
                }
            };
            for line in agents.raw.lines() {
                yield StreamEvent::AiOutput { source: "agents", line: line.to_string() };
            }
            yield StreamEvent::AgentsYaml { content: agents.yaml.clone() };

            if let Err(e) = YamlFile::upsert(&db, &chat_id, AGENTS_FILE, &agents.yaml).await {
                yield StreamEvent::warning(format!("Could not save {AGENTS_FILE} immediately: {e}"));
            } else {
                yield StreamEvent::status(format!("Saved {AGENTS_FILE} for immediate viewing"));
            }

            let agent_count = generator.agents_for(&agents.yaml).len();
            yield StreamEvent::status(format!("Found {agent_count} agents to include in workflow"));

            yield StreamEvent::status("Generating workflow document...");
            let workflow = match generator
                .generate_workflow(&agents.yaml, &payload.content)
                .await
            {
                Ok(doc) => doc,
                Err(e) => {
                    yield StreamEvent::Error { message: e.to_string() };
                    yield StreamEvent::Done;
                    return;
                }
            };
            for line in workflow.raw.lines() {
                yield StreamEvent::AiOutput { source: "workflow", line: line.to_string() };
            }
            yield StreamEvent::WorkflowYaml { content: workflow.yaml.clone() };

            if let Err(e) = YamlFile::upsert(&db, &chat_id, WORKFLOW_FILE, &workflow.yaml).await {
                yield StreamEvent::warning(format!("Could not save {WORKFLOW_FILE}: {e}"));
            }
            yield StreamEvent::status("Workflow generation finished successfully");

            PipelineResult {
                intent: Intent::GenerateWorkflow,
                confidence: classification.confidence,
                reasoning: classification.reasoning.clone(),
                response: build_success_response(Intent::GenerateWorkflow, &payload.content, None),
                yaml_files: vec![
                    YamlFile { name: AGENTS_FILE.to_string(), content: agents.yaml },
                    YamlFile { name: WORKFLOW_FILE.to_string(), content: workflow.yaml },
                ],
                chat_id: chat_id.clone(),
            }
        };

        if let Err(e) = Message::add(&db, &chat_id, "assistant", &result.response).await {
            warn!("Could not record assistant message: {e}");
        }

        yield StreamEvent::Final { result };
        yield StreamEvent::Done;
    }
}

#[derive(Debug, Deserialize)]
pub struct LogStreamQuery {
    /// Log file name under the configured log directory.
    #[serde(default = "default_log_source")]
    pub source: String,
    /// Replay the whole file before tailing new content.
    #[serde(default)]
    pub from_beginning: bool,
}

fn default_log_source() -> String {
    "server.log".to_string()
}

const LOG_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// GET handler tailing a named server log as SSE. Runs until the client
/// disconnects.
pub async fn log_stream_handler(
    State(state): State<AppState>,
    Query(query): Query<LogStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = tail_log_lines(state.config.log_dir.clone(), query)
        .map(|value| Ok(Event::default().data(value.to_string())));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

/// The tail loop itself: polls the named file and yields one JSON value per
/// new line. Never ends on its own for a valid source.
fn tail_log_lines(log_dir: String, query: LogStreamQuery) -> impl Stream<Item = serde_json::Value> {
    async_stream::stream! {
        let Some(file_name) = sanitize_log_name(&query.source) else {
            yield json!({
                "type": "error",
                "message": format!("invalid log source: {}", query.source),
            });
            return;
        };
        let path = PathBuf::from(&log_dir).join(file_name);

        let mut position: Option<u64> = None;
        let mut reported_missing = false;

        loop {
            match tokio::fs::File::open(&path).await {
                Ok(mut file) => {
                    reported_missing = false;
                    let len = file.metadata().await.map(|m| m.len()).unwrap_or(0);
                    let start = match position {
                        Some(p) if p <= len => p,
                        // First observation, or the file was rotated under us.
                        Some(_) => 0,
                        None => {
                            if query.from_beginning {
                                0
                            } else {
                                len
                            }
                        }
                    };

                    let mut next = start;
                    if len > start && file.seek(SeekFrom::Start(start)).await.is_ok() {
                        let mut buf = String::new();
                        if file.read_to_string(&mut buf).await.is_ok() {
                            next = start + buf.len() as u64;
                            for line in buf.lines().filter(|l| !l.trim().is_empty()) {
                                yield json!({
                                    "type": "log",
                                    "line": line,
                                });
                            }
                        }
                    }
                    position = Some(next);
                }
                Err(e) => {
                    if !reported_missing {
                        reported_missing = true;
                        yield json!({
                            "type": "error",
                            "message": format!("log source unavailable: {e}"),
                        });
                    }
                }
            }

            tokio::time::sleep(LOG_POLL_INTERVAL).await;
        }
    }
}

/// Accept only plain file names; anything path-like is rejected.
fn sanitize_log_name(source: &str) -> Option<&str> {
    let name = Path::new(source).file_name()?.to_str()?;
    if name != source || name == ".." {
        return None;
    }
    Some(name)
}

// The handler above is exercised end to end in tests/orchestration.rs; the
// pieces with interesting edge cases are unit tested here.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::database::create_test_pool;
    use crate::jobs::JobProcessor;
    use crate::progress::StatusLogStore;
    use crate::services::AgentServiceClient;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn sanitize_rejects_path_traversal() {
        assert_eq!(sanitize_log_name("server.log"), Some("server.log"));
        assert!(sanitize_log_name("../etc/passwd").is_none());
        assert!(sanitize_log_name("a/b.log").is_none());
        assert!(sanitize_log_name("..").is_none());
    }

    #[test]
    fn events_serialize_with_type_tags() {
        let event = StreamEvent::status("working");
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["message"], "working");

        let done: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&StreamEvent::Done).unwrap()).unwrap();
        assert_eq!(done["type"], "done");
    }

    async fn state_with_mocks(server: &MockServer) -> AppState {
        let mut config = Config::default();
        config.classifier_url = format!("{}/classify", server.uri());
        config.agents_url = format!("{}/agents", server.uri());
        config.workflow_url = format!("{}/workflow", server.uri());
        config.editor_url = format!("{}/edit", server.uri());

        let db = create_test_pool().await;
        let services = Arc::new(AgentServiceClient::new(&config));
        let status_logs = Arc::new(StatusLogStore::new());
        let jobs = JobProcessor::new(
            db.clone(),
            Arc::clone(&services),
            Arc::clone(&status_logs),
            1,
        );

        AppState {
            config,
            db,
            services,
            jobs,
            status_logs,
        }
    }

    #[tokio::test]
    async fn stream_ends_with_single_done_after_final() {
        let server = MockServer::start().await;
        let classification = serde_json::json!({
            "intent": "GENERATE_WORKFLOW",
            "confidence": 0.9,
            "reasoning": "new flow"
        });
        Mock::given(method("POST"))
            .and(url_path("/classify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"response": classification.to_string()}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(url_path("/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"response": "```yaml\nmetadata:\n  name: a\n```"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(url_path("/workflow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"response": "```yaml\nsteps: []\n```"}),
            ))
            .mount(&server)
            .await;

        let state = state_with_mocks(&server).await;
        let events: Vec<StreamEvent> = pipeline_events(
            state,
            StreamChatRequest {
                content: "build a flow".to_string(),
                chat_id: None,
            },
        )
        .collect()
        .await;

        assert!(matches!(events.first(), Some(StreamEvent::ChatId { .. })));
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
        let done_count = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Done))
            .count();
        assert_eq!(done_count, 1);
        let final_count = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Final { .. }))
            .count();
        assert_eq!(final_count, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::AgentsYaml { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::WorkflowYaml { .. })));
    }

    #[tokio::test]
    async fn upstream_failure_yields_error_then_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(url_path("/classify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"response": "{\"intent\":\"GENERATE_WORKFLOW\"}"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(url_path("/agents"))
            .respond_with(ResponseTemplate::new(500).set_body_string("exploded"))
            .mount(&server)
            .await;

        let state = state_with_mocks(&server).await;
        let events: Vec<StreamEvent> = pipeline_events(
            state,
            StreamChatRequest {
                content: "build a flow".to_string(),
                chat_id: None,
            },
        )
        .collect()
        .await;

        let n = events.len();
        assert!(n >= 2);
        assert!(matches!(events[n - 2], StreamEvent::Error { .. }));
        assert!(matches!(events[n - 1], StreamEvent::Done));
    }

    #[tokio::test]
    async fn tail_replays_existing_lines_from_beginning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("server.log"), "first line\nsecond line\n").unwrap();

        let stream = tail_log_lines(
            dir.path().to_string_lossy().to_string(),
            LogStreamQuery {
                source: "server.log".to_string(),
                from_beginning: true,
            },
        );
        futures::pin_mut!(stream);

        let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first["type"], "log");
        assert_eq!(first["line"], "first line");

        let second = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second["line"], "second line");
    }

    #[tokio::test]
    async fn tail_rejects_path_like_sources() {
        let stream = tail_log_lines(
            ".".to_string(),
            LogStreamQuery {
                source: "../secrets.log".to_string(),
                from_beginning: false,
            },
        );
        let events: Vec<serde_json::Value> = stream.collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "error");
    }
}
