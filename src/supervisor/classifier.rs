use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::prompts;
use super::{Classification, Intent};
use crate::services::{AgentServiceClient, ServiceKind, UpstreamError};

/// Classifies a user request against the remote classification service.
///
/// Only transport-level problems surface as errors; a malformed response
/// body degrades to the deterministic default classification.
pub struct IntentClassifier {
    services: Arc<AgentServiceClient>,
}

/// Classification plus the raw service response, for callers that relay
/// model output to a stream.
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub classification: Classification,
    pub raw_response: String,
}

impl IntentClassifier {
    pub fn new(services: Arc<AgentServiceClient>) -> Self {
        Self { services }
    }

    pub async fn classify(
        &self,
        user_input: &str,
        agents_yaml: &str,
        workflow_yaml: &str,
    ) -> Result<ClassificationOutcome, UpstreamError> {
        let prompt = prompts::classification_prompt(user_input, agents_yaml, workflow_yaml);
        let raw_response = self
            .services
            .send_prompt(ServiceKind::Classifier, &prompt)
            .await?;

        let classification = parse_classification(&raw_response);
        debug!(
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            "Intent classified"
        );

        Ok(ClassificationOutcome {
            classification,
            raw_response,
        })
    }
}

/// Parse the classifier's JSON reply. Never fails: any shape problem yields
/// the GENERATE_WORKFLOW default with confidence 0.5 and a reasoning string
/// naming the parse failure.
pub fn parse_classification(raw: &str) -> Classification {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return Classification::parse_fallback(e),
    };

    let intent = match parsed.get("intent").and_then(Value::as_str) {
        Some(raw_intent) => match raw_intent.to_uppercase().as_str() {
            "EDIT_YAML" => Intent::EditYaml,
            // Unrecognized intents are coerced, never surfaced.
            _ => Intent::GenerateWorkflow,
        },
        None => Intent::GenerateWorkflow,
    };

    let confidence = match parsed.get("confidence") {
        None => 1.0,
        Some(value) => match coerce_confidence(value) {
            Some(confidence) => confidence,
            None => {
                return Classification::parse_fallback(format!(
                    "confidence is not a number: {value}"
                ))
            }
        },
    };

    let reasoning = match parsed.get("reasoning") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Classification {
        intent,
        confidence,
        reasoning,
    }
}

fn coerce_confidence(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
