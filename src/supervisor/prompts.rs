//! Prompt templates for the remote services.

use crate::extract::AgentInfo;

/// Classification prompt: user request plus both current documents (empty
/// string when absent) and strict JSON-only output instructions.
pub fn classification_prompt(
    user_input: &str,
    agents_yaml: &str,
    workflow_yaml: &str,
) -> String {
    format!(
        r#"You are an intent classifier. Determine if the user wants to GENERATE_WORKFLOW or EDIT_YAML.

User input: {user_input}

Current YAML files (if any):
Agents YAML:
{agents_yaml}

Workflow YAML:
{workflow_yaml}

Return ONLY valid JSON (no prose, no markdown) with the following schema:
{{
  "intent": "GENERATE_WORKFLOW" | "EDIT_YAML",
  "confidence": number,  // 0.0 to 1.0
  "reasoning": string
}}

Example valid responses:
{{"intent":"GENERATE_WORKFLOW","confidence":0.92,"reasoning":"User is asking to create a new flow"}}
{{"intent":"EDIT_YAML","confidence":0.87,"reasoning":"User wants to modify existing YAML"}}"#
    )
}

/// Workflow prompt: each agent enumerated as `agent<i>: <name> – <description>`
/// followed by the original request.
pub fn workflow_prompt(agents: &[AgentInfo], user_input: &str) -> String {
    let mut prompt = String::from("Create a workflow that uses the following agents:\n\n");
    for (i, agent) in agents.iter().enumerate() {
        prompt.push_str(&format!(
            "agent{}: {} – {}\n",
            i + 1,
            agent.name,
            agent.description
        ));
    }
    prompt.push_str(&format!("\nprompt: {user_input}"));
    prompt
}

/// Edit prompt: current document, its label, and the instruction.
pub fn edit_prompt(yaml_content: &str, file_label: &str, instruction: &str) -> String {
    let file_type = file_label.split('.').next().unwrap_or(file_label);
    format!(
        "Current YAML file (type: {file_type}):\n{yaml_content}\n\nUser instruction: {instruction}\n\nPlease apply the requested edit and return only the updated YAML file."
    )
}
