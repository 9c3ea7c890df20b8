//! Heuristics for pulling YAML out of free-form model output.
//!
//! None of this is a YAML validator. The extractors tolerate stray prose,
//! partial fences and multi-document output, and always return something.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::sync::OnceLock;

/// One agent as described by an agents document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
}

/// Extract the YAML portion of a model response.
///
/// Tried in order, first match wins: a ```` ```yaml ```` fenced block, a bare
/// ```` ``` ```` fenced block, a run starting at `apiVersion:` up to the
/// first blank line, and finally the whole input. Always returns a trimmed
/// string, possibly empty.
pub fn extract_yaml(text: &str) -> String {
    if let Some(start) = text.find("```yaml") {
        let after = &text[start + "```yaml".len()..];
        let end = after.find("```").unwrap_or(after.len());
        return after[..end].trim().to_string();
    }

    if let Some(start) = text.find("```") {
        let after = &text[start + "```".len()..];
        let end = after.find("```").unwrap_or(after.len());
        return after[..end].trim().to_string();
    }

    if let Some(start) = text.find("apiVersion:") {
        let after = &text[start..];
        let end = after.find("\n\n").unwrap_or(after.len());
        return after[..end].trim().to_string();
    }

    text.trim().to_string()
}

fn name_fallback_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"name:\s*(\w+)").unwrap())
}

fn description_fallback_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Block-style descriptions only; terminated by the next name entry or
    // end of input.
    RE.get_or_init(|| Regex::new(r"(?s)description:\s*\|\s*\n\s*(.+?)(?:\nname:|\z)").unwrap())
}

/// Parse an agents document into `AgentInfo` records, in document order.
///
/// The primary path splits on the `---` document separator and keeps every
/// document carrying `metadata.name`, paired with `spec.description`. When
/// that yields nothing (malformed YAML included), a lossy regex pass over
/// `name:` / block `description:` entries takes over. Never fails.
pub fn parse_agent_infos(agents_yaml: &str) -> Vec<AgentInfo> {
    let mut infos = Vec::new();

    for block in agents_yaml.split("---") {
        if block.trim().is_empty() {
            continue;
        }
        let Ok(doc) = serde_yaml::from_str::<Value>(block) else {
            continue;
        };
        let Some(name) = doc
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        let description = doc
            .get("spec")
            .and_then(|s| s.get("description"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        infos.push(AgentInfo {
            name: name.to_string(),
            description: description.trim().to_string(),
        });
    }

    if !infos.is_empty() {
        return infos;
    }

    // Lossy fallback: positional zip of bare name/description matches.
    let names: Vec<&str> = name_fallback_re()
        .captures_iter(agents_yaml)
        .map(|c| c.get(1).unwrap().as_str())
        .collect();
    let descriptions: Vec<String> = description_fallback_re()
        .captures_iter(agents_yaml)
        .map(|c| c.get(1).unwrap().as_str().trim().to_string())
        .collect();

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| AgentInfo {
            name: name.to_string(),
            description: descriptions.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}
