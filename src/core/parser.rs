//! SF-004: Plan parsing: raw step records into typed nodes.
//!
//! Recognized fields missing from a record get defaults. Null dependency
//! entries are dropped, a scalar dependency becomes a one-element list, and a
//! step without a prompt gets [`DEFAULT_PROMPT`]. Cycles are not checked here;
//! see the resolver.

use super::error::PlanError;
use super::types::*;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

/// Parse step records into an ordered action graph.
///
/// Later records with a name already seen replace the earlier node in place.
pub fn parse(raw: &[RawStep]) -> Result<ActionGraph, PlanError> {
    let mut actions = IndexMap::new();
    for (index, record) in raw.iter().enumerate() {
        let node = parse_node(index, record)?;
        actions.insert(node.name.clone(), node);
    }
    Ok(ActionGraph::new(actions))
}

/// Parse a single step record.
pub fn parse_node(index: usize, record: &RawStep) -> Result<Node, PlanError> {
    let text_field = |key: &str| record.get(key).map(value_to_string).unwrap_or_default();

    let input = match record.get("input") {
        None | Some(Value::Null) => IndexMap::new(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(other) => {
            return Err(PlanError::MalformedStep {
                index,
                message: format!("input must be a mapping, got {}", other),
            })
        }
    };

    let prompt = match record.get("prompt") {
        Some(Value::String(p)) if !p.is_empty() => p.clone(),
        _ => DEFAULT_PROMPT.to_string(),
    };

    let activate = match record.get("activate") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(other) => Some(value_to_string(other)),
    };

    let description = match record.get("description") {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };

    Ok(Node {
        name: text_field("name"),
        step: record.get("step").filter(|v| !v.is_null()).cloned(),
        toolname: text_field("toolname"),
        input,
        output: record.get("output").filter(|v| !v.is_null()).cloned(),
        dependency: parse_dependency(record.get("dependency")),
        activate,
        prompt,
        description,
    })
}

/// Normalize a dependency field: nulls and blanks dropped, duplicates removed.
pub fn parse_dependency(value: Option<&Value>) -> IndexSet<String> {
    let items: Vec<&Value> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };
    items
        .into_iter()
        .filter(|v| !v.is_null())
        .map(value_to_string)
        .filter(|s| !s.trim().is_empty())
        .collect()
}
