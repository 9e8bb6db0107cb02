//! SF-009: Plan validation against the tool registry, and tool invocation.
//!
//! Validation is advisory: findings accumulate per step and come back as a
//! numbered report. Nothing here stops a run.

use super::parser::{parse_dependency, parse_node};
use super::placeholder::find_placeholders_in_value;
use super::resolver::find_cycle_members;
use super::types::{value_to_string, ActionGraph, PendingAction, RawStep};
use crate::tools::{LanguageModel, ToolError, ToolManager};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

const NO_NAME: &str =
    "some nodes did not assign a value to a necessary parameter [name] and [toolname].";

fn invalid_tool(tool: &str) -> String {
    format!("The tool {} doesn't exist.", tool)
}

fn invalid_input_param(param: &str, tool: &str) -> String {
    format!(
        "Additional parameters {} were input during the calling tool {}.",
        param, tool
    )
}

fn invalid_output_param(param: &str, node: &str) -> String {
    format!(
        "These parameters {} do not exist in the output of the node {}.",
        param, node
    )
}

fn node_conflict(name: &str) -> String {
    format!("the Node name {} is duplicated.", name)
}

fn invalid_dependency(node: &str) -> String {
    format!(
        "The current node depends on node {} that does not exist in the plan.",
        node
    )
}

fn node_not_dependent(node: &str) -> String {
    format!(
        "The output of node {} is being used, but it is not within the dependency",
        node
    )
}

fn in_cycle(members: &[String]) -> String {
    format!(
        "The dependencies of this node form a cycle: {}.",
        members.join(" -> ")
    )
}

fn input_not_mapping(input: &Value) -> String {
    format!("The input must be a mapping of parameter names, got {}.", input)
}

/// Validation findings, grouped by step name in first-error order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorInfo {
    pub store: IndexMap<String, Vec<String>>,
}

impl ErrorInfo {
    pub fn add(&mut self, operation: &str, error: String) {
        tracing::error!("{}", error);
        self.store
            .entry(operation.to_string())
            .or_default()
            .push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Numbered per-step report; empty when there are no findings.
    pub fn report(&self) -> String {
        self.store
            .iter()
            .enumerate()
            .map(|(i, (key, msgs))| {
                format!(
                    "{}. 步骤{}的生成存在以下几个问题：\n{}\n",
                    i + 1,
                    key,
                    msgs.join("\n")
                )
            })
            .collect()
    }
}

/// Validates plans and forwards ready steps to the tool manager.
#[derive(Clone)]
pub struct SopHandler {
    tool_manager: Arc<dyn ToolManager>,
}

impl SopHandler {
    pub fn new(tool_manager: Arc<dyn ToolManager>) -> Self {
        Self { tool_manager }
    }

    /// Call the step's tool with its resolved arguments. No retries.
    pub fn invoke(
        &self,
        action: &PendingAction,
        llm: Option<&dyn LanguageModel>,
    ) -> Result<Value, ToolError> {
        self.tool_manager
            .executor_call(&action.toolname, &action.input, llm)
    }

    /// Validate a plan and render the findings. Empty means valid.
    pub fn check_valid_sop(&self, operations: &[RawStep]) -> String {
        let report = self.check_func_param(operations).report();
        if !report.is_empty() {
            tracing::error!("{}", report);
        }
        report
    }

    /// Collect every finding for the plan.
    pub fn check_func_param(&self, operations: &[RawStep]) -> ErrorInfo {
        let mut info = ErrorInfo::default();
        let mut opt_map: IndexMap<String, &RawStep> = IndexMap::new();

        for op in operations {
            let name = text(op, "name");
            let tool = text(op, "toolname");
            let key = name.clone().unwrap_or_else(|| "None".to_string());

            if name.is_none() || tool.is_none() {
                info.add(&key, NO_NAME.to_string());
            }
            let Some(name) = name else { continue };
            if opt_map.contains_key(&name) {
                info.add(&name, node_conflict(&name));
                continue;
            }
            if tool.is_some() {
                opt_map.insert(name, op);
            }
        }

        for op in operations {
            let key = text(op, "name").unwrap_or_else(|| "None".to_string());
            let dependency = parse_dependency(op.get("dependency"));

            for dep in &dependency {
                if !opt_map.contains_key(dep) {
                    info.add(&key, invalid_dependency(dep));
                }
            }

            let input = match op.get("input") {
                None | Some(Value::Null) => None,
                Some(Value::Object(map)) => Some(map),
                Some(other) => {
                    info.add(&key, input_not_mapping(other));
                    None
                }
            };

            let Some(tool) = text(op, "toolname") else { continue };
            let Some(api) = self.tool_manager.get_api_by_name(&tool) else {
                info.add(&key, invalid_tool(&tool));
                continue;
            };

            for (param, value) in input.into_iter().flatten() {
                if value.is_null() {
                    continue;
                }
                if !api.input_parameters.contains_key(param) {
                    info.add(&key, invalid_input_param(param, &tool));
                }
                for holder in find_placeholders_in_value(value) {
                    if !dependency.contains(&holder.node) {
                        info.add(&key, node_not_dependent(&holder.node));
                    }
                    if let Some(field) = &holder.field {
                        if !self.produces(opt_map.get(&holder.node).copied(), field) {
                            info.add(&key, invalid_output_param(field, &holder.node));
                        }
                    }
                }
            }
        }

        let graph = ActionGraph::new(
            opt_map
                .values()
                .enumerate()
                .filter_map(|(i, op)| parse_node(i, op).ok())
                .map(|node| (node.name.clone(), node))
                .collect(),
        );
        let members = find_cycle_members(&graph);
        for name in &members {
            info.add(name, in_cycle(&members));
        }

        info
    }

    /// Whether the referenced step's tool declares `field` as an output.
    /// Unknown steps and tools are reported elsewhere, so they pass here.
    fn produces(&self, op: Option<&RawStep>, field: &str) -> bool {
        let api = op
            .and_then(|op| text(op, "toolname"))
            .and_then(|tool| self.tool_manager.get_api_by_name(&tool));
        match api {
            Some(api) => api.output_parameters.contains_key(field),
            None => true,
        }
    }
}

/// A present, non-blank text field of a step record.
fn text(op: &RawStep, key: &str) -> Option<String> {
    op.get(key)
        .filter(|v| !v.is_null())
        .map(value_to_string)
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loader::fetch_str_content;
    use crate::tools::{ApiSpec, ToolRegistry};
    use serde_json::json;

    fn handler() -> SopHandler {
        let mut reg = ToolRegistry::new();
        reg.register_fn(
            ApiSpec::new("FlightSearch", "")
                .with_inputs(&["city", "days"])
                .with_outputs(&["flight_number", "count"]),
            |_| Ok(json!({"flight_number": "CA123", "count": 1})),
        )
        .unwrap();
        reg.register_fn(
            ApiSpec::new("Booking", "")
                .with_inputs(&["flight_number"])
                .with_outputs(&["status"]),
            |args| Ok(json!({"status": format!("booked {}", args["flight_number"])})),
        )
        .unwrap();
        SopHandler::new(Arc::new(reg))
    }

    fn check(yaml: &str) -> ErrorInfo {
        handler().check_func_param(&fetch_str_content(yaml).unwrap())
    }

    #[test]
    fn test_sf009_valid_plan() {
        let plan = r#"
- name: search
  toolname: FlightSearch
  input: {city: Beijing}
- name: book
  toolname: Booking
  input: {flight_number: "${search.flight_number}"}
  dependency: [search]
"#;
        assert!(check(plan).is_empty());
        assert_eq!(
            handler().check_valid_sop(&fetch_str_content(plan).unwrap()),
            ""
        );
    }

    #[test]
    fn test_sf009_unknown_tool_reported() {
        let info = check("- {name: a, toolname: Teleport, input: {x: 1}}");
        assert_eq!(info.store["a"], vec!["The tool Teleport doesn't exist."]);
    }

    #[test]
    fn test_sf009_unknown_tool_without_inputs() {
        let info = check("- {name: a, toolname: Teleport}");
        assert_eq!(info.store["a"].len(), 1);
    }

    #[test]
    fn test_sf009_duplicate_names() {
        let info = check(
            r#"
- {name: a, toolname: FlightSearch}
- {name: a, toolname: FlightSearch}
"#,
        );
        assert_eq!(info.store["a"], vec!["the Node name a is duplicated."]);
    }

    #[test]
    fn test_sf009_missing_name_or_tool() {
        let info = check(
            r#"
- {toolname: FlightSearch}
- {name: b}
"#,
        );
        assert_eq!(info.store["None"], vec![NO_NAME]);
        assert_eq!(info.store["b"], vec![NO_NAME]);
    }

    #[test]
    fn test_sf009_extra_input_param() {
        let info = check("- {name: a, toolname: FlightSearch, input: {city: X, seat: 1A}}");
        assert_eq!(
            info.store["a"],
            vec!["Additional parameters seat were input during the calling tool FlightSearch."]
        );
    }

    #[test]
    fn test_sf009_placeholder_rules() {
        let info = check(
            r#"
- name: search
  toolname: FlightSearch
- name: book
  toolname: Booking
  input: {flight_number: "${search.price}"}
"#,
        );
        let msgs = &info.store["book"];
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].contains("The output of node search is being used"));
        assert_eq!(
            msgs[1],
            "These parameters price do not exist in the output of the node search."
        );
    }

    #[test]
    fn test_sf009_unknown_dependency() {
        let info = check("- {name: a, toolname: FlightSearch, dependency: [ghost, null]}");
        assert_eq!(
            info.store["a"],
            vec!["The current node depends on node ghost that does not exist in the plan."]
        );
    }

    #[test]
    fn test_sf009_cycle_reported() {
        let info = check(
            r#"
- {name: a, toolname: FlightSearch, dependency: [b]}
- {name: b, toolname: FlightSearch, dependency: [a]}
"#,
        );
        assert!(info.store["a"][0].contains("cycle: a -> b"));
        assert!(info.store["b"][0].contains("cycle"));
    }

    #[test]
    fn test_sf009_input_not_mapping() {
        let info = check("- {name: a, toolname: FlightSearch, input: [1, 2]}");
        assert!(info.store["a"][0].contains("must be a mapping"));
    }

    #[test]
    fn test_sf009_report_format() {
        let report = handler().check_valid_sop(
            &fetch_str_content(
                r#"
- {name: a, toolname: Teleport}
- {name: b, toolname: FlightSearch, dependency: [zzz]}
"#,
            )
            .unwrap(),
        );
        assert_eq!(
            report,
            "1. 步骤a的生成存在以下几个问题：\nThe tool Teleport doesn't exist.\n\
             2. 步骤b的生成存在以下几个问题：\n\
             The current node depends on node zzz that does not exist in the plan.\n"
        );
    }

    #[test]
    fn test_sf009_fresh_findings_per_call() {
        let h = handler();
        let bad = fetch_str_content("- {name: a, toolname: Teleport}").unwrap();
        assert_eq!(h.check_func_param(&bad).store.len(), 1);
        assert_eq!(h.check_func_param(&bad).store["a"].len(), 1);
    }

    #[test]
    fn test_sf009_invoke() {
        let h = handler();
        let action = PendingAction {
            name: "book".to_string(),
            step: None,
            toolname: "Booking".to_string(),
            input: [("flight_number".to_string(), json!("CA123"))].into_iter().collect(),
            dependency: vec![],
            activate: None,
            prompt: String::new(),
        };
        let out = h.invoke(&action, None).unwrap();
        assert_eq!(out, json!({"status": "booked \"CA123\""}));
    }
}
