//! SF-001: Plan types: step records, nodes, graph, history, executor policy.
//!
//! A plan is a sequence of step records produced by an upstream planner. Each
//! record becomes a [`Node`]; the [`ActionGraph`] keeps nodes in declaration
//! order. Work handed to a tool is an immutable [`PendingAction`] snapshot and
//! comes back as a [`CompletedAction`].

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// A raw step record exactly as it appeared in the plan document.
pub type RawStep = serde_json::Map<String, Value>;

/// Tool arguments, keyed by parameter name in declaration order.
pub type ToolArgs = IndexMap<String, Value>;

/// Prompt used when a step does not declare one.
pub const DEFAULT_PROMPT: &str = "当前任务：[{{Operation.name}}]，相关参数信息如下：{{Operation.input}}";

// ============================================================================
// Nodes
// ============================================================================

/// One step of the plan, bound to exactly one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique step name
    pub name: String,

    /// Declared ordinal (informational only)
    #[serde(default)]
    pub step: Option<Value>,

    /// Registered tool to invoke
    pub toolname: String,

    /// Tool arguments: literals or `${node.field}` placeholders
    #[serde(default)]
    pub input: ToolArgs,

    /// Parsed tool output, set once the step completes
    #[serde(default)]
    pub output: Option<Value>,

    /// Steps that must complete first
    #[serde(default)]
    pub dependency: IndexSet<String>,

    /// Activation guard; when it evaluates false the step is skipped
    #[serde(default)]
    pub activate: Option<String>,

    /// Prompt template tied to this step
    pub prompt: String,

    /// Planner-supplied description
    #[serde(default)]
    pub description: Option<String>,
}

impl Node {
    /// Render the prompt against resolved arguments, filling in
    /// `{{Operation.name}}` and `{{Operation.input}}`.
    pub fn render_prompt(&self, input: &ToolArgs) -> Result<String, String> {
        let input = serde_json::to_string(input)
            .map_err(|e| format!("cannot encode input of '{}': {}", self.name, e))?;
        super::resolver::resolve_template(&self.prompt, &self.name, &input)
    }

    /// Declared step ordinal as display text.
    pub fn step_label(&self) -> String {
        self.step.as_ref().map(value_to_string).unwrap_or_default()
    }
}

/// The plan's nodes keyed by name, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ActionGraph {
    pub actions: IndexMap<String, Node>,
}

impl ActionGraph {
    pub fn new(actions: IndexMap<String, Node>) -> Self {
        Self { actions }
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.actions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.actions.keys()
    }
}

// ============================================================================
// Dispatch snapshots
// ============================================================================

/// A ready step with its placeholders resolved, handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub name: String,
    pub step: Option<Value>,
    pub toolname: String,
    pub input: ToolArgs,
    pub dependency: Vec<String>,
    pub activate: Option<String>,
    /// Step prompt rendered against the resolved input
    pub prompt: String,
}

/// What a worker hands back after the tool returns.
#[derive(Debug, Clone)]
pub struct CompletedAction {
    pub name: String,
    pub output: Value,
    pub history: HistoryEntry,
    pub elapsed: Duration,
}

/// Per-step execution record kept in the workspace history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub operation_name: String,
    pub dependency: Vec<String>,
    pub input: ToolArgs,
    pub output: Value,
    #[serde(default)]
    pub activate: Option<String>,
    #[serde(default)]
    pub prompt: String,
}

// ============================================================================
// Executor policy
// ============================================================================

/// Executor policy, loaded from the `executor:` section of `sopflow.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Worker pool size for concurrent runs
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Step whose output is the run's answer
    #[serde(default)]
    pub result_node: Option<String>,

    /// Default CLI mode: concurrent wavefronts or one step at a time
    #[serde(default = "default_true")]
    pub concurrent: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            result_node: None,
            concurrent: true,
        }
    }
}

fn default_max_workers() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// How a run dispatches ready steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Sequential,
    Concurrent,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

// ============================================================================
// Value helper
// ============================================================================

/// Render a JSON value as substitution text: strings raw, everything else JSON.
pub fn value_to_string(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(name: &str, deps: &[&str]) -> Node {
        Node {
            name: name.to_string(),
            step: Some(json!(1)),
            toolname: "Echo".to_string(),
            input: IndexMap::from([("q".to_string(), json!("hi"))]),
            output: None,
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            activate: None,
            prompt: DEFAULT_PROMPT.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_sf001_value_to_string() {
        assert_eq!(value_to_string(&json!("hello")), "hello");
        assert_eq!(value_to_string(&json!(42)), "42");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "");
        assert_eq!(value_to_string(&json!(["a", "b"])), r#"["a","b"]"#);
    }

    #[test]
    fn test_sf001_executor_config_defaults() {
        let c = ExecutorConfig::default();
        assert_eq!(c.max_workers, 5);
        assert!(c.result_node.is_none());
        assert!(c.concurrent);

        let parsed: ExecutorConfig = serde_yaml_ng::from_str("result_node: answer").unwrap();
        assert_eq!(parsed.max_workers, 5);
        assert_eq!(parsed.result_node.as_deref(), Some("answer"));
    }

    #[test]
    fn test_sf001_render_default_prompt() {
        let n = node("fetch", &[]);
        let prompt = n.render_prompt(&n.input).unwrap();
        assert_eq!(prompt, r#"当前任务：[fetch]，相关参数信息如下：{"q":"hi"}"#);

        let resolved = IndexMap::from([("q".to_string(), json!("resolved")), ("n".to_string(), json!(2))]);
        let prompt = n.render_prompt(&resolved).unwrap();
        assert!(prompt.ends_with(r#"{"q":"resolved","n":2}"#));
    }

    #[test]
    fn test_sf001_step_label() {
        let mut n = node("a", &[]);
        assert_eq!(n.step_label(), "1");
        n.step = None;
        assert_eq!(n.step_label(), "");
    }

    #[test]
    fn test_sf001_graph_order() {
        let mut actions = IndexMap::new();
        actions.insert("b".to_string(), node("b", &[]));
        actions.insert("a".to_string(), node("a", &["b"]));
        let graph = ActionGraph::new(actions);
        assert_eq!(graph.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(graph.contains("a"));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_sf001_run_mode_display() {
        assert_eq!(RunMode::Sequential.to_string(), "sequential");
        assert_eq!(RunMode::Concurrent.to_string(), "concurrent");
    }

    #[test]
    fn test_sf001_history_entry_serde() {
        let entry = HistoryEntry {
            operation_name: "fetch".to_string(),
            dependency: vec![],
            input: IndexMap::new(),
            output: json!({"output": "hi"}),
            activate: None,
            prompt: String::new(),
        };
        let text = serde_json::to_string(&entry).unwrap();
        assert!(text.contains("\"operation_name\":\"fetch\""));
    }
}
