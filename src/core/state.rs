//! SF-008: Run state: the workspace of bound outputs and the executor's task sets.

use super::error::ExecutorError;
use super::resolver::sink_nodes;
use super::types::{value_to_string, ActionGraph, CompletedAction, HistoryEntry};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;

/// Outputs of completed steps plus the ordered execution history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkSpace {
    pub operation_history: Vec<HistoryEntry>,

    /// Step name to parsed tool output. Written once per step.
    pub variable_space: IndexMap<String, Value>,

    pub last_operation: Option<String>,
}

impl WorkSpace {
    pub fn update(&mut self, history: HistoryEntry) {
        self.operation_history.push(history);
    }

    /// Bind a step's output. A step may only be bound once.
    pub fn bind(&mut self, name: &str, value: Value) -> Result<(), ExecutorError> {
        if self.variable_space.contains_key(name) {
            return Err(ExecutorError::DuplicateCompletion(name.to_string()));
        }
        self.variable_space.insert(name.to_string(), value);
        Ok(())
    }

    pub fn update_last_operation(&mut self, name: &str) {
        self.last_operation = Some(name.to_string());
    }

    /// Whether a step has a history entry.
    pub fn has_executed(&self, name: &str) -> bool {
        self.operation_history
            .iter()
            .any(|h| h.operation_name == name)
    }

    /// First value of `field` among the mapping outputs of `names`, in order.
    pub fn retrieve_variable<S: AsRef<str>>(&self, names: &[S], field: &str) -> Option<&Value> {
        names.iter().find_map(|name| match self.variable_space.get(name.as_ref()) {
            Some(Value::Object(map)) => map.get(field),
            _ => None,
        })
    }

    /// Render the most recent output for display.
    ///
    /// Falls back to every non-empty binding as `name: value` lines when the
    /// last step produced nothing.
    pub fn get_last_result(&self) -> String {
        let last = self
            .last_operation
            .as_deref()
            .and_then(|name| self.variable_space.get(name));

        match last {
            Some(value) if !is_empty_value(value) => render_output(value),
            Some(Value::Object(_)) => String::new(),
            _ => self
                .variable_space
                .iter()
                .filter(|(_, v)| !is_empty_value(v))
                .map(|(k, v)| format!("{}: {}\n", k, value_to_string(v)))
                .collect(),
        }
    }
}

/// Mapping outputs become one value per line, empty values dropped.
/// Any other non-empty output is rendered as-is.
pub fn render_output(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .values()
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .map(|s| s + "\n")
            .collect(),
        other => value_to_string(other),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

/// Mutable bookkeeping for one run. Owned by the coordinator; workers never
/// see it.
#[derive(Debug, Clone, Default)]
pub struct ExecutorState {
    pub remaining_tasks: IndexSet<String>,
    pub activated_tasks: IndexSet<String>,
    pub done_tasks: IndexSet<String>,
    pub skipped_tasks: IndexSet<String>,
    pub sop_graph: ActionGraph,
    pub workspace: WorkSpace,
}

impl ExecutorState {
    pub fn new(graph: ActionGraph) -> Self {
        Self {
            remaining_tasks: graph.names().cloned().collect(),
            sop_graph: graph,
            ..Default::default()
        }
    }

    /// Activation guard evaluated false: the step is done without running.
    pub fn mark_skipped(&mut self, name: &str) {
        self.remaining_tasks.shift_remove(name);
        self.done_tasks.insert(name.to_string());
        self.skipped_tasks.insert(name.to_string());
    }

    /// Step handed to a worker.
    pub fn mark_activated(&mut self, name: &str) {
        self.activated_tasks.insert(name.to_string());
    }

    /// Apply a worker's result: bind the output, record history, move sets.
    pub fn complete(&mut self, done: CompletedAction) -> Result<(), ExecutorError> {
        let CompletedAction {
            name,
            output,
            history,
            ..
        } = done;

        self.workspace.bind(&name, output.clone())?;
        self.workspace.update(history);
        self.workspace.update_last_operation(&name);

        if let Some(node) = self.sop_graph.actions.get_mut(&name) {
            node.output = Some(output);
        }
        self.remaining_tasks.shift_remove(&name);
        self.activated_tasks.shift_remove(&name);
        self.done_tasks.insert(name);
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_tasks.is_empty()
    }

    /// Steps that ran a tool, in completion order.
    pub fn executed_tasks(&self) -> impl Iterator<Item = &String> {
        self.done_tasks
            .iter()
            .filter(|name| !self.skipped_tasks.contains(*name))
    }

    /// The run's answer.
    ///
    /// A designated `result_node` that executed wins. Otherwise, when every
    /// sink step executed, their outputs are rendered in plan order (labelled
    /// when there is more than one). Anything else falls back to
    /// [`WorkSpace::get_last_result`].
    pub fn final_result(&self, result_node: Option<&str>) -> String {
        if let Some(value) = result_node.and_then(|n| self.workspace.variable_space.get(n)) {
            return render_output(value);
        }

        let sinks = sink_nodes(&self.sop_graph);
        let outputs: Vec<(&String, &Value)> = sinks
            .iter()
            .filter_map(|name| self.workspace.variable_space.get(name).map(|v| (name, v)))
            .collect();

        match outputs.as_slice() {
            [] => self.workspace.get_last_result(),
            [(_, value)] if sinks.len() == 1 => render_output(value),
            _ if outputs.len() == sinks.len() => outputs
                .iter()
                .map(|(name, value)| format!("{}:\n{}", name, render_output(value)))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => self.workspace.get_last_result(),
        }
    }
}
