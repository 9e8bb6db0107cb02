//! SF-002: Error types for plan loading and execution.

use crate::tools::ToolError;
use thiserror::Error;

/// A plan document could not be turned into step records.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("The type of file {filename} is not supported, only json or yaml is fine")]
    FileType { filename: String },

    #[error("Failed to read the file {filename}: Error message: {error}")]
    FileRead { filename: String, error: String },

    #[error("The content cannot be converted to dict format.")]
    NoDict,

    #[error("Loading content with YAML error: {0}")]
    YamlLoad(String),

    #[error("step {index} is malformed: {message}")]
    MalformedStep { index: usize, message: String },
}

/// A run failed before or during execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("step '{node}' depends on unknown step '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("dependency cycle detected involving: {}", .members.join(", "))]
    Cycle { members: Vec<String> },

    #[error("step '{node}' failed calling tool '{tool}': {source}")]
    Tool {
        node: String,
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("no step can make progress; still waiting on: {}", .remaining.join(", "))]
    Stalled { remaining: Vec<String> },

    #[error("step '{0}' completed more than once")]
    DuplicateCompletion(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sf002_plan_error_messages() {
        let e = PlanError::FileType {
            filename: "plan.txt".to_string(),
        };
        assert!(e.to_string().contains("plan.txt"));
        assert!(e.to_string().contains("only json or yaml"));
        assert_eq!(
            PlanError::NoDict.to_string(),
            "The content cannot be converted to dict format."
        );
    }

    #[test]
    fn test_sf002_cycle_message_lists_members() {
        let e = ExecutorError::Cycle {
            members: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(e.to_string(), "dependency cycle detected involving: a, b");
    }

    #[test]
    fn test_sf002_plan_error_converts() {
        let e: ExecutorError = PlanError::YamlLoad("bad".to_string()).into();
        assert!(matches!(e, ExecutorError::Plan(PlanError::YamlLoad(_))));
        assert!(e.to_string().contains("bad"));
    }
}
