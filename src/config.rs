//! SF-016: `sopflow.yaml`: executor policy and tool declarations.
//!
//! Structural rules checked by [`validate_config`]:
//! - `executor.max_workers` must be at least 1
//! - `executor.result_node`, when given, must not be blank
//! - tool and parameter names must not be blank
//! - a declared command must not be blank

use crate::core::types::ExecutorConfig;
use crate::tools::ParamSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name looked up by the CLI.
pub const CONFIG_FILE: &str = "sopflow.yaml";

/// Root config document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SopflowConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub tools: IndexMap<String, ToolDecl>,
}

/// A tool as declared in config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDecl {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub input_parameters: IndexMap<String, ParamSpec>,

    #[serde(default)]
    pub output_parameters: IndexMap<String, ParamSpec>,

    /// Bash script run on invocation; declaration-only tools omit it
    #[serde(default)]
    pub command: Option<String>,
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a config file from disk.
pub fn parse_config_file(path: &Path) -> Result<SopflowConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse config from a string. An empty document is the default config.
pub fn parse_config(yaml: &str) -> Result<SopflowConfig, String> {
    if yaml.trim().is_empty() {
        return Ok(SopflowConfig::default());
    }
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &SopflowConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if config.executor.max_workers == 0 {
        push("executor.max_workers must be at least 1".to_string());
    }
    if let Some(node) = &config.executor.result_node {
        if node.trim().is_empty() {
            push("executor.result_node must not be blank".to_string());
        }
    }

    for (name, tool) in &config.tools {
        if name.trim().is_empty() {
            push("tool name must not be blank".to_string());
        }
        let params = tool
            .input_parameters
            .keys()
            .map(|p| ("input", p))
            .chain(tool.output_parameters.keys().map(|p| ("output", p)));
        for (kind, param) in params {
            if param.trim().is_empty() {
                push(format!("tool '{}' has a blank {} parameter name", name, kind));
            }
        }
        if tool.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            push(format!("tool '{}' has a blank command", name));
        }
    }

    errors
}

/// Load, parse and validate a config file in one step.
pub fn load_config(path: &Path) -> Result<SopflowConfig, String> {
    let config = parse_config_file(path)?;
    let errors = validate_config(&config);
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        return Err(format!(
            "{} has {} error(s):\n{}",
            path.display(),
            errors.len(),
            lines.join("\n")
        ));
    }
    Ok(config)
}
