//! SF-010: Tool boundary: API descriptions, the registry, and invocation.
//!
//! The executor only sees [`ToolManager`]. [`ToolRegistry`] is the stock
//! implementation: an explicit, constructed table of tools with no global
//! state, built either in code or from the `tools:` section of `sopflow.yaml`.

pub mod command;

use crate::config::SopflowConfig;
use crate::core::types::ToolArgs;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use command::CommandTool;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("The tool {0} doesn't exist.")]
    NotFound(String),

    #[error("tool '{0}' is already registered")]
    Duplicate(String),

    #[error("tool '{0}' has no command to run")]
    NoCommand(String),

    #[error("tool '{tool}' could not start: {message}")]
    Spawn { tool: String, message: String },

    #[error("tool '{tool}' exited with code {code}: {stderr}")]
    Exit {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}

/// Text generation handle forwarded to tools that need one.
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, String>;
}

/// One declared tool parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,
}

/// What a planner and the validator know about a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub input_parameters: IndexMap<String, ParamSpec>,

    #[serde(default)]
    pub output_parameters: IndexMap<String, ParamSpec>,
}

impl ApiSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    pub fn with_inputs(mut self, names: &[&str]) -> Self {
        for n in names {
            self.input_parameters.insert(n.to_string(), ParamSpec::default());
        }
        self
    }

    pub fn with_outputs(mut self, names: &[&str]) -> Self {
        for n in names {
            self.output_parameters.insert(n.to_string(), ParamSpec::default());
        }
        self
    }
}

/// Lookup and invocation contract used by the executor and validator.
pub trait ToolManager: Send + Sync {
    fn get_api_by_name(&self, name: &str) -> Option<&ApiSpec>;

    fn executor_call(
        &self,
        tool_name: &str,
        args: &ToolArgs,
        llm: Option<&dyn LanguageModel>,
    ) -> Result<Value, ToolError>;
}

/// A callable tool. Output may be a JSON string; the executor parses it.
pub trait Tool: Send + Sync {
    fn call(&self, args: &ToolArgs, llm: Option<&dyn LanguageModel>) -> Result<Value, ToolError>;
}

/// Adapts a plain closure that has no use for the language model.
struct FnTool<F>(F);

impl<F> Tool for FnTool<F>
where
    F: Fn(&ToolArgs) -> Result<Value, ToolError> + Send + Sync,
{
    fn call(&self, args: &ToolArgs, _llm: Option<&dyn LanguageModel>) -> Result<Value, ToolError> {
        (self.0)(args)
    }
}

/// Tool table keyed by name, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    specs: IndexMap<String, ApiSpec>,
    tools: IndexMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ApiSpec, tool: impl Tool + 'static) -> Result<(), ToolError> {
        if self.specs.contains_key(&spec.name) {
            return Err(ToolError::Duplicate(spec.name));
        }
        self.tools.insert(spec.name.clone(), Box::new(tool));
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn register_fn<F>(&mut self, spec: ApiSpec, f: F) -> Result<(), ToolError>
    where
        F: Fn(&ToolArgs) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.register(spec, FnTool(f))
    }

    /// Build from config: every declared tool runs its `command` through bash.
    pub fn from_config(config: &SopflowConfig) -> Result<Self, String> {
        let mut registry = Self::new();
        for (name, decl) in &config.tools {
            let spec = ApiSpec {
                name: name.clone(),
                description: decl.description.clone(),
                input_parameters: decl.input_parameters.clone(),
                output_parameters: decl.output_parameters.clone(),
            };
            let tool = CommandTool::new(name, decl.command.as_deref());
            registry
                .register(spec, tool)
                .map_err(|e| format!("tool registry: {}", e))?;
        }
        Ok(registry)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.specs.keys()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl ToolManager for ToolRegistry {
    fn get_api_by_name(&self, name: &str) -> Option<&ApiSpec> {
        self.specs.get(name)
    }

    fn executor_call(
        &self,
        tool_name: &str,
        args: &ToolArgs,
        llm: Option<&dyn LanguageModel>,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;
        tool.call(args, llm)
    }
}
