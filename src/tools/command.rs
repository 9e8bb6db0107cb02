//! SF-011: Shell command tools.
//!
//! The command is piped to `bash` on stdin. Each argument is exported as
//! `ARG_<NAME>` (upper-cased, non-alphanumerics mapped to `_`) and the whole
//! argument map as JSON in `SOPFLOW_INPUT`. Stdout is the tool output.

use super::{LanguageModel, Tool, ToolError};
use crate::core::types::{value_to_string, ToolArgs};
use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};

/// Output from running a command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A tool backed by a bash script.
#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    script: Option<String>,
}

impl CommandTool {
    pub fn new(name: &str, script: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            script: script.map(str::to_string),
        }
    }
}

impl Tool for CommandTool {
    fn call(&self, args: &ToolArgs, _llm: Option<&dyn LanguageModel>) -> Result<Value, ToolError> {
        let script = self
            .script
            .as_deref()
            .ok_or_else(|| ToolError::NoCommand(self.name.clone()))?;

        let out = exec_bash(script, &arg_env(args)).map_err(|message| ToolError::Spawn {
            tool: self.name.clone(),
            message,
        })?;

        if !out.success() {
            return Err(ToolError::Exit {
                tool: self.name.clone(),
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(Value::String(out.stdout.trim_end_matches('\n').to_string()))
    }
}

/// Environment exported to a command for the given arguments.
pub fn arg_env(args: &ToolArgs) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = args
        .iter()
        .map(|(k, v)| (env_name(k), value_to_string(v)))
        .collect();
    let input = serde_json::to_string(args).unwrap_or_else(|_| "{}".to_string());
    env.push(("SOPFLOW_INPUT".to_string(), input));
    env
}

fn env_name(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("ARG_{}", cleaned)
}

/// Run a script via `bash` with extra environment variables.
pub fn exec_bash(script: &str, env: &[(String, String)]) -> Result<ExecOutput, String> {
    let mut child = Command::new("bash")
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn bash: {}", e))?;

    if let Some(ref mut stdin) = child.stdin {
        stdin
            .write_all(script.as_bytes())
            .map_err(|e| format!("stdin write error: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("wait error: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_sf011_exec_echo() {
        let out = exec_bash("echo hello", &[]).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_sf011_exec_failure() {
        let out = exec_bash("echo oops >&2; exit 42", &[]).unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 42);
        assert!(out.stderr.contains("oops"));
    }

    #[test]
    fn test_sf011_env_names() {
        assert_eq!(env_name("city"), "ARG_CITY");
        assert_eq!(env_name("flight-no.x"), "ARG_FLIGHT_NO_X");
        let env = arg_env(&args(&[("q", json!("hi")), ("n", json!(3))]));
        assert_eq!(env[0], ("ARG_Q".to_string(), "hi".to_string()));
        assert_eq!(env[1], ("ARG_N".to_string(), "3".to_string()));
        assert_eq!(env[2], ("SOPFLOW_INPUT".to_string(), r#"{"q":"hi","n":3}"#.to_string()));
    }

    #[test]
    fn test_sf011_tool_receives_args() {
        let tool = CommandTool::new("Echo", Some(r#"printf '{"output": "%s"}' "$ARG_Q""#));
        let out = tool.call(&args(&[("q", json!("hi"))]), None).unwrap();
        assert_eq!(out, json!(r#"{"output": "hi"}"#));
    }

    #[test]
    fn test_sf011_tool_reads_json_input() {
        let tool = CommandTool::new("Dump", Some("echo \"$SOPFLOW_INPUT\""));
        let out = tool.call(&args(&[("a", json!([1, 2]))]), None).unwrap();
        assert_eq!(out, json!(r#"{"a":[1,2]}"#));
    }

    #[test]
    fn test_sf011_tool_nonzero_exit() {
        let tool = CommandTool::new("Fail", Some("echo broken >&2\nexit 3"));
        let err = tool.call(&ToolArgs::new(), None).unwrap_err();
        match err {
            ToolError::Exit { tool, code, stderr } => {
                assert_eq!(tool, "Fail");
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sf011_tool_without_command() {
        let tool = CommandTool::new("Declared", None);
        let err = tool.call(&ToolArgs::new(), None).unwrap_err();
        assert!(matches!(err, ToolError::NoCommand(_)));
    }
}
