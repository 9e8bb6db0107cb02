//! SF-003: Plan loading: inline (optionally fenced) text or a plan file.
//!
//! Content that names an existing file relative to the working directory is
//! read from disk and dispatched on extension; anything else is treated as
//! inline YAML, with a surrounding ```` ```yaml ```` fence stripped if present.

use super::error::PlanError;
use super::types::RawStep;
use serde_json::Value;
use std::path::Path;

const YAML_FENCE: &str = "```yaml";
const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Load step records from a plan path or inline plan text.
pub fn load_plan(content: &str) -> Result<Vec<RawStep>, PlanError> {
    let candidate = Path::new(content.trim());
    if !content.contains('\n') && candidate.is_file() {
        fetch_file_content(candidate)
    } else {
        fetch_str_content(content)
    }
}

/// Parse inline plan text, stripping a fenced code block if one is present.
pub fn fetch_str_content(content: &str) -> Result<Vec<RawStep>, PlanError> {
    let body = strip_fence(content);
    let lines: Vec<&str> = body
        .trim_matches('\n')
        .lines()
        .skip_while(|l| is_fence_line(l))
        .collect();
    let end = lines
        .iter()
        .rposition(|l| !is_fence_line(l))
        .map_or(0, |i| i + 1);
    let text = lines[..end].join("\n");

    let data: Value = serde_yaml_ng::from_str(&text).map_err(|e| {
        tracing::error!("plan YAML block is invalid: {}", e);
        PlanError::YamlLoad(e.to_string())
    })?;
    into_steps(data)
}

/// Read a `.yaml`/`.yml` or `.json` plan file.
pub fn fetch_file_content(path: &Path) -> Result<Vec<RawStep>, PlanError> {
    let filename = path.display().to_string();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let read = |path: &Path| {
        std::fs::read_to_string(path).map_err(|e| PlanError::FileRead {
            filename: filename.clone(),
            error: e.to_string(),
        })
    };

    let data: Value = match extension.as_str() {
        "yaml" | "yml" => {
            let text = read(path)?;
            serde_yaml_ng::from_str(&text).map_err(|e| PlanError::FileRead {
                filename: filename.clone(),
                error: e.to_string(),
            })?
        }
        "json" => {
            let text = read(path)?;
            serde_json::from_str(&text).map_err(|e| PlanError::FileRead {
                filename: filename.clone(),
                error: e.to_string(),
            })?
        }
        _ => {
            let err = PlanError::FileType { filename };
            tracing::error!("{}", err);
            return Err(err);
        }
    };
    into_steps(data).inspect_err(|e| tracing::error!("{}", e))
}

/// Slice out the body of the first fenced block, if any.
fn strip_fence(content: &str) -> &str {
    for marker in [YAML_FENCE, JSON_FENCE, FENCE] {
        if let Some(start) = content.find(marker) {
            let body_start = start + marker.len();
            if let Some(end) = content.rfind(FENCE) {
                if end >= body_start {
                    return &content[body_start..end];
                }
            }
        }
    }
    content
}

fn is_fence_line(line: &str) -> bool {
    let l = line.trim();
    l == YAML_FENCE || l == JSON_FENCE || l == FENCE
}

/// A plan document must be a sequence of mappings.
fn into_steps(data: Value) -> Result<Vec<RawStep>, PlanError> {
    match data {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                _ => Err(PlanError::NoDict),
            })
            .collect(),
        _ => Err(PlanError::NoDict),
    }
}
