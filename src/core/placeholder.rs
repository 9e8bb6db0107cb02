//! SF-006: `${node.field}` placeholder scanning and substitution.

use super::state::WorkSpace;
use super::types::{value_to_string, ToolArgs};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Matches `${...}`; the captured body must not contain braces or `^`.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{^}]*)\}").expect("placeholder pattern is valid"));

/// Substituted for a reference to a step with no mapping output.
pub const NO_VALUE: &str = "no value";

/// Appended when substitution left the expression unresolved.
pub const UNRESOLVED_HINT: &str = "\n [提示]：系统分析您的问题失败，原因可能是: \n①plugin调用不成功\
\n②LLM参数解析失败，\n③SOP字段配置错误。\n您可以尝试再次输入或者调整您的问题";

/// A parsed `${node.field}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub node: String,
    pub field: Option<String>,
}

impl Placeholder {
    fn from_body(body: &str) -> Self {
        match body.split_once('.') {
            Some((node, rest)) => Self {
                node: node.to_string(),
                field: Some(rest.split('.').next().unwrap_or_default().to_string()),
            },
            None => Self {
                node: body.to_string(),
                field: None,
            },
        }
    }
}

/// All placeholders referenced by `text`, in order of appearance.
pub fn find_placeholders(text: &str) -> Vec<Placeholder> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| Placeholder::from_body(m.as_str()))
        .collect()
}

/// Placeholders anywhere inside a JSON value (strings, arrays, objects).
pub fn find_placeholders_in_value(value: &Value) -> Vec<Placeholder> {
    match value {
        Value::String(s) => find_placeholders(s),
        Value::Array(items) => items.iter().flat_map(find_placeholders_in_value).collect(),
        Value::Object(map) => map.values().flat_map(find_placeholders_in_value).collect(),
        _ => Vec::new(),
    }
}

/// Replace every `${node.field}` in `expression` with the bound output value.
///
/// A field missing from a mapping output becomes an empty string; a step with
/// no output, or a non-mapping output, becomes [`NO_VALUE`]. `${node}` alone
/// substitutes the whole output.
pub fn sub_placeholder(expression: &str, workspace: &WorkSpace) -> String {
    let result = PLACEHOLDER
        .replace_all(expression, |caps: &regex::Captures| {
            let placeholder = Placeholder::from_body(&caps[1]);
            let bound = workspace.variable_space.get(&placeholder.node);
            match (bound, placeholder.field) {
                (Some(Value::Object(map)), Some(field)) => {
                    map.get(&field).map(value_to_string).unwrap_or_default()
                }
                (Some(value), None) if !value.is_null() => value_to_string(value),
                _ => NO_VALUE.to_string(),
            }
        })
        .into_owned();

    if is_unresolved(&result, expression) {
        return result + UNRESOLVED_HINT;
    }
    result
}

/// Substitution produced exactly the source text minus its braces.
fn is_unresolved(result: &str, expression: &str) -> bool {
    expression.contains('{')
        && expression.contains('}')
        && result == expression.replace(['{', '}'], "")
}

/// Substitute placeholders in every string inside a JSON value.
pub fn sub_placeholder_value(value: &Value, workspace: &WorkSpace) -> Value {
    match value {
        Value::String(s) => Value::String(sub_placeholder(s, workspace)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| sub_placeholder_value(v, workspace))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sub_placeholder_value(v, workspace)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve a step's tool arguments against the workspace.
pub fn sub_placeholder_args(input: &ToolArgs, workspace: &WorkSpace) -> ToolArgs {
    input
        .iter()
        .map(|(k, v)| {
            if v.is_null() {
                tracing::warn!("the value of [{}] is None", k);
            }
            (k.clone(), sub_placeholder_value(v, workspace))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn workspace() -> WorkSpace {
        let mut ws = WorkSpace::default();
        ws.variable_space
            .insert("stepA".to_string(), json!({"x": "42", "n": 7, "tags": ["a", "b"]}));
        ws.variable_space
            .insert("plain".to_string(), json!("just text"));
        ws
    }

    #[test]
    fn test_sf006_substitute_field() {
        assert_eq!(sub_placeholder("value is ${stepA.x}", &workspace()), "value is 42");
    }

    #[test]
    fn test_sf006_non_string_field_json_encoded() {
        let ws = workspace();
        assert_eq!(sub_placeholder("${stepA.n} > 3", &ws), "7 > 3");
        assert_eq!(sub_placeholder("${stepA.tags}", &ws), r#"["a","b"]"#);
    }

    #[test]
    fn test_sf006_missing_field_is_empty() {
        assert_eq!(sub_placeholder("[${stepA.y}]", &workspace()), "[]");
    }

    #[test]
    fn test_sf006_unknown_node_is_no_value() {
        assert_eq!(
            sub_placeholder("value is ${ghost.x}", &workspace()),
            "value is no value"
        );
    }

    #[test]
    fn test_sf006_scalar_output_is_no_value() {
        assert_eq!(sub_placeholder("${plain.x}", &workspace()), "no value");
    }

    #[test]
    fn test_sf006_whole_output() {
        let ws = workspace();
        assert_eq!(sub_placeholder("${plain}", &ws), "just text");
        assert_eq!(sub_placeholder("${ghost}", &ws), "no value");
    }

    #[test]
    fn test_sf006_literal_passthrough() {
        assert_eq!(sub_placeholder("no placeholders here", &workspace()), "no placeholders here");
    }

    #[test]
    fn test_sf006_unresolved_hint() {
        let ws = WorkSpace::default();
        // an empty body still matches and resolves to "no value"
        let out = sub_placeholder("${}x", &ws);
        assert!(!out.ends_with(UNRESOLVED_HINT));
        let out = sub_placeholder("{a}", &ws);
        assert!(out.starts_with("{a}"));
        assert!(!out.ends_with(UNRESOLVED_HINT));
        let ws = {
            let mut ws = WorkSpace::default();
            ws.variable_space.insert("s".to_string(), json!({"f": "$s.f"}));
            ws
        };
        let out = sub_placeholder("${s.f}", &ws);
        assert!(out.starts_with("$s.f"));
        assert!(out.ends_with(UNRESOLVED_HINT));
    }

    #[test]
    fn test_sf006_find_placeholders() {
        let found = find_placeholders("${a.x} and ${b.y.z} and ${c}");
        assert_eq!(
            found,
            vec![
                Placeholder { node: "a".into(), field: Some("x".into()) },
                Placeholder { node: "b".into(), field: Some("y".into()) },
                Placeholder { node: "c".into(), field: None },
            ]
        );
    }

    #[test]
    fn test_sf006_nested_values() {
        let ws = workspace();
        let v = json!({"list": ["${stepA.x}", 1], "inner": {"k": "${stepA.x}!"}, "n": 5});
        assert_eq!(find_placeholders_in_value(&v).len(), 2);
        let out = sub_placeholder_value(&v, &ws);
        assert_eq!(out, json!({"list": ["42", 1], "inner": {"k": "42!"}, "n": 5}));
    }

    #[test]
    fn test_sf006_args_keep_non_strings() {
        let ws = workspace();
        let mut args = ToolArgs::new();
        args.insert("q".to_string(), json!("${stepA.x}"));
        args.insert("limit".to_string(), json!(10));
        args.insert("none".to_string(), Value::Null);
        let out = sub_placeholder_args(&args, &ws);
        assert_eq!(out["q"], json!("42"));
        assert_eq!(out["limit"], json!(10));
        assert_eq!(out["none"], Value::Null);
    }

    proptest! {
        #[test]
        fn prop_sf006_text_without_placeholders_unchanged(s in "[a-zA-Z0-9 .,:!?]{0,40}") {
            prop_assert_eq!(sub_placeholder(&s, &WorkSpace::default()), s);
        }

        #[test]
        fn prop_sf006_resolved_field_embedded(prefix in "[a-z ]{0,10}", v in "[a-z0-9]{1,10}") {
            let mut ws = WorkSpace::default();
            ws.variable_space.insert("n".to_string(), json!({"f": v.clone()}));
            let out = sub_placeholder(&format!("{prefix}${{n.f}}"), &ws);
            prop_assert_eq!(out, format!("{prefix}{v}"));
        }
    }
}
