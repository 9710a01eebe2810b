// SPDX-License-Identifier: MIT

//! Tool-name-based display-input projection (spec.md §4.C: "Extract a
//! *display input* from the parsed object via a tool-name-specific
//! projection").
//!
//! A small, extensible lookup from tool name to a field-selector function,
//! per spec.md §9 ("Dynamic dispatch... a small, extensible lookup from
//! tool name to a field-selector function").

use serde_json::Value;

/// Tool names recognised as file-reading tools, keyed by their path field.
const FILE_PATH_TOOLS: &[(&str, &str)] = &[
    ("Read", "file_path"),
    ("Edit", "file_path"),
    ("Write", "file_path"),
    ("file-read", "file_path"),
    ("NotebookEdit", "notebook_path"),
];

const SHELL_TOOLS: &[&str] = &["Bash", "shell"];

const WEB_FETCH_TOOLS: &[&str] = &["WebFetch"];

/// Project a tool's parsed input into a one-line display string.
///
/// Falls back to compact JSON for tools without a dedicated projection, or
/// when the expected field is missing or not a string.
pub fn display_input(tool_name: &str, input: &Value) -> String {
    if let Some((_, field)) = FILE_PATH_TOOLS.iter().find(|(name, _)| *name == tool_name) {
        if let Some(path) = input.get(field).and_then(Value::as_str) {
            return path.to_string();
        }
    }
    if SHELL_TOOLS.contains(&tool_name) {
        if let Some(command) = input.get("command").and_then(Value::as_str) {
            return command.to_string();
        }
    }
    if WEB_FETCH_TOOLS.contains(&tool_name) {
        if let Some(url) = input.get("url").and_then(Value::as_str) {
            return url.to_string();
        }
    }
    serde_json::to_string(input).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projects_file_path_for_read() {
        let input = json!({"file_path": "/a/b.rs"});
        assert_eq!(display_input("Read", &input), "/a/b.rs");
    }

    #[test]
    fn projects_file_path_for_file_read() {
        let input = json!({"file_path": "/a"});
        assert_eq!(display_input("file-read", &input), "/a");
    }

    #[test]
    fn projects_notebook_path_for_notebook_edit() {
        let input = json!({"notebook_path": "/a/nb.ipynb"});
        assert_eq!(display_input("NotebookEdit", &input), "/a/nb.ipynb");
    }

    #[test]
    fn projects_command_for_shell() {
        let input = json!({"command": "ls -la"});
        assert_eq!(display_input("Bash", &input), "ls -la");
    }

    #[test]
    fn projects_url_for_web_fetch() {
        let input = json!({"url": "https://example.com"});
        assert_eq!(display_input("WebFetch", &input), "https://example.com");
    }

    #[test]
    fn falls_back_to_raw_json_for_unknown_tool() {
        let input = json!({"query": "foo"});
        assert_eq!(display_input("WebSearch", &input), r#"{"query":"foo"}"#);
    }

    #[test]
    fn falls_back_to_raw_json_when_expected_field_missing() {
        let input = json!({"path_typo": "/a"});
        assert_eq!(display_input("Read", &input), r#"{"path_typo":"/a"}"#);
    }
}
