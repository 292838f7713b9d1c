//! Extracting activity from decoded events
//!
//! Events come in two shapes:
//!
//! - flat lines, e.g. `{"kind": "tool_use", "name": "Write", "input": {...}}`
//! - assistant messages that embed content blocks, e.g.
//!   `{"type": "assistant", "message": {"content": [{"type": "tool_use", ...}]}}`
//!
//! Both are handled everywhere below.

use crate::format::truncate_chars;
use crate::types::{ActivityEntry, EventKind, EventRecord};
use serde_json::Value;

/// Tools whose `file_path`/`notebook_path` input names a file they modify.
const FILE_WRITING_TOOLS: [&str; 4] = ["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// Status values that mean the agent is finished.
const DONE_STATUSES: [&str; 6] = ["completed", "complete", "done", "finished", "success", "succeeded"];

/// A tool invocation found in an event.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse<'a> {
    pub name: &'a str,
    pub input: Option<&'a Value>,
}

/// Content blocks of an embedded assistant message, if any.
fn content_blocks(record: &EventRecord) -> &[Value] {
    record
        .payload
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn block_type(block: &Value) -> Option<&str> {
    block.get("type").and_then(|t| t.as_str())
}

/// All tool invocations carried by `record`.
pub fn tool_uses(record: &EventRecord) -> Vec<ToolUse<'_>> {
    let mut uses = Vec::new();

    if matches!(record.kind, EventKind::ToolUse | EventKind::FileWrite) {
        let name = record.str_field("name").or_else(|| record.str_field("tool"));
        if let Some(name) = name {
            uses.push(ToolUse {
                name,
                input: record.payload.get("input"),
            });
        }
    }

    for block in content_blocks(record) {
        if block_type(block) == Some("tool_use") {
            uses.push(ToolUse {
                name: block.get("name").and_then(|n| n.as_str()).unwrap_or("unknown"),
                input: block.get("input"),
            });
        }
    }

    uses
}

fn path_from_input(input: Option<&Value>) -> Option<&str> {
    let input = input?;
    input
        .get("file_path")
        .or_else(|| input.get("notebook_path"))
        .and_then(|p| p.as_str())
}

/// File paths written or edited by `record`.
pub fn files_touched(record: &EventRecord) -> Vec<String> {
    let mut files = Vec::new();

    if record.kind == EventKind::FileWrite {
        let direct = record
            .str_field("path")
            .or_else(|| record.str_field("file_path"))
            .or_else(|| path_from_input(record.payload.get("input")));
        if let Some(path) = direct {
            files.push(path.to_string());
        }
    }

    for tool in tool_uses(record) {
        if FILE_WRITING_TOOLS.contains(&tool.name) {
            if let Some(path) = path_from_input(tool.input) {
                if !files.iter().any(|f| f == path) {
                    files.push(path.to_string());
                }
            }
        }
    }

    files
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Free text carried by `record`, used for completion phrase matching.
pub fn text_content(record: &EventRecord) -> String {
    let mut parts: Vec<&str> = ["content", "text", "result", "message"]
        .iter()
        .filter_map(|field| record.str_field(field))
        .collect();

    for block in content_blocks(record) {
        if block_type(block) == Some("text") {
            if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                parts.push(text);
            }
        }
    }

    parts.join("\n")
}

/// Whether `record` says the agent is done.
///
/// Either a status marker with a done-equivalent `status`, `state` or
/// `subtype`, or any event whose text contains one of `phrases`.
pub fn is_completion_marker(record: &EventRecord, phrases: &[String]) -> bool {
    if record.kind == EventKind::StatusMarker {
        let explicit = ["status", "state", "subtype"]
            .iter()
            .filter_map(|field| record.str_field(field))
            .any(|value| {
                DONE_STATUSES
                    .iter()
                    .any(|done| value.eq_ignore_ascii_case(done))
            });
        if explicit {
            return true;
        }
    }

    if phrases.is_empty() {
        return false;
    }
    let text = text_content(record);
    !text.is_empty() && phrases.iter().any(|p| text.contains(p.as_str()))
}

/// Activity feed entries for `record`.
pub fn describe(record: &EventRecord, max_content_length: usize) -> Vec<ActivityEntry> {
    let mut entries = Vec::new();

    for block in content_blocks(record) {
        match block_type(block) {
            Some("tool_use") => entries.push(ActivityEntry {
                kind: "tool_use".to_string(),
                tool: block.get("name").and_then(|n| n.as_str()).map(str::to_string),
                content: truncate_chars(&value_text(block.get("input")), max_content_length),
                timestamp: record.timestamp,
            }),
            Some("text") => entries.push(ActivityEntry {
                kind: "text".to_string(),
                tool: None,
                content: truncate_chars(&value_text(block.get("text")), max_content_length),
                timestamp: record.timestamp,
            }),
            _ => {}
        }
    }

    if entries.is_empty() {
        let kind = if record.raw_kind.is_empty() {
            record.kind.as_str().to_string()
        } else {
            record.raw_kind.clone()
        };
        let content = match record.payload.get("content") {
            Some(content) => value_text(Some(content)),
            None if record.kind == EventKind::ToolUse => value_text(record.payload.get("input")),
            None => text_content(record),
        };
        entries.push(ActivityEntry {
            kind,
            tool: record
                .str_field("name")
                .or_else(|| record.str_field("tool"))
                .map(str::to_string),
            content: truncate_chars(&content, max_content_length),
            timestamp: record.timestamp,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::reader::decode_line;
    use serde_json::json;

    fn record(value: Value) -> EventRecord {
        decode_line(value.to_string().as_bytes(), 0).unwrap().unwrap()
    }

    fn phrases() -> Vec<String> {
        crate::config::MarkersConfig::default().completion_phrases
    }

    #[test]
    fn test_direct_tool_use() {
        let r = record(json!({"kind": "tool_use", "name": "Read", "input": {"file_path": "/a.rs"}}));
        let uses = tool_uses(&r);
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].name, "Read");
        assert!(files_touched(&r).is_empty());
    }

    #[test]
    fn test_tools_from_assistant_message() {
        let r = record(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "Let me look"},
                {"type": "tool_use", "name": "Read", "input": {}},
                {"type": "tool_use", "name": "Write", "input": {"file_path": "/out.py"}}
            ]}
        }));
        let names: Vec<&str> = tool_uses(&r).iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Read", "Write"]);
        assert_eq!(files_touched(&r), vec!["/out.py".to_string()]);
    }

    #[test]
    fn test_message_with_name_is_not_a_tool() {
        let r = record(json!({"kind": "message", "name": "planner", "text": "hi"}));
        assert!(tool_uses(&r).is_empty());
    }

    #[test]
    fn test_file_write_event_and_notebook_edit() {
        let r = record(json!({"kind": "file_write", "path": "/notes.md"}));
        assert_eq!(files_touched(&r), vec!["/notes.md".to_string()]);

        let r = record(json!({"name": "NotebookEdit", "input": {"notebook_path": "/nb.ipynb"}}));
        assert_eq!(files_touched(&r), vec!["/nb.ipynb".to_string()]);
    }

    #[test]
    fn test_explicit_status_marker() {
        assert!(is_completion_marker(
            &record(json!({"kind": "status", "status": "done"})),
            &[]
        ));
        assert!(is_completion_marker(
            &record(json!({"type": "result", "subtype": "success"})),
            &[]
        ));
        assert!(!is_completion_marker(
            &record(json!({"kind": "status", "status": "working"})),
            &phrases()
        ));
        // A done-looking field on a non-marker event is not enough
        assert!(!is_completion_marker(
            &record(json!({"kind": "tool_use", "status": "done"})),
            &[]
        ));
    }

    #[test]
    fn test_completion_phrase_in_text() {
        let r = record(json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": "All tasks completed. Bye"}]}
        }));
        assert!(is_completion_marker(&r, &phrases()));
        assert!(!is_completion_marker(&r, &[]));

        let r = record(json!({"kind": "message", "content": "still going"}));
        assert!(!is_completion_marker(&r, &phrases()));
    }

    #[test]
    fn test_describe_assistant_blocks() {
        let r = record(json!({
            "type": "assistant",
            "timestamp": "2025-06-01T12:00:00Z",
            "message": {"content": [
                {"type": "text", "text": "x".repeat(500)},
                {"type": "tool_use", "name": "Bash", "input": {"command": "ls"}}
            ]}
        }));
        let entries = describe(&r, 200);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, "text");
        assert_eq!(entries[0].content.chars().count(), 200);
        assert_eq!(entries[1].tool.as_deref(), Some("Bash"));
        assert!(entries[1].content.contains("ls"));
        assert!(entries[1].timestamp.is_some());
    }

    #[test]
    fn test_describe_flat_event() {
        let r = record(json!({"kind": "tool_use", "name": "Grep", "input": {"pattern": "fn"}}));
        let entries = describe(&r, 200);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "tool_use");
        assert_eq!(entries[0].tool.as_deref(), Some("Grep"));
        assert!(entries[0].content.contains("pattern"));
    }
}
