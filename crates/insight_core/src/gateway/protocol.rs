//! Wire format for the chat-completions protocol.
//!
//! Request/response types mirror the backend's JSON shape; optional fields
//! skip serialization when absent so requests stay minimal. Tool-call
//! arguments arrive as a JSON *string* that is decoded separately per tool.

use crate::error::Result;
use crate::types::{CodeFile, Inspection};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const TOOL_ADD_INSPECTION: &str = "add_inspection";
pub const TOOL_APPLY_INSPECTION: &str = "apply_inspection";
pub const TOOL_REQUEST_CONTEXT: &str = "request_context";

const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a code reviewer integrated into an IDE. You are given a source file \
and the project files related to it. Identify concrete, cross-file \
improvements. To track a new finding, call add_inspection with a short \
description and a fix_prompt that tells a code assistant how to fix it. If \
a finding matches an inspection you were told already exists, call \
apply_inspection with its id instead. If you need more context to judge, \
call request_context with the kind of context you need. Only call tools \
for actionable findings.";

const FIX_SYSTEM_PROMPT: &str = "\
You are a code assistant applying a known fix. You are given an inspection \
and the files it covers. Return the corrected content of every file that \
needs to change as a JSON array of objects with \"path\" and \"content\" \
fields, and nothing else. Return an empty array if no change is needed.";

/// One chat message. Doubles as the request and response shape; response
/// messages may carry tool calls instead of (or alongside) content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
        }
    }
}

/// A tool invocation requested by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, decoded per tool.
    pub arguments: String,
}

/// Declaration of one callable tool offered to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDecl,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub error: Option<BackendErrorPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

/// Backend-reported failure; non-null means the round trip failed
/// regardless of HTTP status.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendErrorPayload {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// Decoded arguments of `add_inspection`.
#[derive(Debug, Deserialize)]
pub struct AddInspectionArgs {
    pub description: String,
    pub fix_prompt: String,
}

/// Decoded arguments of `apply_inspection`.
#[derive(Debug, Deserialize)]
pub struct ApplyInspectionArgs {
    pub inspection_id: String,
}

/// Decoded arguments of `request_context`.
#[derive(Debug, Deserialize)]
pub struct RequestContextArgs {
    pub context_type: String,
}

/// The three tools offered on every analysis request.
pub fn standard_tools() -> Vec<ToolSchema> {
    vec![
        function_tool(
            TOOL_ADD_INSPECTION,
            "Track a new cross-file inspection (a proposed improvement).",
            json!({
                "type": "object",
                "properties": {
                    "description": {
                        "type": "string",
                        "description": "Short human-readable summary of the finding"
                    },
                    "fix_prompt": {
                        "type": "string",
                        "description": "Instruction telling a code assistant how to apply the fix"
                    }
                },
                "required": ["description", "fix_prompt"]
            }),
        ),
        function_tool(
            TOOL_APPLY_INSPECTION,
            "Apply an existing inspection to the current files.",
            json!({
                "type": "object",
                "properties": {
                    "inspection_id": {
                        "type": "string",
                        "description": "Id of the inspection to apply"
                    }
                },
                "required": ["inspection_id"]
            }),
        ),
        function_tool(
            TOOL_REQUEST_CONTEXT,
            "Ask for additional context before judging.",
            json!({
                "type": "object",
                "properties": {
                    "context_type": {
                        "type": "string",
                        "description": "Kind of context needed, e.g. callers, tests, config"
                    }
                },
                "required": ["context_type"]
            }),
        ),
    ]
}

fn function_tool(name: &str, description: &str, parameters: serde_json::Value) -> ToolSchema {
    ToolSchema {
        kind: "function".to_string(),
        function: FunctionDecl {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

/// Request asking the backend to review `source` against its related files.
pub fn analysis_request(
    model: &str,
    source: &CodeFile,
    related: &[CodeFile],
    known_inspections: &[Inspection],
) -> ChatRequest {
    let mut body = String::new();
    body.push_str("Source file under review:\n\n");
    push_file(&mut body, source);
    if !related.is_empty() {
        body.push_str("\nRelated project files:\n\n");
        for file in related {
            push_file(&mut body, file);
        }
    }
    if !known_inspections.is_empty() {
        body.push_str("\nExisting inspections (use apply_inspection for matches):\n");
        for inspection in known_inspections {
            body.push_str(&format!("- {}: {}\n", inspection.id, inspection.description));
        }
    }

    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user(body),
        ],
        tools: Some(standard_tools()),
        tool_choice: Some("auto".to_string()),
    }
}

/// Request asking the backend for corrected file contents.
pub fn fix_request(model: &str, inspection: &Inspection, files: &[CodeFile]) -> ChatRequest {
    let mut body = String::new();
    body.push_str(&format!(
        "Inspection: {}\nFix instruction: {}\n\nFiles to fix:\n\n",
        inspection.description, inspection.fix_prompt
    ));
    for file in files {
        push_file(&mut body, file);
    }

    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(FIX_SYSTEM_PROMPT),
            ChatMessage::user(body),
        ],
        tools: None,
        tool_choice: None,
    }
}

fn push_file(body: &mut String, file: &CodeFile) {
    body.push_str(&format!("== {}\n```\n{}\n```\n", file.path, file.content));
}

/// Strips a surrounding Markdown code fence, if present.
///
/// Backends often wrap JSON payloads in ```json fences even when told not
/// to; tolerate and remove them.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "rust", ...) up to the first newline.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Parses corrected file contents from a fix response.
///
/// An empty (or whitespace-only) payload is a valid "nothing to change"
/// answer. Anything else must decode as a JSON array of `{path, content}`.
pub fn parse_corrected_files(content: &str) -> Result<Vec<CodeFile>> {
    let payload = strip_code_fences(content);
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    let files: Vec<CodeFile> = serde_json::from_str(payload)?;
    Ok(files)
}
