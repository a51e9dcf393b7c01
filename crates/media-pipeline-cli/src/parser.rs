//! Argument parsers for tool lists and JSON payloads
//!
//! Tool lists accept commas or semicolons as separators, so
//! `"decode,detect;track"` yields `["decode", "detect", "track"]`.

use media_pipeline_core::Payload;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty tool list")]
    EmptyInput,

    #[error("Empty tool name at position {position} in: {input}")]
    EmptyTool { position: usize, input: String },

    #[error("Invalid tool name '{name}': {message}")]
    InvalidTool { name: String, message: String },

    #[error("Payload must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read payload file: {0}")]
    Io(#[from] std::io::Error),
}

/// Split a tool list into ordered tool names
pub fn parse_tool_list(input: &str) -> Result<Vec<String>, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let mut tools = Vec::with_capacity(4);
    for (position, raw) in trimmed.split([',', ';']).enumerate() {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ParseError::EmptyTool {
                position,
                input: input.to_string(),
            });
        }
        if name.chars().any(char::is_whitespace) {
            return Err(ParseError::InvalidTool {
                name: name.to_string(),
                message: "tool names cannot contain whitespace".to_string(),
            });
        }
        tools.push(name.to_string());
    }

    Ok(tools)
}

/// Parse a JSON object into a payload
pub fn parse_payload(json: &str) -> Result<Payload, ParseError> {
    match serde_json::from_str::<serde_json::Value>(json)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ParseError::NotAnObject {
            found: json_type_name(&other),
        }),
    }
}

/// Read a payload from a file, or an empty payload when no file is given
pub fn load_payload(path: Option<&Path>) -> Result<Payload, ParseError> {
    match path {
        Some(path) => parse_payload(&std::fs::read_to_string(path)?),
        None => Ok(Payload::new()),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
