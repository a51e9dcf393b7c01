//! Error types for pipeline definition, lookup and execution

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a plugin while running one of its tools
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Plugin execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Structural problems found while constructing a [`crate::Pipeline`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Pipeline id must not be empty")]
    EmptyId,

    #[error("Pipeline '{pipeline_id}' declares node '{node_id}' more than once")]
    DuplicateNode {
        pipeline_id: String,
        node_id: String,
    },

    #[error("Pipeline '{pipeline_id}' has edge '{from}' -> '{to}' referencing missing node '{missing}'")]
    DanglingEdge {
        pipeline_id: String,
        from: String,
        to: String,
        missing: String,
    },

    #[error("Pipeline '{pipeline_id}' lists unknown entry node '{node_id}'")]
    UnknownEntryNode {
        pipeline_id: String,
        node_id: String,
    },

    #[error("Pipeline '{pipeline_id}' lists unknown output node '{node_id}'")]
    UnknownOutputNode {
        pipeline_id: String,
        node_id: String,
    },
}

/// Coarse classification used by callers to map errors onto responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Pipeline, plugin or tool lookup failed
    NotFound,
    /// The request or definition itself is malformed
    InvalidInput,
    /// A tool failed or timed out while running
    Execution,
}

/// Errors surfaced by the pipeline executors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("Plugin '{0}' not found")]
    PluginNotFound(String),

    #[error("Tool '{tool_id}' not found in plugin")]
    ToolNotFound { plugin_id: String, tool_id: String },

    #[error("Pipeline requires a non-empty tools[] array")]
    EmptyTools,

    #[error("Pipeline '{pipeline_id}' contains a cycle through nodes: {}", .unresolved.join(", "))]
    CyclicPipeline {
        pipeline_id: String,
        unresolved: Vec<String>,
    },

    #[error("Node '{node_id}' ({plugin_id}/{tool_id}) failed: {source}")]
    NodeFailed {
        node_id: String,
        plugin_id: String,
        tool_id: String,
        #[source]
        source: PluginError,
    },

    #[error("Tool '{tool_id}' of plugin '{plugin_id}' failed: {source}")]
    ToolFailed {
        plugin_id: String,
        tool_id: String,
        #[source]
        source: PluginError,
    },

    #[error("Node '{node_id}' timed out after {}s", .timeout.as_secs_f64())]
    NodeTimeout { node_id: String, timeout: Duration },

    #[error("Node '{node_id}' task aborted: {reason}")]
    TaskAborted { node_id: String, reason: String },

    #[error("Invalid pipeline definition: {0}")]
    Definition(#[from] DefinitionError),
}

impl PipelineError {
    /// Classify this error for the caller-facing layer
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PipelineNotFound(_) | Self::PluginNotFound(_) | Self::ToolNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::EmptyTools | Self::CyclicPipeline { .. } | Self::Definition(_) => {
                ErrorKind::InvalidInput
            }
            Self::NodeFailed { .. }
            | Self::ToolFailed { .. }
            | Self::NodeTimeout { .. }
            | Self::TaskAborted { .. } => ErrorKind::Execution,
        }
    }
}

/// Errors from loading a single pipeline definition file
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pipeline definition: {0}")]
    Definition(#[from] DefinitionError),
}

/// Errors from loading or validating engine configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
