//! Media Pipeline Core - DAG execution engine for plugin-based media analysis
//!
//! This crate provides the pipeline graph model, edge type validation, the
//! DAG and linear executors, the pipeline registry and per-connection
//! streaming backpressure used by the media analysis service.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod linear;
pub mod merge;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod streaming;
pub mod validator;

pub use config::{BackpressureConfig, EngineConfig, ExecutorConfig};
pub use context::ExecutionContext;
pub use error::{ConfigError, DefinitionError, ErrorKind, PipelineError, PluginError, RegistryError};
pub use executor::{DagExecutor, ExecutorOptions, RunReport};
pub use linear::{LinearExecutor, LinearRunResult, StepRecord};
pub use pipeline::{
    Pipeline, PipelineDefinition, PipelineEdge, PipelineInfo, PipelineNode, PipelineSummary,
};
pub use plugin::{Payload, Plugin, PluginManifest, PluginRegistry, ToolDefinition, ToolMetadata};
pub use registry::{PipelineRegistry, PipelineSource};
pub use streaming::{
    should_drop, should_slow_down, BackpressureState, FrameDecision, FrameOutcome, SessionStats,
    StreamingSession,
};
pub use validator::{validate_pipeline, validate_types, ValidationReport};
