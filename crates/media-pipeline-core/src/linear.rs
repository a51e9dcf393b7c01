//! Linear tool chains within a single plugin
//!
//! A simpler alternative to the DAG executor: tools run one after another,
//! each receiving the accumulated payload. Every step's raw output is kept
//! in the returned step log.

use crate::error::PipelineError;
use crate::merge::merge_into;
use crate::plugin::{Payload, PluginRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Output of one tool in a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub tool: String,
    pub output: Payload,
}

/// Final payload plus the ordered step log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRunResult {
    pub result: Payload,
    pub steps: Vec<StepRecord>,
}

/// Runs an ordered list of tools from one plugin
#[derive(Debug, Clone)]
pub struct LinearExecutor {
    plugins: Arc<PluginRegistry>,
    step_timeout: Option<Duration>,
}

impl LinearExecutor {
    pub fn new(plugins: Arc<PluginRegistry>) -> Self {
        Self {
            plugins,
            step_timeout: None,
        }
    }

    /// Set timeout for each tool invocation
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Run `tools` in order against `plugin_id`.
    ///
    /// All preconditions are checked before the first tool runs: the plugin
    /// must exist, the list must be non-empty and every tool must be declared.
    pub async fn run_linear_pipeline(
        &self,
        plugin_id: &str,
        tools: &[String],
        payload: Payload,
    ) -> Result<LinearRunResult, PipelineError> {
        let plugin = self
            .plugins
            .get_plugin(plugin_id)
            .ok_or_else(|| PipelineError::PluginNotFound(plugin_id.to_string()))?;

        if tools.is_empty() {
            return Err(PipelineError::EmptyTools);
        }

        if let Some(missing) = tools.iter().find(|tool| !plugin.has_tool(tool)) {
            return Err(PipelineError::ToolNotFound {
                plugin_id: plugin_id.to_string(),
                tool_id: missing.clone(),
            });
        }

        info!(
            "Running linear chain on plugin '{}': {}",
            plugin_id,
            tools.join(" -> ")
        );
        let start = Instant::now();

        let mut current = payload;
        let mut steps = Vec::with_capacity(tools.len());

        for (idx, tool) in tools.iter().enumerate() {
            debug!("--- Step {}/{}: {} ---", idx + 1, tools.len(), tool);

            let call = plugin.run_tool(tool, current.clone());
            let outcome = match self.step_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(PipelineError::NodeTimeout {
                            node_id: tool.clone(),
                            timeout: limit,
                        })
                    }
                },
                None => call.await,
            };

            let output = outcome.map_err(|source| {
                error!("Tool '{}' failed: {}", tool, source);
                PipelineError::ToolFailed {
                    plugin_id: plugin_id.to_string(),
                    tool_id: tool.clone(),
                    source,
                }
            })?;

            merge_into(&mut current, &output);
            steps.push(StepRecord {
                tool: tool.clone(),
                output,
            });
        }

        info!(
            "Linear chain completed in {:.2}s ({} steps)",
            start.elapsed().as_secs_f64(),
            steps.len()
        );

        Ok(LinearRunResult {
            result: current,
            steps,
        })
    }
}
