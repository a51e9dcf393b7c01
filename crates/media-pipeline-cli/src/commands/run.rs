//! Pipeline and tool-chain execution commands

use super::registry_helper::Engine;
use crate::parser::{load_payload, parse_tool_list};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct RunCommand {
    /// Pipeline identifier
    #[arg(value_name = "PIPELINE")]
    pipeline_id: String,

    /// JSON file holding the initial payload (defaults to `{}`)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Print every node's output and the schedule alongside the result
    #[arg(long)]
    detailed: bool,
}

impl RunCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        let payload = load_payload(self.input.as_deref())?;
        info!("Running pipeline '{}'", self.pipeline_id);

        let report = engine.dag.run_detailed(&self.pipeline_id, payload).await?;
        info!(
            "Pipeline '{}' completed {} node(s) in {:.3}s",
            report.pipeline_id,
            report.execution_order.len(),
            report.duration.as_secs_f64()
        );

        if self.detailed {
            let detailed = serde_json::json!({
                "pipeline_id": report.pipeline_id,
                "execution_order": report.execution_order,
                "node_outputs": report.node_outputs,
                "result": report.result,
                "duration_ms": report.duration.as_secs_f64() * 1000.0,
            });
            println!("{}", serde_json::to_string_pretty(&detailed)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&report.result)?);
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ChainCommand {
    /// Plugin whose tools are chained
    #[arg(value_name = "PLUGIN")]
    plugin_id: String,

    /// Tools to run in order
    /// Example: --tools "decode,detect;track"
    #[arg(short, long)]
    tools: String,

    /// JSON file holding the initial payload (defaults to `{}`)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,
}

impl ChainCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        let tools = parse_tool_list(&self.tools)?;
        let payload = load_payload(self.input.as_deref())?;
        info!("Chaining {} tool(s) on plugin '{}'", tools.len(), self.plugin_id);

        let run = engine
            .linear
            .run_linear_pipeline(&self.plugin_id, &tools, payload)
            .await?;

        info!("Chain finished after {} step(s)", run.steps.len());
        println!("{}", serde_json::to_string_pretty(&run)?);
        Ok(())
    }
}
