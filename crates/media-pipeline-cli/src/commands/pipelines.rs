//! Pipeline listing and inspection commands

use super::registry_helper::Engine;
use anyhow::{Context as _, Result};
use clap::Args;

#[derive(Args)]
pub struct ListCommand {
    /// Print the listing as JSON
    #[arg(long)]
    json: bool,
}

impl ListCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        let summaries = engine.pipelines.list();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            return Ok(());
        }

        if summaries.is_empty() {
            println!(
                "No pipelines found in {}",
                engine.config.pipelines_dir.display()
            );
            return Ok(());
        }

        println!("Available pipelines:");
        for summary in summaries {
            println!("  {:<24} {}", summary.id, summary.name);
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct InfoCommand {
    /// Pipeline identifier
    #[arg(value_name = "PIPELINE")]
    pipeline_id: String,
}

impl InfoCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        let info = engine
            .pipelines
            .get_info(&self.pipeline_id)
            .with_context(|| format!("Pipeline '{}' not found", self.pipeline_id))?;

        println!("{}", serde_json::to_string_pretty(&info)?);
        Ok(())
    }
}
