//! Pipeline validation command

use super::registry_helper::Engine;
use anyhow::Result;
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct ValidateCommand {
    /// Pipeline identifier; validates every registered pipeline when omitted
    #[arg(value_name = "PIPELINE")]
    pipeline_id: Option<String>,
}

impl ValidateCommand {
    /// Returns an error when any checked pipeline is invalid
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        let ids = match self.pipeline_id {
            Some(id) => vec![id],
            None => engine
                .pipelines
                .list()
                .into_iter()
                .map(|summary| summary.id)
                .collect(),
        };

        let mut invalid = 0usize;
        for id in &ids {
            let report = engine.dag.validate_pipeline(id)?;
            if report.valid {
                println!("{}: valid", id);
            } else {
                invalid += 1;
                println!("{}: invalid", id);
                for error in &report.errors {
                    println!("  - {}", error);
                }
            }
        }

        info!("Validated {} pipeline(s), {} invalid", ids.len(), invalid);
        if invalid > 0 {
            anyhow::bail!("{} of {} pipeline(s) failed validation", invalid, ids.len());
        }
        Ok(())
    }
}
