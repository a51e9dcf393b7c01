//! Streaming replay command
//!
//! Feeds newline-delimited JSON frames through a streaming session so
//! backpressure decisions can be observed without a live connection.

use super::registry_helper::Engine;
use crate::parser::parse_payload;
use anyhow::{Context as _, Result};
use clap::Args;
use media_pipeline_core::{FrameOutcome, StreamingSession};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

#[derive(Args)]
pub struct StreamCommand {
    /// Pipeline bound to the session
    #[arg(value_name = "PIPELINE")]
    pipeline_id: String,

    /// File with one JSON object per line (reads stdin when omitted)
    #[arg(short, long, value_name = "FILE")]
    frames: Option<PathBuf>,
}

impl StreamCommand {
    pub async fn execute(self, engine: &Engine) -> Result<()> {
        if engine.pipelines.get(&self.pipeline_id).is_none() {
            anyhow::bail!("Pipeline '{}' not found", self.pipeline_id);
        }

        let session = StreamingSession::new(&self.pipeline_id, engine.config.streaming)?;

        match &self.frames {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                replay(engine, session, file).await
            }
            None => replay(engine, session, tokio::io::stdin()).await,
        }
    }
}

async fn replay<R>(engine: &Engine, mut session: StreamingSession, reader: R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let payload = parse_payload(&line)?;

        let event = match session.process_frame(&engine.dag, payload).await? {
            FrameOutcome::Dropped {
                frame_index,
                slow_down,
            } => serde_json::json!({
                "frame": frame_index,
                "dropped": true,
                "slow_down": slow_down,
            }),
            FrameOutcome::Processed {
                frame_index,
                result,
                processing_time_ms,
                slow_down,
            } => serde_json::json!({
                "frame": frame_index,
                "dropped": false,
                "slow_down": slow_down,
                "processing_time_ms": processing_time_ms,
                "result": result,
            }),
        };
        println!("{}", serde_json::to_string(&event)?);
    }

    println!("{}", serde_json::to_string(&serde_json::json!({ "stats": session.stats() }))?);
    Ok(())
}
