//! Plugins backed by external commands
//!
//! A manifest names a command; each tool invocation runs the command with
//! the tool id appended as the last argument, writes the payload as JSON to
//! stdin and reads a JSON object back from stdout.

use async_trait::async_trait;
use media_pipeline_core::{Payload, Plugin, PluginError, PluginManifest};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Manifest file layout: the plugin manifest plus the command to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPluginFile {
    #[serde(flatten)]
    pub manifest: PluginManifest,

    /// Program followed by its fixed arguments
    pub command: Vec<String>,
}

pub struct ProcessPlugin {
    manifest: PluginManifest,
    program: String,
    args: Vec<String>,
}

impl ProcessPlugin {
    pub fn new(file: ProcessPluginFile) -> Result<Self, PluginError> {
        let mut command = file.command.into_iter();
        let program = command.next().ok_or_else(|| {
            PluginError::InvalidInput(format!(
                "Plugin '{}' manifest has an empty command",
                file.manifest.id
            ))
        })?;

        Ok(Self {
            manifest: file.manifest,
            program,
            args: command.collect(),
        })
    }

    /// Load plugin from YAML manifest
    pub fn from_yaml(yaml_path: impl AsRef<Path>) -> Result<Self, PluginError> {
        let contents = std::fs::read_to_string(yaml_path.as_ref())?;
        let file: ProcessPluginFile = serde_yaml::from_str(&contents)
            .map_err(|e| PluginError::InvalidInput(format!("Failed to parse YAML: {}", e)))?;
        Self::new(file)
    }
}

#[async_trait]
impl Plugin for ProcessPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn run_tool(&self, tool_id: &str, payload: Payload) -> Result<Payload, PluginError> {
        if !self.has_tool(tool_id) {
            return Err(PluginError::UnknownTool(tool_id.to_string()));
        }

        debug!(
            "Spawning {} {:?} {} for plugin '{}'",
            self.program,
            self.args,
            tool_id,
            self.id()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(tool_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let input = serde_json::to_vec(&payload)?;
        let stdin = child.stdin.take();
        // Feed stdin while stdout and stderr drain, or a tool that streams
        // its output blocks on a full pipe
        let write_input = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&input).await {
                    // A tool that exits without reading its input is reported by exit status
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
                // Dropping stdin closes the pipe so the tool sees EOF
            }
            Ok(())
        };

        let (written, output) = tokio::join!(write_input, child.wait_with_output());
        let output = output?;
        written?;

        if !output.status.success() {
            return Err(PluginError::ExecutionFailed(format!(
                "Tool '{}' exited with {}: {}",
                tool_id,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        match serde_json::from_slice::<serde_json::Value>(&output.stdout)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(PluginError::InvalidInput(format!(
                "Tool '{}' must write a JSON object to stdout",
                tool_id
            ))),
        }
    }
}
