//! Plugin trait, manifests and the plugin registry

use crate::error::{PipelineError, PluginError};
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Record passed into and returned from every tool
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Core plugin trait - all plugins must implement this
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin identifier
    fn id(&self) -> &str {
        &self.manifest().id
    }

    /// Manifest describing the tools this plugin exposes
    fn manifest(&self) -> &PluginManifest;

    /// Check whether this plugin declares the given tool
    fn has_tool(&self, tool_id: &str) -> bool {
        self.manifest().tools.contains_key(tool_id)
    }

    /// Run one tool against a payload
    async fn run_tool(&self, tool_id: &str, payload: Payload) -> Result<Payload, PluginError>;
}

/// Plugin manifest loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin identifier, referenced by pipeline nodes
    pub id: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Manifest version
    #[serde(default = "default_version")]
    pub version: String,

    /// Tools keyed by tool id
    #[serde(default)]
    pub tools: BTreeMap<String, ToolDefinition>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl PluginManifest {
    /// Parse a manifest from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PluginError::InvalidInput(format!("Failed to parse YAML: {}", e)))
    }
}

/// A single tool declared by a plugin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(default)]
    pub description: String,

    /// Type tags this tool accepts; empty means unconstrained
    #[serde(default)]
    pub input_types: Vec<String>,

    /// Type tags this tool produces; empty means unconstrained
    #[serde(default)]
    pub output_types: Vec<String>,
}

/// Declared input/output types for one pipeline node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    #[serde(default)]
    pub input_types: Vec<String>,
    #[serde(default)]
    pub output_types: Vec<String>,
}

impl From<&ToolDefinition> for ToolMetadata {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            input_types: tool.input_types.clone(),
            output_types: tool.output_types.clone(),
        }
    }
}

/// Plugin registry for lookup and dispatch
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            plugins: HashMap::with_capacity(16),
        }
    }

    /// Register a plugin, replacing any plugin with the same id
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let id = plugin.id().to_string();
        info!(
            "Registering plugin: {} ({} tools)",
            id,
            plugin.manifest().tools.len()
        );
        self.plugins.insert(id, plugin);
    }

    /// Get plugin by id
    pub fn get_plugin(&self, plugin_id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(plugin_id).cloned()
    }

    /// All registered plugin ids, sorted
    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Resolve a plugin and check that it declares `tool_id`
    pub fn resolve_tool(
        &self,
        plugin_id: &str,
        tool_id: &str,
    ) -> Result<Arc<dyn Plugin>, PipelineError> {
        let plugin = self
            .get_plugin(plugin_id)
            .ok_or_else(|| PipelineError::PluginNotFound(plugin_id.to_string()))?;

        if !plugin.has_tool(tool_id) {
            return Err(PipelineError::ToolNotFound {
                plugin_id: plugin_id.to_string(),
                tool_id: tool_id.to_string(),
            });
        }

        Ok(plugin)
    }

    /// Build the node id -> tool metadata map used by the type validator.
    /// Nodes whose plugin or tool cannot be resolved are left out.
    pub fn tool_metadata(&self, pipeline: &Pipeline) -> HashMap<String, ToolMetadata> {
        let mut metadata = HashMap::with_capacity(pipeline.nodes().len());
        for node in pipeline.nodes() {
            let tool = self
                .plugins
                .get(&node.plugin_id)
                .and_then(|p| p.manifest().tools.get(&node.tool_id));
            match tool {
                Some(tool) => {
                    metadata.insert(node.id.clone(), ToolMetadata::from(tool));
                }
                None => debug!(
                    "No manifest metadata for node '{}' ({}/{})",
                    node.id, node.plugin_id, node.tool_id
                ),
            }
        }
        metadata
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugin_ids())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{payload, MockPlugin};
    use super::*;
    use crate::pipeline::{PipelineEdge, PipelineNode};
    use serde_json::json;

    fn echo_plugin(id: &str) -> Arc<MockPlugin> {
        Arc::new(MockPlugin::new(
            id,
            &[("detect", &["image"], &["detections"])],
            |_, payload| Ok(payload),
        ))
    }

    #[test]
    fn test_registry_register_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register(echo_plugin("object_detection"));

        assert_eq!(registry.len(), 1);
        assert!(registry.get_plugin("object_detection").is_some());
        assert!(registry.get_plugin("ocr").is_none());
    }

    #[test]
    fn test_resolve_tool_distinguishes_plugin_and_tool() {
        let mut registry = PluginRegistry::new();
        registry.register(echo_plugin("object_detection"));

        assert!(registry.resolve_tool("object_detection", "detect").is_ok());
        assert!(matches!(
            registry.resolve_tool("ocr", "detect"),
            Err(PipelineError::PluginNotFound(id)) if id == "ocr"
        ));
        assert!(matches!(
            registry.resolve_tool("object_detection", "track"),
            Err(PipelineError::ToolNotFound { tool_id, .. }) if tool_id == "track"
        ));
    }

    #[test]
    fn test_tool_metadata_skips_unknown_nodes() {
        let mut registry = PluginRegistry::new();
        registry.register(echo_plugin("object_detection"));

        let pipeline = Pipeline::new(
            "p",
            "P",
            vec![
                PipelineNode::new("a", "object_detection", "detect"),
                PipelineNode::new("b", "legacy", "anything"),
            ],
            vec![PipelineEdge::new("a", "b")],
            vec!["a".to_string()],
            vec!["b".to_string()],
        )
        .unwrap();

        let metadata = registry.tool_metadata(&pipeline);
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["a"].output_types, vec!["detections".to_string()]);
    }

    #[test]
    fn test_manifest_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ocr.yaml");
        std::fs::write(
            &path,
            "id: ocr\nname: OCR\ntools:\n  read_text:\n    input_types: [image]\n    output_types: [text]\n",
        )
        .unwrap();

        let manifest = PluginManifest::from_yaml(&path).unwrap();
        assert_eq!(manifest.id, "ocr");
        assert_eq!(manifest.version, "0.1.0");
        assert_eq!(manifest.tools["read_text"].input_types, vec!["image"]);
    }

    #[tokio::test]
    async fn test_mock_plugin_runs_tool() {
        let plugin = echo_plugin("object_detection");
        let out = plugin
            .run_tool("detect", payload(json!({"frame": 1})))
            .await
            .unwrap();
        assert_eq!(out["frame"], json!(1));
        assert_eq!(plugin.calls(), vec!["detect".to_string()]);
    }
}
