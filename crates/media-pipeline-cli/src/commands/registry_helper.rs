//! Shared engine construction
//!
//! Loads plugin manifests and pipeline definitions once and wires them
//! into the executors used by every command.

use crate::process_plugin::ProcessPlugin;
use anyhow::{Context, Result};
use media_pipeline_core::{
    DagExecutor, EngineConfig, ExecutorOptions, LinearExecutor, PipelineRegistry, PluginRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a command needs to run pipelines
pub struct Engine {
    pub config: EngineConfig,
    pub pipelines: Arc<PipelineRegistry>,
    pub plugins: Arc<PluginRegistry>,
    pub dag: DagExecutor,
    pub linear: LinearExecutor,
}

impl Engine {
    /// Load plugins and pipelines from the configured directories
    pub fn load(config: EngineConfig) -> Result<Self> {
        let plugins = Arc::new(register_all_plugins(&config.plugins_dir)?);
        let pipelines = Arc::new(
            PipelineRegistry::load_dir(&config.pipelines_dir).with_context(|| {
                format!(
                    "Failed to read pipelines directory {}",
                    config.pipelines_dir.display()
                )
            })?,
        );

        let options = ExecutorOptions::from(&config.executor);
        let dag = DagExecutor::new(pipelines.clone(), Arc::clone(&plugins))
            .with_options(options.clone());
        let linear = LinearExecutor::new(Arc::clone(&plugins)).with_timeout(options.node_timeout);

        Ok(Self {
            config,
            pipelines,
            plugins,
            dag,
            linear,
        })
    }
}

/// Register every `*.yaml`/`*.yml` manifest found in `dir`.
///
/// A manifest that fails to load is logged and skipped. A missing
/// directory yields an empty registry.
pub fn register_all_plugins(dir: &Path) -> Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();

    if !dir.exists() {
        warn!("Plugin directory {} does not exist", dir.display());
        return Ok(registry);
    }

    let mut manifests: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read plugin directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    manifests.sort();

    for path in manifests {
        match ProcessPlugin::from_yaml(&path) {
            Ok(plugin) => registry.register(Arc::new(plugin)),
            Err(e) => warn!("Skipping plugin manifest {}: {}", path.display(), e),
        }
    }

    info!("Registered {} plugin(s) from {}", registry.len(), dir.display());
    Ok(registry)
}
