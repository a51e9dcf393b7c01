//! Pipeline registry: loads named pipeline definitions and serves lookups

use crate::error::RegistryError;
use crate::pipeline::{Pipeline, PipelineDefinition, PipelineInfo, PipelineSummary};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Source of pipeline definitions consumed by the executors
pub trait PipelineSource: Send + Sync {
    fn get_pipeline(&self, pipeline_id: &str) -> Option<Arc<Pipeline>>;

    fn list_pipelines(&self) -> Vec<PipelineSummary>;
}

type PipelineMap = BTreeMap<String, Arc<Pipeline>>;

/// Registry of pipelines keyed by id.
///
/// The map is built once and only ever replaced wholesale, so readers that
/// already hold an `Arc<Pipeline>` keep a consistent definition across a
/// [`PipelineRegistry::reload`].
pub struct PipelineRegistry {
    pipelines: RwLock<Arc<PipelineMap>>,
    source_dir: Option<PathBuf>,
}

impl PipelineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            pipelines: RwLock::new(Arc::new(PipelineMap::new())),
            source_dir: None,
        }
    }

    /// Build a registry from already constructed pipelines
    pub fn from_pipelines(pipelines: impl IntoIterator<Item = Pipeline>) -> Self {
        let mut map = PipelineMap::new();
        for pipeline in pipelines {
            insert_first(&mut map, Arc::new(pipeline), "<memory>");
        }
        Self {
            pipelines: RwLock::new(Arc::new(map)),
            source_dir: None,
        }
    }

    /// Scan a directory of `*.json` pipeline definitions.
    ///
    /// Files that fail to parse or violate pipeline invariants are logged
    /// and skipped; only an unreadable directory is an error.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref().to_path_buf();
        let map = scan_dir(&dir)?;
        Ok(Self {
            pipelines: RwLock::new(Arc::new(map)),
            source_dir: Some(dir),
        })
    }

    /// Re-scan the source directory and swap in the new map.
    ///
    /// Returns the number of pipelines loaded. Registries built in memory
    /// have nothing to reload and keep their current contents.
    pub fn reload(&self) -> Result<usize, RegistryError> {
        let Some(dir) = &self.source_dir else {
            return Ok(self.len());
        };
        let map = Arc::new(scan_dir(dir)?);
        let count = map.len();
        *self
            .pipelines
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = map;
        Ok(count)
    }

    fn snapshot(&self) -> Arc<PipelineMap> {
        let guard = self
            .pipelines
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// `{id, name}` of every loaded pipeline, sorted by id
    pub fn list(&self) -> Vec<PipelineSummary> {
        self.snapshot().values().map(|p| p.summary()).collect()
    }

    pub fn get(&self, pipeline_id: &str) -> Option<Arc<Pipeline>> {
        self.snapshot().get(pipeline_id).cloned()
    }

    pub fn get_info(&self, pipeline_id: &str) -> Option<PipelineInfo> {
        self.snapshot().get(pipeline_id).map(|p| p.info())
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSource for PipelineRegistry {
    fn get_pipeline(&self, pipeline_id: &str) -> Option<Arc<Pipeline>> {
        self.get(pipeline_id)
    }

    fn list_pipelines(&self) -> Vec<PipelineSummary> {
        self.list()
    }
}

/// Parse and validate a single definition file
pub fn load_pipeline_file(path: impl AsRef<Path>) -> Result<Pipeline, RegistryError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let definition: PipelineDefinition = serde_json::from_str(&contents)?;
    Ok(Pipeline::from_definition(definition)?)
}

fn scan_dir(dir: &Path) -> Result<PipelineMap, RegistryError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut map = PipelineMap::new();
    let mut skipped = 0usize;
    for path in &paths {
        match load_pipeline_file(path) {
            Ok(pipeline) => {
                debug!(
                    "Loaded pipeline '{}' from {}",
                    pipeline.id(),
                    path.display()
                );
                let source = path.display().to_string();
                insert_first(&mut map, Arc::new(pipeline), &source);
            }
            Err(e) => {
                skipped += 1;
                warn!("Skipping pipeline definition {}: {}", path.display(), e);
            }
        }
    }

    info!(
        "Loaded {} pipeline(s) from {} ({} skipped)",
        map.len(),
        dir.display(),
        skipped
    );
    Ok(map)
}

fn insert_first(map: &mut PipelineMap, pipeline: Arc<Pipeline>, source: &str) {
    let id = pipeline.id().to_string();
    if map.contains_key(&id) {
        warn!(
            "Duplicate pipeline id '{}' in {}, keeping first definition",
            id, source
        );
        return;
    }
    map.insert(id, pipeline);
}
