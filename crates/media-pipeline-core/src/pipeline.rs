//! Declarative pipeline graph: nodes, edges, entry and output sets
//!
//! A [`Pipeline`] is validated once at construction and is read-only
//! afterwards. Per-run state lives in [`crate::context::ExecutionContext`].

use crate::error::{DefinitionError, PipelineError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One processing step bound to a plugin tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineNode {
    pub id: String,
    pub plugin_id: String,
    pub tool_id: String,
}

impl PipelineNode {
    pub fn new(
        id: impl Into<String>,
        plugin_id: impl Into<String>,
        tool_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            plugin_id: plugin_id.into(),
            tool_id: tool_id.into(),
        }
    }
}

/// Directed data dependency: `to_node` consumes `from_node`'s output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEdge {
    pub from_node: String,
    pub to_node: String,
}

impl PipelineEdge {
    pub fn new(from_node: impl Into<String>, to_node: impl Into<String>) -> Self {
        Self {
            from_node: from_node.into(),
            to_node: to_node.into(),
        }
    }
}

/// Raw pipeline document as it appears on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<PipelineNode>,
    #[serde(default)]
    pub edges: Vec<PipelineEdge>,
    #[serde(default)]
    pub entry_nodes: Vec<String>,
    #[serde(default)]
    pub output_nodes: Vec<String>,
}

/// Validated, immutable pipeline graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PipelineDefinition", into = "PipelineDefinition")]
pub struct Pipeline {
    definition: PipelineDefinition,

    /// Node id -> position in `nodes`
    index: HashMap<String, usize>,

    /// Predecessor node indices per node, in edge declaration order
    predecessors: Vec<Vec<usize>>,

    /// Successor node indices per node, in edge declaration order
    successors: Vec<Vec<usize>>,

    entry_set: HashSet<String>,
}

impl Pipeline {
    /// Build a pipeline, checking its structural invariants
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        nodes: Vec<PipelineNode>,
        edges: Vec<PipelineEdge>,
        entry_nodes: Vec<String>,
        output_nodes: Vec<String>,
    ) -> Result<Self, DefinitionError> {
        Self::from_definition(PipelineDefinition {
            id: id.into(),
            name: name.into(),
            description: None,
            nodes,
            edges,
            entry_nodes,
            output_nodes,
        })
    }

    /// Validate a raw definition into a pipeline
    pub fn from_definition(definition: PipelineDefinition) -> Result<Self, DefinitionError> {
        if definition.id.trim().is_empty() {
            return Err(DefinitionError::EmptyId);
        }

        let mut index = HashMap::with_capacity(definition.nodes.len());
        for (position, node) in definition.nodes.iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                return Err(DefinitionError::DuplicateNode {
                    pipeline_id: definition.id.clone(),
                    node_id: node.id.clone(),
                });
            }
        }

        let mut predecessors = vec![Vec::new(); definition.nodes.len()];
        let mut successors = vec![Vec::new(); definition.nodes.len()];
        for edge in &definition.edges {
            let lookup = |node_id: &str| {
                index
                    .get(node_id)
                    .copied()
                    .ok_or_else(|| DefinitionError::DanglingEdge {
                        pipeline_id: definition.id.clone(),
                        from: edge.from_node.clone(),
                        to: edge.to_node.clone(),
                        missing: node_id.to_string(),
                    })
            };
            let from = lookup(&edge.from_node)?;
            let to = lookup(&edge.to_node)?;
            predecessors[to].push(from);
            successors[from].push(to);
        }

        for node_id in &definition.entry_nodes {
            if !index.contains_key(node_id) {
                return Err(DefinitionError::UnknownEntryNode {
                    pipeline_id: definition.id.clone(),
                    node_id: node_id.clone(),
                });
            }
        }
        for node_id in &definition.output_nodes {
            if !index.contains_key(node_id) {
                return Err(DefinitionError::UnknownOutputNode {
                    pipeline_id: definition.id.clone(),
                    node_id: node_id.clone(),
                });
            }
        }

        let entry_set = definition.entry_nodes.iter().cloned().collect();

        Ok(Self {
            definition,
            index,
            predecessors,
            successors,
            entry_set,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> Option<&str> {
        self.definition.description.as_deref()
    }

    pub fn nodes(&self) -> &[PipelineNode] {
        &self.definition.nodes
    }

    pub fn edges(&self) -> &[PipelineEdge] {
        &self.definition.edges
    }

    pub fn entry_nodes(&self) -> &[String] {
        &self.definition.entry_nodes
    }

    pub fn output_nodes(&self) -> &[String] {
        &self.definition.output_nodes
    }

    pub fn node(&self, node_id: &str) -> Option<&PipelineNode> {
        self.index.get(node_id).map(|&i| &self.definition.nodes[i])
    }

    pub fn is_entry(&self, node_id: &str) -> bool {
        self.entry_set.contains(node_id)
    }

    /// Direct predecessors of a node, in edge declaration order
    pub fn predecessors(&self, node_id: &str) -> Vec<&PipelineNode> {
        self.index
            .get(node_id)
            .map(|&i| {
                self.predecessors[i]
                    .iter()
                    .map(|&p| &self.definition.nodes[p])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct successors of a node, in edge declaration order
    pub fn successors(&self, node_id: &str) -> Vec<&PipelineNode> {
        self.index
            .get(node_id)
            .map(|&i| {
                self.successors[i]
                    .iter()
                    .map(|&s| &self.definition.nodes[s])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Topological execution order (Kahn's algorithm).
    ///
    /// Among nodes that are ready at the same time, the one declared first
    /// runs first, so the order is deterministic for a given definition.
    pub fn execution_order(&self) -> Result<Vec<&PipelineNode>, PipelineError> {
        let node_count = self.definition.nodes.len();
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(node_count);

        while let Some(current) = ready.pop_first() {
            order.push(current);
            for &next in &self.successors[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < node_count {
            let unresolved = (0..node_count)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.definition.nodes[i].id.clone())
                .collect();
            return Err(PipelineError::CyclicPipeline {
                pipeline_id: self.definition.id.clone(),
                unresolved,
            });
        }

        Ok(order
            .into_iter()
            .map(|i| &self.definition.nodes[i])
            .collect())
    }

    /// Summary used by registry listings
    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            id: self.definition.id.clone(),
            name: self.definition.name.clone(),
        }
    }

    /// Extended metadata for a pipeline
    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            id: self.definition.id.clone(),
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            node_count: self.definition.nodes.len(),
            edge_count: self.definition.edges.len(),
            entry_nodes: self.definition.entry_nodes.clone(),
            output_nodes: self.definition.output_nodes.clone(),
        }
    }
}

impl TryFrom<PipelineDefinition> for Pipeline {
    type Error = DefinitionError;

    fn try_from(definition: PipelineDefinition) -> Result<Self, Self::Error> {
        Self::from_definition(definition)
    }
}

impl From<Pipeline> for PipelineDefinition {
    fn from(pipeline: Pipeline) -> Self {
        pipeline.definition
    }
}

/// `{id, name}` entry returned by pipeline listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: String,
    pub name: String,
}

/// Extended pipeline metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub node_count: usize,
    pub edge_count: usize,
    pub entry_nodes: Vec<String>,
    pub output_nodes: Vec<String>,
}
