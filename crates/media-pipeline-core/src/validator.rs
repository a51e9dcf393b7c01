//! Edge-level type compatibility checks
//!
//! For every edge the producer's declared output types must intersect the
//! consumer's declared input types. Nodes without metadata and empty type
//! lists impose no constraint, so untyped plugins always pass.

use crate::pipeline::Pipeline;
use crate::plugin::ToolMetadata;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Result of validating a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Collect one error message per incompatible edge
pub fn validate_types(
    pipeline: &Pipeline,
    tool_metadata: &HashMap<String, ToolMetadata>,
) -> Vec<String> {
    let mut errors = Vec::new();

    for edge in pipeline.edges() {
        let (Some(from), Some(to)) = (
            tool_metadata.get(&edge.from_node),
            tool_metadata.get(&edge.to_node),
        ) else {
            continue;
        };

        if from.output_types.is_empty() || to.input_types.is_empty() {
            continue;
        }

        let produced: HashSet<&str> = from.output_types.iter().map(String::as_str).collect();
        let compatible = to
            .input_types
            .iter()
            .any(|t| produced.contains(t.as_str()));

        if !compatible {
            errors.push(format!(
                "Type mismatch: node '{}' outputs [{}] but node '{}' accepts [{}]",
                edge.from_node,
                from.output_types.join(", "),
                edge.to_node,
                to.input_types.join(", ")
            ));
        }
    }

    errors
}

/// Validate a pipeline and wrap the findings in a report
pub fn validate_pipeline(
    pipeline: &Pipeline,
    tool_metadata: &HashMap<String, ToolMetadata>,
) -> ValidationReport {
    ValidationReport::from_errors(validate_types(pipeline, tool_metadata))
}
