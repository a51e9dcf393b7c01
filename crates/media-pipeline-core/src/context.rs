//! Per-run execution context

use crate::merge::{merge_into, merge_ordered};
use crate::pipeline::Pipeline;
use crate::plugin::Payload;
use std::collections::HashMap;

/// Mutable state for one pipeline run: the initial payload plus each
/// completed node's output keyed by node id. Owned by a single run and
/// dropped once the result is assembled.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    initial: Payload,
    outputs: HashMap<String, Payload>,
}

impl ExecutionContext {
    /// Create a context seeded with the caller's payload
    pub fn new(initial: Payload) -> Self {
        Self {
            initial,
            outputs: HashMap::new(),
        }
    }

    /// Build the input for `node_id`: the initial payload if it is an entry
    /// node, then each direct predecessor's output in edge order.
    pub fn input_for(&self, pipeline: &Pipeline, node_id: &str) -> Payload {
        let mut input = if pipeline.is_entry(node_id) {
            self.initial.clone()
        } else {
            Payload::new()
        };

        for predecessor in pipeline.predecessors(node_id) {
            debug_assert!(
                self.outputs.contains_key(&predecessor.id),
                "predecessor '{}' scheduled after '{}'",
                predecessor.id,
                node_id
            );
            if let Some(output) = self.outputs.get(&predecessor.id) {
                merge_into(&mut input, output);
            }
        }

        input
    }

    /// Store a node's output
    pub fn record_output(&mut self, node_id: impl Into<String>, output: Payload) {
        self.outputs.insert(node_id.into(), output);
    }

    /// Merge the outputs of the pipeline's output nodes in declaration order
    pub fn assemble_result(&self, pipeline: &Pipeline) -> Payload {
        merge_ordered(
            pipeline
                .output_nodes()
                .iter()
                .filter_map(|id| self.outputs.get(id)),
        )
    }

    /// Consume the context, returning all node outputs
    pub fn into_outputs(self) -> HashMap<String, Payload> {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineEdge, PipelineNode};
    use crate::plugin::test_support::payload;
    use serde_json::json;

    fn fan_in() -> Pipeline {
        Pipeline::new(
            "fan_in",
            "Fan in",
            vec![
                PipelineNode::new("left", "p", "t"),
                PipelineNode::new("right", "p", "t"),
                PipelineNode::new("join", "p", "t"),
            ],
            vec![
                PipelineEdge::new("left", "join"),
                PipelineEdge::new("right", "join"),
            ],
            vec!["left".into(), "right".into(), "join".into()],
            vec!["left".into(), "join".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_entry_input_is_initial_payload() {
        let pipeline = fan_in();
        let ctx = ExecutionContext::new(payload(json!({"uri": "frame.png"})));
        assert_eq!(ctx.input_for(&pipeline, "left")["uri"], json!("frame.png"));
    }

    #[test]
    fn test_predecessors_override_initial_in_edge_order() {
        let pipeline = fan_in();
        let mut ctx = ExecutionContext::new(payload(json!({"k": 0, "uri": "x"})));
        ctx.record_output("left", payload(json!({"k": 1, "left": true})));
        ctx.record_output("right", payload(json!({"k": 2})));

        let input = ctx.input_for(&pipeline, "join");
        assert_eq!(input["k"], json!(2));
        assert_eq!(input["uri"], json!("x"));
        assert_eq!(input["left"], json!(true));
    }

    #[test]
    fn test_assemble_result_uses_output_node_order() {
        let pipeline = fan_in();
        let mut ctx = ExecutionContext::new(Payload::new());
        ctx.record_output("left", payload(json!({"v": "left"})));
        ctx.record_output("join", payload(json!({"v": "join", "extra": 1})));

        let result = ctx.assemble_result(&pipeline);
        assert_eq!(result["v"], json!("join"));
        assert_eq!(result["extra"], json!(1));
        assert_eq!(ctx.into_outputs().len(), 2);
    }
}
