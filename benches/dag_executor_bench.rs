//! Benchmark for DAG scheduling overhead
//!
//! Runs a wide fan-out/fan-in pipeline of no-op tools so the numbers
//! reflect scheduling, payload merging and task spawning rather than
//! plugin work.
//!
//! Run with:
//! ```bash
//! cargo bench --bench dag_executor_bench
//! ```

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use media_pipeline_core::{
    DagExecutor, Payload, Pipeline, PipelineEdge, PipelineNode, PipelineRegistry, Plugin,
    PluginError, PluginManifest, PluginRegistry, ToolDefinition,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

struct NoopPlugin {
    manifest: PluginManifest,
}

#[async_trait]
impl Plugin for NoopPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn run_tool(&self, tool_id: &str, mut payload: Payload) -> Result<Payload, PluginError> {
        payload.insert(tool_id.to_string(), json!(1));
        Ok(payload)
    }
}

fn noop_plugins() -> Arc<PluginRegistry> {
    let mut tools = BTreeMap::new();
    tools.insert("source".to_string(), ToolDefinition::default());
    tools.insert("branch".to_string(), ToolDefinition::default());
    tools.insert("sink".to_string(), ToolDefinition::default());

    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(NoopPlugin {
        manifest: PluginManifest {
            id: "noop".to_string(),
            name: "No-op".to_string(),
            description: String::new(),
            version: "0.1.0".to_string(),
            tools,
        },
    }));
    Arc::new(registry)
}

/// `source -> branch_0..width -> sink`
fn fan_out_pipeline(width: usize) -> Pipeline {
    let mut nodes = vec![PipelineNode::new("source", "noop", "source")];
    let mut edges = Vec::with_capacity(width * 2);
    for i in 0..width {
        let id = format!("branch_{i}");
        nodes.push(PipelineNode::new(id.clone(), "noop", "branch"));
        edges.push(PipelineEdge::new("source", id.clone()));
        edges.push(PipelineEdge::new(id, "sink"));
    }
    nodes.push(PipelineNode::new("sink", "noop", "sink"));

    Pipeline::new(
        "fan-out",
        "Fan out",
        nodes,
        edges,
        vec!["source".to_string()],
        vec!["sink".to_string()],
    )
    .expect("Failed to build benchmark pipeline")
}

fn benchmark_fan_out(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let plugins = noop_plugins();

    let mut group = c.benchmark_group("dag_fan_out");
    for width in [4usize, 16, 64] {
        let pipelines = Arc::new(PipelineRegistry::from_pipelines([fan_out_pipeline(width)]));
        let executor = DagExecutor::new(pipelines, Arc::clone(&plugins));

        for parallelism in [1usize, 8] {
            let executor = executor.clone().with_max_parallelism(parallelism);
            group.bench_with_input(
                BenchmarkId::new(format!("parallelism_{parallelism}"), width),
                &width,
                |b, _| {
                    b.iter(|| {
                        let result = runtime
                            .block_on(executor.run_pipeline("fan-out", Payload::new()))
                            .expect("Pipeline run failed");
                        black_box(result);
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, benchmark_fan_out);
criterion_main!(benches);
