//! DAG pipeline executor
//!
//! Runs a [`Pipeline`] against an initial payload. Nodes execute in
//! dependency order; each node's input is the initial payload (entry nodes
//! only) merged with its predecessors' outputs in edge order, and the final
//! result merges the output nodes' outputs in declaration order.
//!
//! With `max_parallelism > 1`, nodes whose predecessors have all completed
//! run concurrently as tokio tasks. Merges never depend on completion order,
//! so the result is identical to a sequential run.

use crate::config::ExecutorConfig;
use crate::context::ExecutionContext;
use crate::error::{PipelineError, PluginError};
use crate::pipeline::{Pipeline, PipelineNode};
use crate::plugin::{Payload, Plugin, PluginRegistry};
use crate::registry::PipelineSource;
use crate::validator::{validate_pipeline, ValidationReport};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Tuning knobs for a [`DagExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Abort the run if a single node takes longer than this
    pub node_timeout: Option<Duration>,

    /// Maximum number of nodes in flight at once
    pub max_parallelism: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for ExecutorOptions {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            node_timeout: config.node_timeout(),
            max_parallelism: config.max_parallelism.max(1),
        }
    }
}

/// Detailed outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub pipeline_id: String,

    /// Merged output of the pipeline's output nodes
    pub result: Payload,

    /// Every node's output keyed by node id
    pub node_outputs: HashMap<String, Payload>,

    /// Node ids in the order they were scheduled
    pub execution_order: Vec<String>,

    pub duration: Duration,
}

/// Executes declarative pipelines against registered plugins
#[derive(Clone)]
pub struct DagExecutor {
    pipelines: Arc<dyn PipelineSource>,
    plugins: Arc<PluginRegistry>,
    options: ExecutorOptions,
}

impl DagExecutor {
    /// Create an executor with default options
    pub fn new(pipelines: Arc<dyn PipelineSource>, plugins: Arc<PluginRegistry>) -> Self {
        Self {
            pipelines,
            plugins,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the per-node timeout. `None` disables it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.node_timeout = timeout;
        self
    }

    pub fn with_max_parallelism(mut self, max: usize) -> Self {
        self.options.max_parallelism = max.max(1);
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn pipelines(&self) -> &dyn PipelineSource {
        self.pipelines.as_ref()
    }

    /// Run pipeline `pipeline_id` and return its merged result
    pub async fn run_pipeline(
        &self,
        pipeline_id: &str,
        payload: Payload,
    ) -> Result<Payload, PipelineError> {
        Ok(self.run_detailed(pipeline_id, payload).await?.result)
    }

    /// Run pipeline `pipeline_id` and return the full report
    pub async fn run_detailed(
        &self,
        pipeline_id: &str,
        payload: Payload,
    ) -> Result<RunReport, PipelineError> {
        let pipeline = self
            .pipelines
            .get_pipeline(pipeline_id)
            .ok_or_else(|| PipelineError::PipelineNotFound(pipeline_id.to_string()))?;
        self.execute(&pipeline, payload).await
    }

    /// Type-check a registered pipeline against the plugin manifests
    pub fn validate_pipeline(&self, pipeline_id: &str) -> Result<ValidationReport, PipelineError> {
        let pipeline = self
            .pipelines
            .get_pipeline(pipeline_id)
            .ok_or_else(|| PipelineError::PipelineNotFound(pipeline_id.to_string()))?;
        let metadata = self.plugins.tool_metadata(&pipeline);
        Ok(validate_pipeline(&pipeline, &metadata))
    }

    /// Execute an already resolved pipeline
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        payload: Payload,
    ) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        info!(
            "Running pipeline '{}' ({} nodes, {} edges)",
            pipeline.id(),
            pipeline.nodes().len(),
            pipeline.edges().len()
        );

        let order = pipeline.execution_order()?;

        // Resolve every plugin and tool before running anything
        let mut resolved: HashMap<&str, Arc<dyn Plugin>> = HashMap::with_capacity(order.len());
        for node in &order {
            let plugin = self.plugins.resolve_tool(&node.plugin_id, &node.tool_id)?;
            resolved.insert(node.id.as_str(), plugin);
        }

        let mut ctx = ExecutionContext::new(payload);
        let execution_order = if self.options.max_parallelism <= 1 {
            self.run_sequential(pipeline, &order, &resolved, &mut ctx)
                .await?
        } else {
            self.run_concurrent(pipeline, &order, &resolved, &mut ctx)
                .await?
        };

        let result = ctx.assemble_result(pipeline);
        let duration = start.elapsed();
        info!(
            "Pipeline '{}' completed in {:.2}s",
            pipeline.id(),
            duration.as_secs_f64()
        );

        Ok(RunReport {
            pipeline_id: pipeline.id().to_string(),
            result,
            node_outputs: ctx.into_outputs(),
            execution_order,
            duration,
        })
    }

    async fn run_sequential(
        &self,
        pipeline: &Pipeline,
        order: &[&PipelineNode],
        resolved: &HashMap<&str, Arc<dyn Plugin>>,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<String>, PipelineError> {
        let mut executed = Vec::with_capacity(order.len());
        for (idx, node) in order.iter().enumerate() {
            debug!(
                "--- Node {}/{}: {} ({}/{}) ---",
                idx + 1,
                order.len(),
                node.id,
                node.plugin_id,
                node.tool_id
            );
            let input = ctx.input_for(pipeline, &node.id);
            let plugin = Arc::clone(&resolved[node.id.as_str()]);
            let output = invoke_node(plugin, (*node).clone(), input, self.options.node_timeout)
                .await?;
            ctx.record_output(node.id.clone(), output);
            executed.push(node.id.clone());
        }
        Ok(executed)
    }

    async fn run_concurrent(
        &self,
        pipeline: &Pipeline,
        order: &[&PipelineNode],
        resolved: &HashMap<&str, Arc<dyn Plugin>>,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<String>, PipelineError> {
        // Position in topological order, used to pick ready nodes deterministically
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();
        let mut remaining: Vec<usize> = order
            .iter()
            .map(|node| pipeline.predecessors(&node.id).len())
            .collect();
        let mut ready: BTreeSet<usize> = (0..order.len()).filter(|&i| remaining[i] == 0).collect();
        let mut executed = Vec::with_capacity(order.len());

        while !ready.is_empty() {
            let mut wave = Vec::with_capacity(self.options.max_parallelism);
            while wave.len() < self.options.max_parallelism {
                match ready.pop_first() {
                    Some(i) => wave.push(i),
                    None => break,
                }
            }

            debug!(
                "Scheduling {} node(s) concurrently: {:?}",
                wave.len(),
                wave.iter().map(|&i| &order[i].id).collect::<Vec<_>>()
            );

            let mut wave_tasks = WaveTasks(Vec::with_capacity(wave.len()));
            for &i in &wave {
                let node = order[i];
                let input = ctx.input_for(pipeline, &node.id);
                let plugin = Arc::clone(&resolved[node.id.as_str()]);
                let timeout = self.options.node_timeout;
                let owned = node.clone();
                wave_tasks
                    .0
                    .push(tokio::spawn(invoke_node(plugin, owned, input, timeout)));
            }

            // Await in wave order; returning early drops `wave_tasks`, which
            // aborts whatever is still running
            let mut outputs = Vec::with_capacity(wave.len());
            for (&i, handle) in wave.iter().zip(wave_tasks.0.iter_mut()) {
                match handle.await {
                    Ok(Ok(output)) => outputs.push((i, output)),
                    Ok(Err(e)) => return Err(e),
                    Err(join_err) => {
                        return Err(PipelineError::TaskAborted {
                            node_id: order[i].id.clone(),
                            reason: join_err.to_string(),
                        })
                    }
                }
            }

            for (i, output) in outputs {
                let node = order[i];
                ctx.record_output(node.id.clone(), output);
                executed.push(node.id.clone());
                for successor in pipeline.successors(&node.id) {
                    let s = position[successor.id.as_str()];
                    remaining[s] -= 1;
                    if remaining[s] == 0 {
                        ready.insert(s);
                    }
                }
            }
        }

        Ok(executed)
    }
}

impl std::fmt::Debug for DagExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagExecutor")
            .field("plugins", &self.plugins)
            .field("options", &self.options)
            .finish()
    }
}

/// Node tasks of one wave, aborted when dropped so a cancelled run does
/// not leave tool calls running in the background
struct WaveTasks(Vec<JoinHandle<Result<Payload, PipelineError>>>);

impl Drop for WaveTasks {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Run one node's tool, applying the timeout and attaching node context to errors
async fn invoke_node(
    plugin: Arc<dyn Plugin>,
    node: PipelineNode,
    input: Payload,
    timeout: Option<Duration>,
) -> Result<Payload, PipelineError> {
    let start = Instant::now();
    let call = plugin.run_tool(&node.tool_id, input);

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Node '{}' timed out after {}s",
                    node.id,
                    limit.as_secs_f64()
                );
                return Err(PipelineError::NodeTimeout {
                    node_id: node.id,
                    timeout: limit,
                });
            }
        },
        None => call.await,
    };

    match outcome {
        Ok(output) => {
            debug!(
                "  ✓ Node '{}' completed in {:.3}s ({} keys)",
                node.id,
                start.elapsed().as_secs_f64(),
                output.len()
            );
            Ok(output)
        }
        Err(source) => {
            error!("Node '{}' failed: {}", node.id, source);
            Err(node_failed(node, source))
        }
    }
}

fn node_failed(node: PipelineNode, source: PluginError) -> PipelineError {
    PipelineError::NodeFailed {
        node_id: node.id,
        plugin_id: node.plugin_id,
        tool_id: node.tool_id,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineEdge;
    use crate::plugin::test_support::{payload, MockPlugin};
    use crate::registry::PipelineRegistry;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    /// Each tool tags the payload with its own name and counts visits
    fn tagging_plugin() -> Arc<MockPlugin> {
        Arc::new(MockPlugin::new(
            "vision",
            &[
                ("decode", &["video"], &["frame"]),
                ("ocr", &["frame"], &["text"]),
                ("detect", &["frame"], &["boxes"]),
                ("fuse", &["text", "boxes"], &["report"]),
                ("fail", &[], &[]),
            ],
            |tool, mut payload| {
                if tool == "fail" {
                    return Err(PluginError::ExecutionFailed("model crashed".to_string()));
                }
                let mut visits = payload
                    .get("visits")
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default();
                visits.push(json!(tool));
                payload.insert("visits".to_string(), json!(visits));
                payload.insert(tool.to_string(), json!(true));
                payload.insert("last".to_string(), json!(tool));
                Ok(payload)
            },
        ))
    }

    fn executor_for(pipelines: Vec<Pipeline>, plugin: Arc<MockPlugin>) -> DagExecutor {
        let mut plugins = PluginRegistry::new();
        plugins.register(plugin);
        DagExecutor::new(
            Arc::new(PipelineRegistry::from_pipelines(pipelines)),
            Arc::new(plugins),
        )
    }

    fn diamond() -> Pipeline {
        Pipeline::new(
            "diamond",
            "Diamond",
            vec![
                PipelineNode::new("decode", "vision", "decode"),
                PipelineNode::new("ocr", "vision", "ocr"),
                PipelineNode::new("detect", "vision", "detect"),
                PipelineNode::new("fuse", "vision", "fuse"),
            ],
            vec![
                PipelineEdge::new("decode", "ocr"),
                PipelineEdge::new("decode", "detect"),
                PipelineEdge::new("ocr", "fuse"),
                PipelineEdge::new("detect", "fuse"),
            ],
            vec!["decode".into()],
            vec!["fuse".into()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_single_node_returns_tool_output_unmodified() {
        let plugin = Arc::new(MockPlugin::new(
            "ocr",
            &[("read", &[], &[])],
            |_, _| Ok(payload(json!({"text": "STOP"}))),
        ));
        let pipeline = Pipeline::new(
            "single",
            "Single",
            vec![PipelineNode::new("only", "ocr", "read")],
            vec![],
            vec!["only".into()],
            vec!["only".into()],
        )
        .unwrap();
        let executor = executor_for(vec![pipeline], plugin);

        let result = executor
            .run_pipeline("single", payload(json!({"image": "a.png"})))
            .await
            .unwrap();
        assert_eq!(result, payload(json!({"text": "STOP"})));
    }

    #[tokio::test]
    async fn test_diamond_runs_each_node_once() {
        let plugin = tagging_plugin();
        let executor = executor_for(vec![diamond()], Arc::clone(&plugin)).with_max_parallelism(1);

        let report = executor
            .run_detailed("diamond", payload(json!({"uri": "clip.mp4"})))
            .await
            .unwrap();

        assert_eq!(plugin.total_calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            report.execution_order,
            vec!["decode", "ocr", "detect", "fuse"]
        );
        assert_eq!(report.result["uri"], json!("clip.mp4"));
        assert_eq!(report.result["ocr"], json!(true));
        assert_eq!(report.result["detect"], json!(true));
        assert_eq!(report.result["last"], json!("fuse"));
        // detect is the later predecessor edge, so its visit list wins the merge
        assert_eq!(
            report.result["visits"],
            json!(["decode", "detect", "fuse"])
        );
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let sequential = executor_for(vec![diamond()], tagging_plugin()).with_max_parallelism(1);
        let concurrent = executor_for(vec![diamond()], tagging_plugin()).with_max_parallelism(8);
        let input = payload(json!({"uri": "clip.mp4"}));

        let a = sequential.run_pipeline("diamond", input.clone()).await.unwrap();
        let b = concurrent.run_pipeline("diamond", input).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_output_nodes_returns_empty_record() {
        let pipeline = Pipeline::new(
            "silent",
            "Silent",
            vec![PipelineNode::new("decode", "vision", "decode")],
            vec![],
            vec!["decode".into()],
            vec![],
        )
        .unwrap();
        let executor = executor_for(vec![pipeline], tagging_plugin());

        let result = executor
            .run_pipeline("silent", payload(json!({"uri": "x"})))
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pipeline() {
        let executor = executor_for(vec![], tagging_plugin());
        let err = executor
            .run_pipeline("nope", Payload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PipelineNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_missing_plugin_fails_before_running_nodes() {
        let plugin = tagging_plugin();
        let pipeline = Pipeline::new(
            "broken",
            "Broken",
            vec![
                PipelineNode::new("decode", "vision", "decode"),
                PipelineNode::new("track", "tracking", "track"),
            ],
            vec![PipelineEdge::new("decode", "track")],
            vec!["decode".into()],
            vec!["track".into()],
        )
        .unwrap();
        let executor =
            executor_for(vec![pipeline], Arc::clone(&plugin)).with_max_parallelism(1);

        let err = executor
            .run_pipeline("broken", Payload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PluginNotFound(ref id) if id == "tracking"));
        assert!(err.to_string().contains("tracking"));
        assert_eq!(plugin.total_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_is_distinct_error() {
        let pipeline = Pipeline::new(
            "p",
            "P",
            vec![PipelineNode::new("a", "vision", "segment")],
            vec![],
            vec!["a".into()],
            vec!["a".into()],
        )
        .unwrap();
        let executor = executor_for(vec![pipeline], tagging_plugin());

        let err = executor.run_pipeline("p", Payload::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolNotFound { tool_id, .. } if tool_id == "segment"));
    }

    #[tokio::test]
    async fn test_tool_failure_aborts_with_node_context() {
        let plugin = tagging_plugin();
        let pipeline = Pipeline::new(
            "failing",
            "Failing",
            vec![
                PipelineNode::new("decode", "vision", "decode"),
                PipelineNode::new("explode", "vision", "fail"),
                PipelineNode::new("after", "vision", "ocr"),
            ],
            vec![
                PipelineEdge::new("decode", "explode"),
                PipelineEdge::new("explode", "after"),
            ],
            vec!["decode".into()],
            vec!["after".into()],
        )
        .unwrap();
        let executor =
            executor_for(vec![pipeline], Arc::clone(&plugin)).with_max_parallelism(1);

        let err = executor
            .run_pipeline("failing", Payload::new())
            .await
            .unwrap_err();
        match err {
            PipelineError::NodeFailed {
                node_id,
                plugin_id,
                tool_id,
                ..
            } => {
                assert_eq!(node_id, "explode");
                assert_eq!(plugin_id, "vision");
                assert_eq!(tool_id, "fail");
            }
            other => panic!("expected NodeFailed, got {other:?}"),
        }
        assert_eq!(plugin.calls(), vec!["decode".to_string(), "fail".to_string()]);
    }

    #[tokio::test]
    async fn test_cyclic_pipeline_is_rejected() {
        let pipeline = Pipeline::new(
            "loop",
            "Loop",
            vec![
                PipelineNode::new("a", "vision", "ocr"),
                PipelineNode::new("b", "vision", "detect"),
            ],
            vec![PipelineEdge::new("a", "b"), PipelineEdge::new("b", "a")],
            vec!["a".into()],
            vec!["b".into()],
        )
        .unwrap();
        let plugin = tagging_plugin();
        let executor =
            executor_for(vec![pipeline], Arc::clone(&plugin)).with_max_parallelism(1);

        let err = executor.run_pipeline("loop", Payload::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::CyclicPipeline { .. }));
        assert_eq!(plugin.total_calls.load(Ordering::SeqCst), 0);
    }

    /// Sleeps before echoing the payload, counting calls that ran to completion
    struct SlowPlugin {
        manifest: crate::plugin::PluginManifest,
        delay: Duration,
        completed: std::sync::atomic::AtomicUsize,
    }

    impl SlowPlugin {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                manifest: serde_yaml::from_str("id: slow\ntools:\n  wait: {}\n").unwrap(),
                delay,
                completed: Default::default(),
            })
        }
    }

    #[async_trait::async_trait]
    impl Plugin for SlowPlugin {
        fn manifest(&self) -> &crate::plugin::PluginManifest {
            &self.manifest
        }

        async fn run_tool(&self, _tool_id: &str, payload: Payload) -> Result<Payload, PluginError> {
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(payload)
        }
    }

    fn slow_executor(plugin: Arc<SlowPlugin>, node_ids: &[&str]) -> DagExecutor {
        let ids: Vec<String> = node_ids.iter().map(|id| id.to_string()).collect();
        let pipeline = Pipeline::new(
            "slow",
            "Slow",
            ids.iter()
                .map(|id| PipelineNode::new(id.clone(), "slow", "wait"))
                .collect(),
            vec![],
            ids.clone(),
            ids,
        )
        .unwrap();
        let mut plugins = PluginRegistry::new();
        plugins.register(plugin);
        DagExecutor::new(
            Arc::new(PipelineRegistry::from_pipelines([pipeline])),
            Arc::new(plugins),
        )
    }

    #[tokio::test]
    async fn test_node_timeout() {
        let executor = slow_executor(SlowPlugin::new(Duration::from_secs(5)), &["wait"])
            .with_max_parallelism(1)
            .with_timeout(Some(Duration::from_millis(20)));

        let err = executor.run_pipeline("slow", Payload::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NodeTimeout { node_id, .. } if node_id == "wait"));
    }

    #[tokio::test]
    async fn test_cancelled_concurrent_run_stops_node_tasks() {
        let plugin = SlowPlugin::new(Duration::from_millis(200));
        let executor =
            slow_executor(Arc::clone(&plugin), &["left", "right"]).with_max_parallelism(4);

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            executor.run_pipeline("slow", Payload::new()),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(plugin.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_failure_reports_failing_node() {
        let plugin = tagging_plugin();
        let pipeline = Pipeline::new(
            "split",
            "Split",
            vec![
                PipelineNode::new("decode", "vision", "decode"),
                PipelineNode::new("explode", "vision", "fail"),
                PipelineNode::new("after", "vision", "ocr"),
            ],
            vec![PipelineEdge::new("explode", "after")],
            vec!["decode".into(), "explode".into()],
            vec!["decode".into(), "after".into()],
        )
        .unwrap();
        let executor =
            executor_for(vec![pipeline], Arc::clone(&plugin)).with_max_parallelism(4);

        let err = executor
            .run_detailed("split", Payload::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::NodeFailed { ref node_id, .. } if node_id == "explode"),
            "unexpected error: {err:?}"
        );
        // The wave stops at the failure, so the successor never runs
        assert!(!plugin.calls().contains(&"ocr".to_string()));
    }

    #[test]
    fn test_validate_registered_pipeline() {
        let executor = executor_for(vec![diamond()], tagging_plugin());
        let report = executor.validate_pipeline("diamond").unwrap();
        assert!(report.valid, "unexpected errors: {:?}", report.errors);

        assert!(matches!(
            executor.validate_pipeline("missing"),
            Err(PipelineError::PipelineNotFound(_))
        ));
    }
}
