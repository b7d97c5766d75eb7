use std::sync::Arc;

use log::info;

use crate::cache::DataCache;
use crate::config::EngineConfig;
use crate::data::Value;
use crate::elements::shader::{register_shader_compiler, ShaderCompiler};
use crate::evaluator::{CacheObserver, Evaluator};
use crate::graph::{Graph, GraphResult, InputAddress, NodeId, OutputAddress};
use crate::node_lib::NodeLibrary;
use crate::registry::Registry;

pub const COMPUTATION_TIME_PROPERTY: &str = "computation_time";

/// Owns the processor registry, the shared cache and the node library.
///
/// Graph edits made through the engine invalidate what they touch.
pub struct Engine {
    registry: Arc<Registry>,
    cache: Arc<DataCache>,
    node_lib: NodeLibrary,
    config: EngineConfig,
    observer: Option<Arc<CacheObserver>>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        Engine::with_registry(config, Arc::new(Registry::with_builtins()))
    }

    pub fn with_registry(config: EngineConfig, registry: Arc<Registry>) -> Engine {
        info!(
            "Engine started with {} typed and {} generic processors",
            registry.typed_keys().len(),
            registry.generic_keys().len()
        );

        Engine {
            registry,
            cache: Arc::new(DataCache::default()),
            node_lib: NodeLibrary::with_builtins(),
            config,
            observer: None,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }
    pub fn node_lib(&self) -> &NodeLibrary {
        &self.node_lib
    }
    pub fn node_lib_mut(&mut self) -> &mut NodeLibrary {
        &mut self.node_lib
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: Fn(&crate::evaluator::CacheEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
    }
    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn set_shader_compiler(&self, compiler: Arc<dyn ShaderCompiler>) {
        register_shader_compiler(&self.registry, compiler);
    }

    pub fn evaluator<'a>(&'a self, graph: &'a Graph) -> Evaluator<'a> {
        Evaluator::with_config(graph, &self.registry, &self.cache, &self.config)
            .with_observer(self.observer.as_deref())
    }

    pub fn evaluate(&self, graph: &Graph, output: OutputAddress) -> Value {
        self.evaluator(graph).evaluate_output(output)
    }

    pub fn evaluate_input(&self, graph: &Graph, input: InputAddress) -> Value {
        self.evaluator(graph).evaluate_input(input)
    }

    /// Moves the value out of the cache; see [`Evaluator::take_output`].
    pub fn take(&self, graph: &Graph, output: OutputAddress) -> Value {
        self.evaluator(graph).take_output(output)
    }

    pub fn is_cached(&self, node_id: NodeId) -> bool {
        self.cache.is_cached(node_id)
    }

    pub fn invalidate(&self, graph: &Graph, node_id: NodeId) {
        self.cache.invalidate(graph, node_id);
    }

    pub fn set_input_value(
        &self,
        graph: &mut Graph,
        input: InputAddress,
        value: Value,
    ) -> GraphResult<()> {
        graph.set_input_value(input, value)?;
        self.cache.invalidate(graph, input.node_id);
        Ok(())
    }

    pub fn connect(
        &self,
        graph: &mut Graph,
        from: OutputAddress,
        to: InputAddress,
    ) -> GraphResult<()> {
        graph.connect(from, to)?;
        self.cache.invalidate(graph, to.node_id);
        Ok(())
    }

    pub fn disconnect(&self, graph: &mut Graph, to: InputAddress) -> GraphResult<()> {
        graph.disconnect(to)?;
        self.cache.invalidate(graph, to.node_id);
        Ok(())
    }

    /// Invalidates the node and its dependents while connections still exist,
    /// then removes it.
    pub fn remove_node(&self, graph: &mut Graph, node_id: NodeId) -> GraphResult<()> {
        graph.try_node(node_id)?;
        self.cache.invalidate(graph, node_id);
        graph.remove_node(node_id)
    }

    pub fn create_node(
        &self,
        graph: &mut Graph,
        label: &str,
        container: Option<NodeId>,
    ) -> GraphResult<NodeId> {
        self.node_lib.create_by_label(graph, label, container)
    }

    /// Copies the measured run time of every cached node into its
    /// `computation_time` property.
    pub fn apply_run_times(&self, graph: &mut Graph) {
        let run_times: Vec<(NodeId, f64)> = graph
            .nodes()
            .filter_map(|node| self.cache.run_time(node.id).map(|time| (node.id, time)))
            .collect();

        for (node_id, run_time) in run_times {
            // the node was just listed
            let _ = graph.set_property(node_id, COMPUTATION_TIME_PROPERTY, Value::Float(run_time));
        }
    }
}
