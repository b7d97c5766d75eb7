use std::time::Instant;

use log::{debug, warn};

use crate::benchmark::Benchmark;
use crate::cache::DataCache;
use crate::config::EngineConfig;
use crate::data::{DataType, Value};
use crate::graph::{
    Binding, Graph, InputAddress, LoopKind, Node, NodeId, NodeKind, OutputAddress, FOR_STEP_INPUT,
};
use crate::loop_context::LoopContext;
use crate::registry::Registry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    Status(String),
    CacheUpdated { node_id: NodeId },
}

pub type CacheObserver = dyn Fn(&CacheEvent) + Send + Sync;

/// Pull-based evaluation of one graph against a shared cache.
///
/// Cheap to create; holds only borrows.
pub struct Evaluator<'a> {
    graph: &'a Graph,
    registry: &'a Registry,
    cache: &'a DataCache,
    observer: Option<&'a CacheObserver>,
    report_benchmarks: bool,
    emit_status_events: bool,
    max_loop_iterations: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(graph: &'a Graph, registry: &'a Registry, cache: &'a DataCache) -> Evaluator<'a> {
        Self::with_config(graph, registry, cache, &EngineConfig::default())
    }

    pub fn with_config(
        graph: &'a Graph,
        registry: &'a Registry,
        cache: &'a DataCache,
        config: &EngineConfig,
    ) -> Evaluator<'a> {
        Evaluator {
            graph,
            registry,
            cache,
            observer: None,
            report_benchmarks: config.report_benchmarks,
            emit_status_events: config.emit_status_events,
            max_loop_iterations: config.max_loop_iterations,
        }
    }

    pub fn with_observer(mut self, observer: Option<&'a CacheObserver>) -> Evaluator<'a> {
        self.observer = observer;
        self
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }
    pub fn cache(&self) -> &'a DataCache {
        self.cache
    }

    /// Value of an output socket, computing its node on a cache miss.
    pub fn evaluate_output(&self, addr: OutputAddress) -> Value {
        self.output_value(addr, None, None)
    }

    /// Upstream value of a connected input, else its literal.
    pub fn evaluate_input(&self, addr: InputAddress) -> Value {
        self.input_value(addr, None, None)
    }

    /// Like [`Self::evaluate_output`], but moves the value out of the cache.
    /// Later reads see an empty value until the node is invalidated.
    pub fn take_output(&self, addr: OutputAddress) -> Value {
        if let Some(value) = self.cache.take(addr.node_id, addr.index) {
            return value;
        }

        let outputs = self.cache_inputs(addr, None, None);
        if outputs.is_empty() {
            return Value::None;
        }
        self.cache.take(addr.node_id, addr.index).unwrap_or_default()
    }

    pub(crate) fn output_value(
        &self,
        addr: OutputAddress,
        loop_ctx: Option<&LoopContext<'_>>,
        parent: Option<&mut Benchmark>,
    ) -> Value {
        if let Some(value) = self.intercept(addr, loop_ctx) {
            return value;
        }
        if let Some(value) = self.cache.output(addr.node_id, addr.index) {
            return value;
        }

        let mut outputs = self.cache_inputs(addr, loop_ctx, parent);
        if addr.index < outputs.len() {
            outputs.swap_remove(addr.index)
        } else {
            Value::None
        }
    }

    pub(crate) fn input_value(
        &self,
        addr: InputAddress,
        loop_ctx: Option<&LoopContext<'_>>,
        parent: Option<&mut Benchmark>,
    ) -> Value {
        let Ok(input) = self.graph.input(addr) else {
            warn!("Input {} of node {} does not exist", addr.index, addr.node_id);
            return Value::None;
        };

        match input.binding {
            Binding::Output(output) => self
                .output_value(output, loop_ctx, parent)
                .convert_type(&input.data_type),
            Binding::None => input.value.clone(),
        }
    }

    /// Reads served by an active loop: the counter of a `For` loop, the current
    /// elements of a `Foreach` and the looped values. These never go through the cache.
    fn intercept(&self, addr: OutputAddress, loop_ctx: Option<&LoopContext<'_>>) -> Option<Value> {
        let loop_ctx = loop_ctx?;
        match self.graph.node(addr.node_id)?.kind {
            NodeKind::Inputs { container } => {
                let data = self.graph.node(container)?.kind.loop_data()?;
                let ctx = loop_ctx.find(container)?;
                match data.kind {
                    LoopKind::For if addr.index == FOR_STEP_INPUT => Some(Value::Int(ctx.step())),
                    LoopKind::Foreach => ctx.element(addr.index).cloned(),
                    _ => None,
                }
            }
            NodeKind::LoopedInputs { container } => loop_ctx
                .find(container)
                .map(|ctx| ctx.data(addr.index).cloned().unwrap_or_default()),
            _ => None,
        }
    }

    /// Runs the processor of the node owning `addr` and caches all its outputs.
    fn cache_inputs(
        &self,
        addr: OutputAddress,
        loop_ctx: Option<&LoopContext<'_>>,
        parent: Option<&mut Benchmark>,
    ) -> Vec<Value> {
        let Some(node) = self.graph.node(addr.node_id) else {
            warn!("Node {} not found", addr.node_id);
            return Vec::new();
        };

        let data_type = self.graph.resolved_output_type(addr);
        let node_type = node.node_type();
        let Some(processor) = self.registry.resolve(&data_type, &node_type) else {
            warn!(
                "No processor for {} producing {} (node \"{}\")",
                node_type, data_type, node.name
            );
            return Vec::new();
        };

        if self.emit_status_events {
            self.emit(&CacheEvent::Status(format!("Evaluating {}", node.name)));
        }

        let start = Instant::now();
        let mut ctx = ProcessContext {
            evaluator: self,
            node,
            output_index: addr.index,
            data_type,
            loop_ctx,
            outputs: Vec::new(),
            benchmark: Benchmark::new(node.name.clone()),
        };
        (processor)(&mut ctx);
        let ProcessContext {
            outputs,
            mut benchmark,
            ..
        } = ctx;
        benchmark.elapsed = start.elapsed();

        let run_time = benchmark.elapsed.as_secs_f64();
        debug!(
            "Computed {} outputs of \"{}\" in {:.3} ms",
            outputs.len(),
            node.name,
            run_time * 1000.0
        );
        self.cache.store(node.id, outputs.clone(), run_time);

        if self.emit_status_events {
            self.emit(&CacheEvent::Status(format!("Evaluated {}", node.name)));
        }
        self.emit(&CacheEvent::CacheUpdated { node_id: node.id });

        match parent {
            Some(parent) => parent.add_child(benchmark),
            None if self.report_benchmarks => benchmark.log_report(),
            None => {}
        }

        outputs
    }

    fn emit(&self, event: &CacheEvent) {
        if let Some(observer) = self.observer {
            observer(event);
        }
    }
}

/// What a processor sees: its node, lazy access to the node's inputs and the
/// output vector it fills.
pub struct ProcessContext<'a> {
    evaluator: &'a Evaluator<'a>,
    node: &'a Node,
    output_index: usize,
    data_type: DataType,
    loop_ctx: Option<&'a LoopContext<'a>>,
    outputs: Vec<Value>,
    benchmark: Benchmark,
}

impl<'a> ProcessContext<'a> {
    pub fn node(&self) -> &'a Node {
        self.node
    }
    pub fn graph(&self) -> &'a Graph {
        self.evaluator.graph
    }
    pub fn cache(&self) -> &'a DataCache {
        self.evaluator.cache
    }
    /// Resolved type of the requested output.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
    pub fn output_index(&self) -> usize {
        self.output_index
    }
    pub fn loop_context(&self) -> Option<&'a LoopContext<'a>> {
        self.loop_ctx
    }
    pub fn max_loop_iterations(&self) -> usize {
        self.evaluator.max_loop_iterations
    }

    pub fn input_count(&self) -> usize {
        self.node.inputs.len()
    }

    /// Effective value of input `index` of the current node.
    pub fn input(&mut self, index: usize) -> Value {
        let addr = self.node.input(index);
        self.evaluate_input(addr)
    }

    /// Unconnected wildcard inputs without a literal are absent.
    pub fn is_input_absent(&self, index: usize) -> bool {
        self.node.inputs.get(index).map_or(true, |input| {
            input.binding == Binding::None && input.data_type.is_variable() && input.value.is_none()
        })
    }

    /// Values of every present input, skipping empty ones.
    pub fn present_inputs(&mut self) -> Vec<Value> {
        let present: Vec<usize> = (0..self.input_count())
            .filter(|index| !self.is_input_absent(*index))
            .collect();

        present
            .into_iter()
            .map(|index| self.input(index))
            .filter(|value| !value.is_none())
            .collect()
    }

    pub fn evaluate_input(&mut self, addr: InputAddress) -> Value {
        self.evaluator
            .input_value(addr, self.loop_ctx, Some(&mut self.benchmark))
    }

    pub fn evaluate_output(&mut self, addr: OutputAddress) -> Value {
        self.evaluator
            .output_value(addr, self.loop_ctx, Some(&mut self.benchmark))
    }

    /// Evaluates `addr` inside the iteration scope `loop_ctx`.
    pub fn evaluate_input_in(&mut self, loop_ctx: &LoopContext<'_>, addr: InputAddress) -> Value {
        self.evaluator
            .input_value(addr, Some(loop_ctx), Some(&mut self.benchmark))
    }

    pub fn push_output(&mut self, value: Value) {
        self.outputs.push(value);
    }

    pub fn set_output(&mut self, index: usize, value: Value) {
        if self.outputs.len() <= index {
            self.outputs.resize(index + 1, Value::None);
        }
        self.outputs[index] = value;
    }
}
