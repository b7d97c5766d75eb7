use crate::cache::DataCache;
use crate::data::Value;
use crate::graph::{Graph, NodeId};

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub enum LoopState {
    #[default]
    Open,
    Accumulating,
    Closed,
}

/// Iteration scope of one loop evaluation.
///
/// Lives on the stack of the loop processor and is handed down the recursive
/// evaluation by reference. Nested loops chain to the enclosing context.
#[derive(Debug)]
pub struct LoopContext<'a> {
    loop_node: NodeId,
    step: i64,
    iteration: usize,
    state: LoopState,
    carried: Vec<Value>,
    elements: Vec<Option<Value>>,
    history: Vec<Vec<Value>>,
    parent: Option<&'a LoopContext<'a>>,
}

impl<'a> LoopContext<'a> {
    pub fn new(loop_node: NodeId, parent: Option<&'a LoopContext<'a>>) -> LoopContext<'a> {
        LoopContext {
            loop_node,
            step: 0,
            iteration: 0,
            state: LoopState::Open,
            carried: Vec::new(),
            elements: Vec::new(),
            history: Vec::new(),
            parent,
        }
    }

    pub fn loop_node(&self) -> NodeId {
        self.loop_node
    }
    pub fn step(&self) -> i64 {
        self.step
    }
    pub fn state(&self) -> LoopState {
        self.state
    }
    /// Number of iterations recorded so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Moves to the next step. Everything in the body reading the loop's interior
    /// input node or its looped inputs is invalidated, the rest stays cached.
    pub fn set_step(&mut self, step: i64, graph: &Graph, cache: &DataCache) {
        self.step = step;
        self.state = LoopState::Accumulating;

        let Some(data) = graph.node(self.loop_node).and_then(|node| node.kind.loop_data()) else {
            return;
        };
        cache.invalidate_within(graph, data.container.inputs_node, self.loop_node);
        cache.invalidate_within(graph, data.looped_node, self.loop_node);
    }

    /// Values seen by the looped node during the current iteration.
    pub fn add_data(&mut self, carried: Vec<Value>) {
        self.carried = carried;
    }
    pub fn data(&self, index: usize) -> Option<&Value> {
        self.carried.get(index)
    }

    /// Current element of each outer input iterated by a foreach, `None` for
    /// inputs that are not iterated.
    pub fn set_elements(&mut self, elements: Vec<Option<Value>>) {
        self.elements = elements;
    }
    pub fn element(&self, input: usize) -> Option<&Value> {
        self.elements.get(input)?.as_ref()
    }

    /// Stores the interior output values of the finished iteration.
    pub fn record(&mut self, values: Vec<Value>) {
        self.history.push(values);
        self.iteration += 1;
    }
    pub fn history(&self) -> &[Vec<Value>] {
        &self.history
    }
    pub fn last(&self) -> Option<&[Value]> {
        self.history.last().map(Vec::as_slice)
    }
    /// Ends the loop and hands out the recorded iterations.
    pub fn close(&mut self) -> Vec<Vec<Value>> {
        self.state = LoopState::Closed;
        std::mem::take(&mut self.history)
    }

    /// The context of `loop_node`, searching enclosing loops outward.
    pub fn find(&self, loop_node: NodeId) -> Option<&LoopContext<'a>> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if ctx.loop_node == loop_node {
                return Some(ctx);
            }
            current = ctx.parent;
        }
        None
    }
}
