use hashbrown::{HashMap, HashSet};
use log::debug;
use parking_lot::RwLock;

use crate::data::Value;
use crate::graph::{Graph, NodeId, NodeKind, OutputAddress};

#[derive(Clone, Default, Debug)]
pub struct CacheEntry {
    pub outputs: Vec<Value>,
    // seconds
    pub run_time: f64,
}

/// Memoized outputs per node.
///
/// The lock guards bookkeeping only. It is never held while a processor
/// runs, so evaluation may freely re-enter the cache.
#[derive(Default, Debug)]
pub struct DataCache {
    entries: RwLock<HashMap<NodeId, CacheEntry>>,
}

enum InvalidationStep {
    Node(NodeId),
    Downstream(OutputAddress),
}

impl DataCache {
    pub fn is_cached(&self, node_id: NodeId) -> bool {
        self.entries
            .read()
            .get(&node_id)
            .is_some_and(|entry| !entry.outputs.is_empty())
    }

    /// `None` when the node is not cached, `Some(Value::None)` when it is but
    /// produced fewer outputs than `index + 1`.
    pub fn output(&self, node_id: NodeId, index: usize) -> Option<Value> {
        let entries = self.entries.read();
        let entry = entries.get(&node_id)?;
        if entry.outputs.is_empty() {
            return None;
        }
        Some(entry.outputs.get(index).cloned().unwrap_or_default())
    }

    pub fn outputs(&self, node_id: NodeId) -> Option<Vec<Value>> {
        self.entries
            .read()
            .get(&node_id)
            .filter(|entry| !entry.outputs.is_empty())
            .map(|entry| entry.outputs.clone())
    }

    /// Inserts or replaces the entry of `node_id`. Empty output sets are not stored.
    pub fn store(&self, node_id: NodeId, outputs: Vec<Value>, run_time: f64) {
        if outputs.is_empty() {
            return;
        }
        self.entries
            .write()
            .insert(node_id, CacheEntry { outputs, run_time });
    }

    /// Moves a cached value out, leaving an empty value in its slot.
    pub fn take(&self, node_id: NodeId, index: usize) -> Option<Value> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&node_id)?;
        if entry.outputs.is_empty() {
            return None;
        }
        Some(
            entry
                .outputs
                .get_mut(index)
                .map(std::mem::take)
                .unwrap_or_default(),
        )
    }

    pub fn run_time(&self, node_id: NodeId) -> Option<f64> {
        self.entries.read().get(&node_id).map(|entry| entry.run_time)
    }

    /// Drops the entry of one node without touching its dependents.
    pub fn invalidate_node(&self, node_id: NodeId) -> bool {
        self.entries.write().remove(&node_id).is_some()
    }

    /// Drops the entry of `node_id` and of everything that depends on it.
    ///
    /// Reaching an interior output-socket node continues from the matching
    /// output of its container. Invalidating a container drops its whole interior.
    pub fn invalidate(&self, graph: &Graph, node_id: NodeId) {
        self.invalidate_from(graph, node_id, None);
    }

    /// Like [`Self::invalidate`], but the walk never leaves `container`:
    /// its output-socket node is the last node visited.
    pub fn invalidate_within(&self, graph: &Graph, node_id: NodeId, container: NodeId) {
        self.invalidate_from(graph, node_id, Some(container));
    }

    fn invalidate_from(&self, graph: &Graph, node_id: NodeId, boundary: Option<NodeId>) {
        let downstream = graph.downstream_index();
        let mut seen_nodes: HashSet<NodeId> = HashSet::new();
        let mut seen_outputs: HashSet<OutputAddress> = HashSet::new();
        let mut stack = vec![InvalidationStep::Node(node_id)];
        let mut removed = 0usize;

        while let Some(step) = stack.pop() {
            match step {
                InvalidationStep::Node(id) => {
                    if !seen_nodes.insert(id) {
                        continue;
                    }
                    if self.invalidate_node(id) {
                        removed += 1;
                    }

                    let Some(node) = graph.node(id) else {
                        continue;
                    };
                    match &node.kind {
                        NodeKind::Outputs { container } if boundary != Some(*container) => {
                            let outputs = graph.node(*container).map_or(0, |c| c.outputs.len());
                            if self.invalidate_node(*container) {
                                removed += 1;
                            }
                            stack.extend((0..outputs).map(|index| {
                                InvalidationStep::Downstream(OutputAddress {
                                    node_id: *container,
                                    index,
                                })
                            }));
                        }
                        NodeKind::Loop(data) => {
                            stack.push(InvalidationStep::Node(data.looped_node));
                        }
                        _ => {}
                    }
                    if let Some(data) = node.kind.container_data() {
                        stack.push(InvalidationStep::Node(data.inputs_node));
                        stack.push(InvalidationStep::Node(data.outputs_node));
                        stack.extend(data.members.iter().copied().map(InvalidationStep::Node));
                    }
                    stack.extend(
                        (0..node.outputs.len()).map(|index| {
                            InvalidationStep::Downstream(node.output(index))
                        }),
                    );
                }
                InvalidationStep::Downstream(addr) => {
                    if !seen_outputs.insert(addr) {
                        continue;
                    }
                    let Some(inputs) = downstream.get(&addr) else {
                        continue;
                    };

                    for input in inputs {
                        let Some(target) = graph.node(input.node_id) else {
                            continue;
                        };
                        match target.kind {
                            NodeKind::Outputs { container } if boundary == Some(container) => {}
                            NodeKind::Outputs { container } => {
                                if self.invalidate_node(container) {
                                    removed += 1;
                                }
                                stack.push(InvalidationStep::Downstream(OutputAddress {
                                    node_id: container,
                                    index: input.index,
                                }));
                            }
                            _ => stack.push(InvalidationStep::Node(input.node_id)),
                        }
                    }
                }
            }
        }

        debug!("Invalidated {} cache entries starting at node {}", removed, node_id);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
