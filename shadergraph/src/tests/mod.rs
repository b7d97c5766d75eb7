use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::data::DataType;
use crate::evaluator::ProcessContext;
use crate::graph::{Node, NodeKind, NodeType};
use crate::registry::Registry;

mod loop_tests;

/// Registers `processor` for `Custom(name)` nodes and counts its invocations.
pub(crate) fn counting_processor<F>(registry: &Registry, name: &str, processor: F) -> Arc<AtomicUsize>
where
    F: Fn(&mut ProcessContext<'_>) + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry.add_generic_processor(NodeType::Custom(name.to_string()), move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        processor(ctx);
    });
    calls
}

pub(crate) fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

pub(crate) fn custom_node(name: &str, inputs: &[DataType], output: DataType) -> Node {
    let mut node = Node::new(name, NodeKind::Custom(name.to_string()));
    for (index, data_type) in inputs.iter().enumerate() {
        node = node.with_input(format!("in{index}"), data_type.clone());
    }
    node.with_output("out", output)
}
