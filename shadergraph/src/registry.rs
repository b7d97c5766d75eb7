use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::data::DataType;
use crate::elements;
use crate::evaluator::ProcessContext;
use crate::graph::NodeType;

/// Computes the outputs of the node behind a [`ProcessContext`].
pub type Processor = dyn Fn(&mut ProcessContext<'_>) + Send + Sync;

/// Two-level processor dispatch table.
///
/// Generic processors are keyed by node type alone and win over typed ones,
/// which are keyed by the requested socket type and the node type.
#[derive(Default)]
pub struct Registry {
    typed: RwLock<HashMap<DataType, HashMap<NodeType, Arc<Processor>>>>,
    generic: RwLock<HashMap<NodeType, Arc<Processor>>>,
}

impl Registry {
    /// Registry preloaded with every built-in processor.
    pub fn with_builtins() -> Registry {
        let registry = Registry::default();
        elements::register_processors(&registry);
        registry
    }

    pub fn add_processor<F>(&self, data_type: DataType, node_type: NodeType, processor: F)
    where
        F: Fn(&mut ProcessContext<'_>) + Send + Sync + 'static,
    {
        self.typed
            .write()
            .entry(data_type)
            .or_default()
            .insert(node_type, Arc::new(processor));
    }

    pub fn remove_processor(&self, data_type: &DataType, node_type: &NodeType) -> bool {
        let mut typed = self.typed.write();
        let Some(by_node_type) = typed.get_mut(data_type) else {
            return false;
        };
        let removed = by_node_type.remove(node_type).is_some();
        if by_node_type.is_empty() {
            typed.remove(data_type);
        }
        removed
    }

    pub fn add_generic_processor<F>(&self, node_type: NodeType, processor: F)
    where
        F: Fn(&mut ProcessContext<'_>) + Send + Sync + 'static,
    {
        self.generic.write().insert(node_type, Arc::new(processor));
    }

    pub fn remove_generic_processor(&self, node_type: &NodeType) -> bool {
        self.generic.write().remove(node_type).is_some()
    }

    pub fn processor(&self, data_type: &DataType, node_type: &NodeType) -> Option<Arc<Processor>> {
        self.typed.read().get(data_type)?.get(node_type).cloned()
    }

    pub fn generic_processor(&self, node_type: &NodeType) -> Option<Arc<Processor>> {
        self.generic.read().get(node_type).cloned()
    }

    /// Generic table first, then the typed one.
    pub fn resolve(&self, data_type: &DataType, node_type: &NodeType) -> Option<Arc<Processor>> {
        self.generic_processor(node_type)
            .or_else(|| self.processor(data_type, node_type))
    }

    pub fn typed_keys(&self) -> Vec<(DataType, NodeType)> {
        self.typed
            .read()
            .iter()
            .flat_map(|(data_type, by_node_type)| {
                by_node_type
                    .keys()
                    .map(move |node_type| (data_type.clone(), node_type.clone()))
            })
            .collect()
    }

    pub fn generic_keys(&self) -> Vec<NodeType> {
        self.generic.read().keys().cloned().collect()
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("typed", &self.typed.read().values().map(HashMap::len).sum::<usize>())
            .field("generic", &self.generic.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::data::{DataType, Value};
    use crate::graph::{MathOp, NodeType};
    use crate::registry::Registry;

    #[test]
    fn generic_processor_takes_precedence() {
        let registry = Registry::default();
        let node_type = NodeType::Custom("sampler".to_string());
        assert!(registry.resolve(&DataType::Float, &node_type).is_none());

        registry.add_processor(DataType::Float, node_type.clone(), |ctx| {
            ctx.push_output(Value::Float(1.0))
        });
        let typed = registry.processor(&DataType::Float, &node_type);
        assert!(typed.is_some());
        assert!(registry.processor(&DataType::Int, &node_type).is_none());

        registry.add_generic_processor(node_type.clone(), |ctx| {
            ctx.push_output(Value::Float(2.0))
        });
        let resolved = registry.resolve(&DataType::Float, &node_type);
        let generic = registry.generic_processor(&node_type);
        assert!(matches!(
            (resolved, generic),
            (Some(resolved), Some(generic)) if std::sync::Arc::ptr_eq(&resolved, &generic)
        ));

        assert!(registry.remove_generic_processor(&node_type));
        assert!(registry.remove_processor(&DataType::Float, &node_type));
        assert!(!registry.remove_processor(&DataType::Float, &node_type));
        assert!(registry.resolve(&DataType::Float, &node_type).is_none());
    }

    #[test]
    fn builtins_cover_math_for_scalar_and_vector() {
        let registry = Registry::with_builtins();
        let keys = registry.typed_keys();

        for data_type in [DataType::Float, DataType::Int, DataType::Vector] {
            assert!(keys.contains(&(data_type, NodeType::Math(MathOp::Add))));
        }
        assert!(registry
            .generic_processor(&NodeType::Container)
            .is_some());
    }
}
