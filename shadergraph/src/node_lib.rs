use std::sync::Arc;

use hashbrown::HashMap;
use log::warn;

use crate::data::DataType;
use crate::elements;
use crate::graph::{Graph, GraphError, GraphResult, NodeId, NodeType};

/// Builds a node, inside `container` when given, and returns its id.
pub type NodeCtor = dyn Fn(&mut Graph, Option<NodeId>) -> GraphResult<NodeId> + Send + Sync;

#[derive(Clone)]
pub struct NodeFactory {
    pub label: String,
    pub node_type: NodeType,
    ctor: Arc<NodeCtor>,
}

impl NodeFactory {
    pub fn create(&self, graph: &mut Graph, container: Option<NodeId>) -> GraphResult<NodeId> {
        (self.ctor)(graph, container)
    }
}

impl std::fmt::Debug for NodeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeFactory")
            .field("label", &self.label)
            .field("node_type", &self.node_type)
            .finish()
    }
}

/// Factories for every creatable node, by label and by node type.
///
/// A factory whose node has a single output also serves as a converter
/// producing that output's type.
#[derive(Default, Debug)]
pub struct NodeLibrary {
    factories: Vec<NodeFactory>,
    by_label: HashMap<String, usize>,
    converters: HashMap<DataType, Vec<usize>>,
}

impl NodeLibrary {
    pub fn with_builtins() -> NodeLibrary {
        let mut library = NodeLibrary::default();
        elements::register_node_types(&mut library);
        library
    }

    /// Registers `ctor` under `label`, replacing a factory with the same label.
    /// The node type is learned by building a prototype in a scratch graph.
    pub fn register<F>(&mut self, label: impl Into<String>, ctor: F)
    where
        F: Fn(&mut Graph, Option<NodeId>) -> GraphResult<NodeId> + Send + Sync + 'static,
    {
        let label = label.into();

        let mut scratch = Graph::default();
        let prototype = match ctor(&mut scratch, None) {
            Ok(id) => scratch.node(id),
            Err(err) => {
                warn!("Node type \"{}\" is not registered: {}", label, err);
                return;
            }
        };
        let Some(prototype) = prototype else {
            warn!("Node type \"{}\" did not create a node", label);
            return;
        };
        let node_type = prototype.node_type();
        let converter_type = match prototype.outputs.as_slice() {
            [output] if !output.data_type.is_variable() => Some(output.data_type.clone()),
            _ => None,
        };

        let factory = NodeFactory {
            label: label.clone(),
            node_type,
            ctor: Arc::new(ctor),
        };
        let index = match self.by_label.get(&label) {
            Some(index) => {
                self.factories[*index] = factory;
                self.converters
                    .values_mut()
                    .for_each(|indices| indices.retain(|i| i != index));
                *index
            }
            None => {
                self.factories.push(factory);
                self.by_label.insert(label, self.factories.len() - 1);
                self.factories.len() - 1
            }
        };

        if let Some(data_type) = converter_type {
            self.converters.entry(data_type).or_default().push(index);
        }
    }

    pub fn create_by_label(
        &self,
        graph: &mut Graph,
        label: &str,
        container: Option<NodeId>,
    ) -> GraphResult<NodeId> {
        let factory = self
            .by_label
            .get(label)
            .map(|index| &self.factories[*index])
            .ok_or_else(|| GraphError::UnknownNodeType(label.to_string()))?;

        factory.create(graph, container)
    }

    pub fn create_by_type(
        &self,
        graph: &mut Graph,
        node_type: &NodeType,
        container: Option<NodeId>,
    ) -> GraphResult<NodeId> {
        let Some(factory) = self
            .factories
            .iter()
            .find(|factory| factory.node_type == *node_type)
        else {
            warn!("No node factory for node type {}", node_type);
            return Err(GraphError::UnknownNodeType(node_type.to_string()));
        };

        factory.create(graph, container)
    }

    pub fn factory(&self, label: &str) -> Option<&NodeFactory> {
        self.by_label.get(label).map(|index| &self.factories[*index])
    }
    pub fn factories(&self) -> &[NodeFactory] {
        &self.factories
    }
    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.factories.iter().map(|factory| factory.label.as_str())
    }

    /// Factories whose node produces a single output of `data_type`.
    pub fn converters(&self, data_type: &DataType) -> Vec<&NodeFactory> {
        self.converters
            .get(data_type)
            .map(|indices| indices.iter().map(|index| &self.factories[*index]).collect())
            .unwrap_or_default()
    }
}
