use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use thiserror::Error;

use crate::data::{DataType, Value};
use common::id_type;
use common::key_index_vec::{KeyIndexKey, KeyIndexVec};

id_type!(NodeId);

/// Outer inputs reserved by a counted loop.
pub const FOR_START_INPUT: usize = 0;
pub const FOR_END_INPUT: usize = 1;
pub const FOR_STEP_INPUT: usize = 2;

/// Input of a while loop holding its condition.
pub const WHILE_CONDITION_INPUT: usize = 0;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct OutputAddress {
    pub node_id: NodeId,
    pub index: usize,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct InputAddress {
    pub node_id: NodeId,
    pub index: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum SocketAddress {
    Input(InputAddress),
    Output(OutputAddress),
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Binding {
    #[default]
    None,
    Output(OutputAddress),
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub data_type: DataType,
    pub binding: Binding,
    // literal used while unconnected
    #[serde(default, skip_serializing_if = "Value::is_none")]
    pub value: Value,
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, Serialize, Deserialize)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    DotProduct,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, Serialize, Deserialize)]
pub enum CompareOp {
    GreaterThan,
    SmallerThan,
    Equal,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
    Not,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, Serialize, Deserialize)]
pub enum LoopKind {
    For,
    While,
    Foreach,
}

/// Payload-free tag of a node kind, used as the dispatch key of processors.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum NodeType {
    Math(MathOp),
    Compare(CompareOp),
    Logic(LogicOp),
    Value,
    FloatToVector,
    ComposePolygon,
    ShaderOutput,
    Array,
    CreateList,
    Container,
    Loop(LoopKind),
    Inputs,
    Outputs,
    LoopedInputs,
    Custom(String),
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Math(op) => write!(f, "Math.{op}"),
            NodeType::Compare(op) => write!(f, "Compare.{op}"),
            NodeType::Logic(op) => write!(f, "Logic.{op}"),
            NodeType::Loop(kind) => write!(f, "Loop.{kind}"),
            NodeType::Custom(name) => write!(f, "Custom.{name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct ContainerData {
    pub inputs_node: NodeId,
    pub outputs_node: NodeId,
    // interior nodes, socket nodes excluded
    pub members: Vec<NodeId>,
}

/// Pairs looped node output `j` with the loop's outer input carrying its
/// initial value and the interior output-node input producing the next one.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct LoopedSocket {
    pub input: usize,
    pub output: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopData {
    pub kind: LoopKind,
    pub container: ContainerData,
    pub looped_node: NodeId,
    pub looped: Vec<LoopedSocket>,
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    Math(MathOp),
    Compare(CompareOp),
    Logic(LogicOp),
    #[default]
    Value,
    FloatToVector,
    ComposePolygon,
    ShaderOutput,
    Array,
    CreateList,
    Container(ContainerData),
    Loop(LoopData),
    Inputs { container: NodeId },
    Outputs { container: NodeId },
    LoopedInputs { container: NodeId },
    Custom(String),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Math(op) => NodeType::Math(*op),
            NodeKind::Compare(op) => NodeType::Compare(*op),
            NodeKind::Logic(op) => NodeType::Logic(*op),
            NodeKind::Value => NodeType::Value,
            NodeKind::FloatToVector => NodeType::FloatToVector,
            NodeKind::ComposePolygon => NodeType::ComposePolygon,
            NodeKind::ShaderOutput => NodeType::ShaderOutput,
            NodeKind::Array => NodeType::Array,
            NodeKind::CreateList => NodeType::CreateList,
            NodeKind::Container(_) => NodeType::Container,
            NodeKind::Loop(data) => NodeType::Loop(data.kind),
            NodeKind::Inputs { .. } => NodeType::Inputs,
            NodeKind::Outputs { .. } => NodeType::Outputs,
            NodeKind::LoopedInputs { .. } => NodeType::LoopedInputs,
            NodeKind::Custom(name) => NodeType::Custom(name.clone()),
        }
    }

    /// Interior layout shared by plain containers and loops.
    pub fn container_data(&self) -> Option<&ContainerData> {
        match self {
            NodeKind::Container(data) => Some(data),
            NodeKind::Loop(data) => Some(&data.container),
            _ => None,
        }
    }
    fn container_data_mut(&mut self) -> Option<&mut ContainerData> {
        match self {
            NodeKind::Container(data) => Some(data),
            NodeKind::Loop(data) => Some(&mut data.container),
            _ => None,
        }
    }

    pub fn loop_data(&self) -> Option<&LoopData> {
        match self {
            NodeKind::Loop(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_socket_node(&self) -> bool {
        matches!(
            self,
            NodeKind::Inputs { .. } | NodeKind::Outputs { .. } | NodeKind::LoopedInputs { .. }
        )
    }

    fn remap_ids(&mut self, id_map: &HashMap<NodeId, NodeId>) {
        let remap = |id: &mut NodeId| {
            if let Some(new_id) = id_map.get(id) {
                *id = *new_id;
            }
        };

        match self {
            NodeKind::Container(data) => remap_container_data(data, id_map),
            NodeKind::Loop(data) => {
                remap_container_data(&mut data.container, id_map);
                remap(&mut data.looped_node);
            }
            NodeKind::Inputs { container }
            | NodeKind::Outputs { container }
            | NodeKind::LoopedInputs { container } => remap(container),
            _ => {}
        }
    }
}

fn remap_container_data(data: &mut ContainerData, id_map: &HashMap<NodeId, NodeId>) {
    for id in [&mut data.inputs_node, &mut data.outputs_node]
        .into_iter()
        .chain(data.members.iter_mut())
    {
        if let Some(new_id) = id_map.get(id) {
            *id = *new_id;
        }
    }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Input>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<NodeId>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, Value>,
}

impl KeyIndexKey<NodeId> for Node {
    fn key(&self) -> &NodeId {
        &self.id
    }
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Node {
        Node {
            id: NodeId::unique(),
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, data_type: DataType) -> Node {
        self.inputs.push(Input {
            name: name.into(),
            data_type,
            ..Default::default()
        });
        self
    }

    pub fn with_literal(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        value: impl Into<Value>,
    ) -> Node {
        self.inputs.push(Input {
            name: name.into(),
            data_type,
            binding: Binding::None,
            value: value.into(),
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, data_type: DataType) -> Node {
        self.outputs.push(Output {
            name: name.into(),
            data_type,
        });
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn output(&self, index: usize) -> OutputAddress {
        OutputAddress {
            node_id: self.id,
            index,
        }
    }
    pub fn input(&self, index: usize) -> InputAddress {
        InputAddress {
            node_id: self.id,
            index,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),
    #[error("Node {node_id} has no input {index}")]
    InputOutOfRange { node_id: NodeId, index: usize },
    #[error("Node {node_id} has no output {index}")]
    OutputOutOfRange { node_id: NodeId, index: usize },
    #[error("Node {0} is not a container")]
    NotAContainer(NodeId),
    #[error("Node {0} is not a loop")]
    NotALoop(NodeId),
    #[error("Cannot connect {from} output to {to} input")]
    TypeMismatch { from: DataType, to: DataType },
    #[error("Nodes {0} and {1} belong to different containers")]
    ScopeMismatch(NodeId, NodeId),
    #[error("Connecting {0} to {1} would create a cycle")]
    Cycle(NodeId, NodeId),
    #[error("Socket node {0} can only be removed together with its container")]
    SocketNodeRemoval(NodeId),
    #[error("No node factory registered for {0}")]
    UnknownNodeType(String),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Graph {
    nodes: KeyIndexVec<NodeId, Node>,
}

impl Graph {
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter()
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.by_key(&id)
    }
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.by_key_mut(&id)
    }
    pub fn try_node(&self, id: NodeId) -> GraphResult<&Node> {
        self.node(id).ok_or(GraphError::NodeNotFound(id))
    }
    fn try_node_mut(&mut self, id: NodeId) -> GraphResult<&mut Node> {
        self.node_mut(id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Adds a top-level node.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        assert!(!node.id.is_nil());
        assert!(node.container.is_none());

        let id = node.id;
        self.nodes.insert(node);
        id
    }

    /// Adds `node` to the interior of `container`, or at top level for `None`.
    pub fn add_node_to(&mut self, container: Option<NodeId>, mut node: Node) -> GraphResult<NodeId> {
        let Some(container_id) = container else {
            return Ok(self.add_node(node));
        };

        let id = node.id;
        self.try_container_data_mut(container_id)?.members.push(id);
        node.container = Some(container_id);
        self.nodes.insert(node);

        Ok(id)
    }

    pub fn add_container(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
    ) -> GraphResult<NodeId> {
        let container_id = NodeId::unique();
        let data = self.add_socket_nodes(container_id);

        let mut node = Node::new(name, NodeKind::Container(data));
        node.id = container_id;
        self.add_node_to(parent, node)
    }

    /// Adds a loop with its interior socket nodes and reserved inputs:
    /// start/end/step for `For`, a condition for `While`.
    pub fn add_loop(
        &mut self,
        name: impl Into<String>,
        kind: LoopKind,
        parent: Option<NodeId>,
    ) -> GraphResult<NodeId> {
        let loop_id = NodeId::unique();
        let container = self.add_socket_nodes(loop_id);

        let looped_node = Node {
            container: Some(loop_id),
            ..Node::new("Looped", NodeKind::LoopedInputs { container: loop_id })
        };
        let looped_node_id = looped_node.id;
        self.nodes.insert(looped_node);

        let mut node = Node::new(
            name,
            NodeKind::Loop(LoopData {
                kind,
                container,
                looped_node: looped_node_id,
                looped: Vec::new(),
            }),
        );
        node.id = loop_id;
        self.add_node_to(parent, node)?;

        match kind {
            LoopKind::For => {
                for (name, value) in [("start", 0), ("end", 0), ("step", 1)] {
                    let index = self.add_container_input(loop_id, name, DataType::Int)?;
                    self.set_input_value(
                        InputAddress {
                            node_id: loop_id,
                            index,
                        },
                        Value::Int(value),
                    )?;
                }
            }
            LoopKind::While => {
                let index = self.add_container_input(loop_id, "condition", DataType::Bool)?;
                self.set_input_value(
                    InputAddress {
                        node_id: loop_id,
                        index,
                    },
                    Value::Bool(false),
                )?;
            }
            LoopKind::Foreach => {}
        }

        Ok(loop_id)
    }

    fn add_socket_nodes(&mut self, container_id: NodeId) -> ContainerData {
        let inputs_node = Node {
            container: Some(container_id),
            ..Node::new("Inputs", NodeKind::Inputs { container: container_id })
        };
        let outputs_node = Node {
            container: Some(container_id),
            ..Node::new("Outputs", NodeKind::Outputs { container: container_id })
        };

        let data = ContainerData {
            inputs_node: inputs_node.id,
            outputs_node: outputs_node.id,
            members: Vec::new(),
        };
        self.nodes.insert(inputs_node);
        self.nodes.insert(outputs_node);

        data
    }

    /// Adds an outer input to `container` together with its interior mirror.
    /// Inside a `Foreach` a `List(T)` input shows one `T` per iteration.
    pub fn add_container_input(
        &mut self,
        container: NodeId,
        name: impl Into<String>,
        data_type: DataType,
    ) -> GraphResult<usize> {
        let name = name.into();
        let node = self.try_node(container)?;
        let interior_type = match (node.kind.loop_data(), &data_type) {
            (Some(data), DataType::List(element_type)) if data.kind == LoopKind::Foreach => {
                (**element_type).clone()
            }
            _ => data_type.clone(),
        };
        let inputs_node = self.try_container_data(container)?.inputs_node;

        let node = self.try_node_mut(container)?;
        node.inputs.push(Input {
            name: name.clone(),
            data_type: data_type.clone(),
            ..Default::default()
        });
        let index = node.inputs.len() - 1;

        let interior = self.try_node_mut(inputs_node)?;
        interior.outputs.push(Output {
            name,
            data_type: interior_type,
        });
        assert_eq!(interior.outputs.len(), index + 1);

        Ok(index)
    }

    /// Adds an outer output to `container` together with its interior mirror.
    /// For loops a `List(T)` output is fed one `T` per iteration.
    pub fn add_container_output(
        &mut self,
        container: NodeId,
        name: impl Into<String>,
        data_type: DataType,
    ) -> GraphResult<usize> {
        let name = name.into();
        let node = self.try_node(container)?;
        let interior_type = match (&node.kind, &data_type) {
            (NodeKind::Loop(_), DataType::List(element_type)) => (**element_type).clone(),
            _ => data_type.clone(),
        };
        let outputs_node = self.try_container_data(container)?.outputs_node;

        let node = self.try_node_mut(container)?;
        node.outputs.push(Output {
            name: name.clone(),
            data_type,
        });
        let index = node.outputs.len() - 1;

        let interior = self.try_node_mut(outputs_node)?;
        interior.inputs.push(Input {
            name,
            data_type: interior_type,
            ..Default::default()
        });
        assert_eq!(interior.inputs.len(), index + 1);

        Ok(index)
    }

    /// Adds a value carried between iterations of `loop_id`.
    ///
    /// For `Foreach` `data_type` is the element type: the outer sockets carry
    /// `List(data_type)` while the body sees one element per iteration.
    pub fn add_looped_socket(
        &mut self,
        loop_id: NodeId,
        name: impl Into<String>,
        data_type: DataType,
    ) -> GraphResult<LoopedSocket> {
        let name = name.into();
        let data = self.try_loop_data(loop_id)?;
        let looped_node = data.looped_node;
        let outer_type = match data.kind {
            LoopKind::Foreach => DataType::list_of(data_type.clone()),
            LoopKind::For | LoopKind::While => data_type.clone(),
        };

        let input = self.add_container_input(loop_id, name.clone(), outer_type.clone())?;
        let output = self.add_container_output(loop_id, name.clone(), outer_type)?;
        // the body always produces one `data_type` per iteration
        let outputs_node = self.try_container_data(loop_id)?.outputs_node;
        self.try_node_mut(outputs_node)?.inputs[output].data_type = data_type.clone();

        self.try_node_mut(looped_node)?
            .outputs
            .push(Output { name, data_type });

        let looped_socket = LoopedSocket { input, output };
        match &mut self.try_node_mut(loop_id)?.kind {
            NodeKind::Loop(data) => data.looped.push(looped_socket),
            _ => return Err(GraphError::NotALoop(loop_id)),
        }

        Ok(looped_socket)
    }

    pub fn try_container_data(&self, container: NodeId) -> GraphResult<&ContainerData> {
        self.try_node(container)?
            .kind
            .container_data()
            .ok_or(GraphError::NotAContainer(container))
    }
    fn try_container_data_mut(&mut self, container: NodeId) -> GraphResult<&mut ContainerData> {
        self.try_node_mut(container)?
            .kind
            .container_data_mut()
            .ok_or(GraphError::NotAContainer(container))
    }
    pub fn try_loop_data(&self, loop_id: NodeId) -> GraphResult<&LoopData> {
        self.try_node(loop_id)?
            .kind
            .loop_data()
            .ok_or(GraphError::NotALoop(loop_id))
    }

    /// Removes a node, dropping every binding to it. Removing a container
    /// removes its interior.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<()> {
        assert!(!id.is_nil());

        let node = self.try_node(id)?;
        if node.kind.is_socket_node() {
            return Err(GraphError::SocketNodeRemoval(id));
        }

        if let Some(parent) = node.container {
            self.try_container_data_mut(parent)?
                .members
                .retain(|member| *member != id);
        }

        let removed = self.with_interior(&[id]);
        for removed_id in removed.iter() {
            self.nodes.remove_by_key(removed_id);
        }

        self.nodes
            .iter_mut()
            .flat_map(|node| node.inputs.iter_mut())
            .filter(|input| match &input.binding {
                Binding::Output(output) => removed.contains(&output.node_id),
                Binding::None => false,
            })
            .for_each(|input| input.binding = Binding::None);

        Ok(())
    }

    /// `ids` plus, recursively, every interior node of the containers among them.
    pub fn with_interior(&self, ids: &[NodeId]) -> Vec<NodeId> {
        let mut result = Vec::with_capacity(ids.len());
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = ids.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            result.push(id);

            let Some(node) = self.node(id) else {
                continue;
            };
            if let NodeKind::Loop(data) = &node.kind {
                stack.push(data.looped_node);
            }
            if let Some(data) = node.kind.container_data() {
                stack.extend(data.members.iter().rev().copied());
                stack.push(data.outputs_node);
                stack.push(data.inputs_node);
            }
        }

        result
    }

    /// Connects an output to an input of a node in the same container.
    pub fn connect(&mut self, from: OutputAddress, to: InputAddress) -> GraphResult<()> {
        let from_type = self.output_type(from)?.clone();
        let to_type = self.input_type(to)?.clone();
        if !from_type.is_compatible(&to_type) {
            return Err(GraphError::TypeMismatch {
                from: from_type,
                to: to_type,
            });
        }

        let from_scope = self.try_node(from.node_id)?.container;
        let to_scope = self.try_node(to.node_id)?.container;
        if from_scope != to_scope {
            return Err(GraphError::ScopeMismatch(from.node_id, to.node_id));
        }

        if self.depends_on(from.node_id, to.node_id) {
            return Err(GraphError::Cycle(from.node_id, to.node_id));
        }

        self.try_node_mut(to.node_id)?.inputs[to.index].binding = Binding::Output(from);

        Ok(())
    }

    pub fn disconnect(&mut self, to: InputAddress) -> GraphResult<()> {
        self.input_type(to)?;
        self.try_node_mut(to.node_id)?.inputs[to.index].binding = Binding::None;

        Ok(())
    }

    /// Whether `node_id` is `upstream_id` or reads from it, directly or transitively.
    fn depends_on(&self, node_id: NodeId, upstream_id: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![node_id];

        while let Some(id) = stack.pop() {
            if id == upstream_id {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }

            let Some(node) = self.node(id) else {
                continue;
            };
            stack.extend(node.inputs.iter().filter_map(|input| match input.binding {
                Binding::Output(output) => Some(output.node_id),
                Binding::None => None,
            }));
        }

        false
    }

    pub fn set_input_value(&mut self, addr: InputAddress, value: Value) -> GraphResult<()> {
        self.input_type(addr)?;
        self.try_node_mut(addr.node_id)?.inputs[addr.index].value = value;

        Ok(())
    }

    pub fn set_property(
        &mut self,
        node_id: NodeId,
        name: impl Into<String>,
        value: Value,
    ) -> GraphResult<()> {
        self.try_node_mut(node_id)?
            .properties
            .insert(name.into(), value);

        Ok(())
    }
    pub fn property(&self, node_id: NodeId, name: &str) -> Option<&Value> {
        self.node(node_id)?.properties.get(name)
    }

    pub fn input(&self, addr: InputAddress) -> GraphResult<&Input> {
        self.try_node(addr.node_id)?
            .inputs
            .get(addr.index)
            .ok_or(GraphError::InputOutOfRange {
                node_id: addr.node_id,
                index: addr.index,
            })
    }

    pub fn connected_output(&self, addr: InputAddress) -> Option<OutputAddress> {
        match self.input(addr).ok()?.binding {
            Binding::Output(output) => Some(output),
            Binding::None => None,
        }
    }

    pub fn downstream_inputs(&self, addr: OutputAddress) -> Vec<InputAddress> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.inputs
                    .iter()
                    .enumerate()
                    .filter(|(_, input)| input.binding == Binding::Output(addr))
                    .map(|(index, _)| InputAddress {
                        node_id: node.id,
                        index,
                    })
            })
            .collect()
    }

    /// Every connection grouped by its source output.
    pub fn downstream_index(&self) -> HashMap<OutputAddress, Vec<InputAddress>> {
        let mut index: HashMap<OutputAddress, Vec<InputAddress>> = HashMap::new();
        for node in self.nodes.iter() {
            for (input_index, input) in node.inputs.iter().enumerate() {
                if let Binding::Output(output) = input.binding {
                    index.entry(output).or_default().push(InputAddress {
                        node_id: node.id,
                        index: input_index,
                    });
                }
            }
        }
        index
    }

    pub fn input_type(&self, addr: InputAddress) -> GraphResult<&DataType> {
        Ok(&self.input(addr)?.data_type)
    }

    pub fn output_type(&self, addr: OutputAddress) -> GraphResult<&DataType> {
        self.try_node(addr.node_id)?
            .outputs
            .get(addr.index)
            .map(|output| &output.data_type)
            .ok_or(GraphError::OutputOutOfRange {
                node_id: addr.node_id,
                index: addr.index,
            })
    }

    /// Declared output type, with `Variable` resolved from what feeds the node.
    pub fn resolved_output_type(&self, addr: OutputAddress) -> DataType {
        let Ok(declared) = self.output_type(addr) else {
            return DataType::Variable;
        };
        if !declared.is_variable() {
            return declared.clone();
        }

        let Some(node) = self.node(addr.node_id) else {
            return DataType::Variable;
        };
        if let Some(data) = node.kind.container_data() {
            return self.resolved_input_type(InputAddress {
                node_id: data.outputs_node,
                index: addr.index,
            });
        }
        match &node.kind {
            NodeKind::Inputs { container } => self.resolved_input_type(InputAddress {
                node_id: *container,
                index: addr.index,
            }),
            _ => (0..node.inputs.len())
                .map(|index| self.resolved_input_type(node.input(index)))
                .find(|data_type| !data_type.is_variable())
                .unwrap_or_default(),
        }
    }

    pub fn resolved_input_type(&self, addr: InputAddress) -> DataType {
        let Ok(input) = self.input(addr) else {
            return DataType::Variable;
        };
        match input.binding {
            Binding::Output(output) => self.resolved_output_type(output),
            Binding::None if !input.data_type.is_variable() => input.data_type.clone(),
            Binding::None => input.value.data_type(),
        }
    }

    /// Maps an outer socket of a container to its interior mirror.
    pub fn socket_in_container(&self, outer: SocketAddress) -> Option<SocketAddress> {
        match outer {
            SocketAddress::Input(addr) => {
                let data = self.node(addr.node_id)?.kind.container_data()?;
                Some(SocketAddress::Output(OutputAddress {
                    node_id: data.inputs_node,
                    index: addr.index,
                }))
            }
            SocketAddress::Output(addr) => {
                let data = self.node(addr.node_id)?.kind.container_data()?;
                Some(SocketAddress::Input(InputAddress {
                    node_id: data.outputs_node,
                    index: addr.index,
                }))
            }
        }
    }

    /// Maps a socket of an interior socket node to the container's outer socket.
    pub fn socket_on_container(&self, interior: SocketAddress) -> Option<SocketAddress> {
        let node_id = match interior {
            SocketAddress::Input(addr) => addr.node_id,
            SocketAddress::Output(addr) => addr.node_id,
        };
        match (&self.node(node_id)?.kind, interior) {
            (NodeKind::Inputs { container }, SocketAddress::Output(addr)) => {
                Some(SocketAddress::Input(InputAddress {
                    node_id: *container,
                    index: addr.index,
                }))
            }
            (NodeKind::Outputs { container }, SocketAddress::Input(addr)) => {
                Some(SocketAddress::Output(OutputAddress {
                    node_id: *container,
                    index: addr.index,
                }))
            }
            _ => None,
        }
    }

    /// Interior output-node input producing the next value of a looped node output.
    pub fn partner_socket(&self, looped_output: OutputAddress) -> Option<InputAddress> {
        let NodeKind::LoopedInputs { container } = self.node(looped_output.node_id)?.kind else {
            return None;
        };
        let data = self.node(container)?.kind.loop_data()?;
        let looped = data.looped.get(looped_output.index)?;

        Some(InputAddress {
            node_id: data.container.outputs_node,
            index: looped.output,
        })
    }

    /// Copies a node under a new id, keeping sockets and literals but no
    /// connections. Containers are copied together with their interior.
    pub fn clone_node(&mut self, id: NodeId) -> GraphResult<NodeId> {
        let node = self.try_node(id)?;
        if node.kind.is_socket_node() {
            return Err(GraphError::SocketNodeRemoval(id));
        }
        if node.kind.container_data().is_some() {
            let new_id = self.clone_nodes(&[id])?[0];
            // outer inputs of the copy stay disconnected
            self.try_node_mut(new_id)?
                .inputs
                .iter_mut()
                .for_each(|input| input.binding = Binding::None);
            return Ok(new_id);
        }

        let mut clone = node.clone();
        clone.id = NodeId::unique();
        clone
            .inputs
            .iter_mut()
            .for_each(|input| input.binding = Binding::None);

        let container = clone.container.take();
        self.add_node_to(container, clone)
    }

    /// Deep copy of `ids`. Connections between copied nodes are remapped to the
    /// copies; inputs bound to nodes outside the set keep their binding.
    /// Returns the new ids in the order of `ids`.
    pub fn clone_nodes(&mut self, ids: &[NodeId]) -> GraphResult<Vec<NodeId>> {
        for id in ids {
            if self.try_node(*id)?.kind.is_socket_node() {
                return Err(GraphError::SocketNodeRemoval(*id));
            }
        }

        let all_ids = self.with_interior(ids);
        let id_map: HashMap<NodeId, NodeId> = all_ids
            .iter()
            .map(|id| (*id, NodeId::unique()))
            .collect();

        let mut clones = Vec::with_capacity(all_ids.len());
        for id in all_ids.iter() {
            let mut clone = self.try_node(*id)?.clone();
            clone.id = id_map[id];
            clone.kind.remap_ids(&id_map);
            clone.container = clone
                .container
                .map(|container| id_map.get(&container).copied().unwrap_or(container));
            for input in clone.inputs.iter_mut() {
                if let Binding::Output(output) = &mut input.binding {
                    if let Some(new_id) = id_map.get(&output.node_id) {
                        output.node_id = *new_id;
                    }
                }
            }
            clones.push(clone);
        }

        for clone in clones {
            let top_level_container = clone
                .container
                .filter(|container| !id_map.values().any(|new_id| new_id == container));
            if let Some(container) = top_level_container {
                self.try_container_data_mut(container)?.members.push(clone.id);
            }
            self.nodes.insert(clone);
        }

        Ok(ids.iter().map(|id| id_map[id]).collect())
    }
}
