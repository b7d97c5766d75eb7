use std::sync::Arc;

use log::warn;

use crate::data::{DataType, ShaderHandle, Value};
use crate::graph::{Node, NodeKind, NodeType};
use crate::node_lib::NodeLibrary;
use crate::registry::Registry;

/// Renderer-side collaborator turning a shader output node into a program.
pub trait ShaderCompiler: Send + Sync {
    /// `inputs` holds the evaluated inputs of `node`, in socket order.
    fn compile(&self, node: &Node, inputs: &[Value]) -> Option<ShaderHandle>;
}

/// Routes `ShaderOutput` nodes through `compiler`, replacing any previous one.
pub fn register_shader_compiler(registry: &Registry, compiler: Arc<dyn ShaderCompiler>) {
    registry.add_processor(DataType::Shader, NodeType::ShaderOutput, move |ctx| {
        let inputs: Vec<Value> = (0..ctx.input_count()).map(|index| ctx.input(index)).collect();

        let handle = compiler.compile(ctx.node(), &inputs);
        if handle.is_none() {
            warn!("Shader \"{}\" failed to compile", ctx.node().name);
        }
        ctx.push_output(handle.map_or(Value::None, Value::Shader));
    });
}

pub(crate) fn register_node_types(library: &mut NodeLibrary) {
    library.register("Shader.Output", |graph, container| {
        let node = Node::new("Shader Output", NodeKind::ShaderOutput)
            .with_input("color", DataType::Color)
            .with_input("polygon", DataType::Polygon)
            .with_output("shader", DataType::Shader);
        graph.add_node_to(container, node)
    });
}
