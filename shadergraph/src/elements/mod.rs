use crate::node_lib::NodeLibrary;
use crate::registry::Registry;

pub mod basic;
pub mod shader;
pub mod structural;

/// Registers the processors of every built-in node type.
pub fn register_processors(registry: &Registry) {
    basic::register_processors(registry);
    structural::register_processors(registry);
}

/// Registers the factories of every built-in node type.
pub fn register_node_types(library: &mut NodeLibrary) {
    basic::register_node_types(library);
    structural::register_node_types(library);
    shader::register_node_types(library);
}
