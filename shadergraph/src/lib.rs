pub mod benchmark;
pub mod cache;
pub mod config;
pub mod data;
pub mod elements;
pub mod engine;
pub mod evaluator;
pub mod graph;
pub mod loop_context;
pub mod node_lib;
pub mod registry;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::cache::DataCache;
    pub use crate::config::EngineConfig;
    pub use crate::data::{DataType, ListValue, Polygon, ShaderHandle, Value};
    pub use crate::elements::shader::ShaderCompiler;
    pub use crate::engine::Engine;
    pub use crate::evaluator::{CacheEvent, Evaluator, ProcessContext};
    pub use crate::graph::{
        Graph, GraphError, InputAddress, LoopKind, MathOp, Node, NodeId, NodeKind, NodeType,
        OutputAddress,
    };
    pub use crate::loop_context::LoopContext;
    pub use crate::registry::Registry;
}
