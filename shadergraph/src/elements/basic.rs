use glam::{DVec3, Vec4};
use log::warn;
use strum::IntoEnumIterator;

use common::approx_eq;

use crate::data::{DataType, Polygon, Value};
use crate::evaluator::ProcessContext;
use crate::graph::{CompareOp, LogicOp, MathOp, Node, NodeKind, NodeType};
use crate::node_lib::NodeLibrary;
use crate::registry::Registry;

pub(crate) fn register_processors(registry: &Registry) {
    for op in MathOp::iter() {
        let node_type = NodeType::Math(op);
        match op {
            MathOp::DotProduct => {
                registry.add_processor(DataType::Float, node_type, dot_product);
            }
            MathOp::Modulo => {
                registry.add_processor(DataType::Float, node_type.clone(), move |ctx| {
                    float_math(ctx, op)
                });
                registry.add_processor(DataType::Int, node_type, move |ctx| int_math(ctx, op));
            }
            _ => {
                registry.add_processor(DataType::Float, node_type.clone(), move |ctx| {
                    float_math(ctx, op)
                });
                registry.add_processor(DataType::Int, node_type.clone(), move |ctx| {
                    int_math(ctx, op)
                });
                registry.add_processor(DataType::Vector, node_type, move |ctx| {
                    vector_math(ctx, op)
                });
            }
        }
    }

    for op in CompareOp::iter() {
        registry.add_processor(DataType::Bool, NodeType::Compare(op), move |ctx| {
            compare(ctx, op)
        });
    }
    for op in LogicOp::iter() {
        registry.add_processor(DataType::Bool, NodeType::Logic(op), move |ctx| logic(ctx, op));
    }

    for data_type in [
        DataType::Float,
        DataType::Int,
        DataType::Bool,
        DataType::String,
        DataType::Vector,
        DataType::Color,
    ] {
        registry.add_processor(data_type, NodeType::Value, |ctx| {
            let value = ctx.input(0).convert_type(ctx.data_type());
            ctx.push_output(value);
        });
    }

    registry.add_processor(DataType::Vector, NodeType::FloatToVector, |ctx| {
        let x = ctx.input(0).as_f64().unwrap_or_default();
        let y = ctx.input(1).as_f64().unwrap_or_default();
        let z = ctx.input(2).as_f64().unwrap_or_default();
        ctx.push_output(Value::Vector(DVec3::new(x, y, z)));
    });

    registry.add_processor(DataType::Polygon, NodeType::ComposePolygon, compose_polygon);
}

fn float_math(ctx: &mut ProcessContext<'_>, op: MathOp) {
    let values: Option<Vec<f64>> = ctx.present_inputs().iter().map(Value::as_f64).collect();
    let result = values.and_then(|values| {
        let (first, rest) = values.split_first()?;
        let result: f64 = match op {
            MathOp::Add => values.iter().sum(),
            MathOp::Subtract => rest.iter().fold(*first, |acc, value| acc - value),
            MathOp::Multiply => values.iter().product(),
            MathOp::Divide => rest.iter().fold(*first, |acc, value| acc / value),
            MathOp::Modulo => rest.iter().fold(*first, |acc, value| acc % value),
            MathOp::DotProduct => return None,
        };
        Some(result)
    });

    ctx.push_output(result.map_or(Value::None, Value::Float));
}

fn int_math(ctx: &mut ProcessContext<'_>, op: MathOp) {
    let values: Option<Vec<i64>> = ctx.present_inputs().iter().map(Value::as_i64).collect();
    let Some((first, rest)) = values.as_deref().and_then(<[i64]>::split_first) else {
        ctx.push_output(Value::None);
        return;
    };

    let result = rest.iter().try_fold(*first, |acc, value| match op {
        MathOp::Add => acc.checked_add(*value),
        MathOp::Subtract => acc.checked_sub(*value),
        MathOp::Multiply => acc.checked_mul(*value),
        MathOp::Divide => acc.checked_div(*value),
        MathOp::Modulo => acc.checked_rem(*value),
        MathOp::DotProduct => None,
    });
    if result.is_none() {
        warn!(
            "Integer {} in node \"{}\" overflowed or divided by zero",
            op,
            ctx.node().name
        );
    }

    ctx.push_output(result.map_or(Value::None, Value::Int));
}

fn vector_math(ctx: &mut ProcessContext<'_>, op: MathOp) {
    let values: Option<Vec<DVec3>> = ctx.present_inputs().iter().map(Value::as_vector).collect();
    let result = values.and_then(|values| {
        let (first, rest) = values.split_first()?;
        let result = match op {
            MathOp::Add => rest.iter().fold(*first, |acc, value| acc + *value),
            MathOp::Subtract => rest.iter().fold(*first, |acc, value| acc - *value),
            MathOp::Multiply => rest.iter().fold(*first, |acc, value| acc * *value),
            MathOp::Divide => rest.iter().fold(*first, |acc, value| acc / *value),
            MathOp::Modulo => rest.iter().fold(*first, |acc, value| acc % *value),
            MathOp::DotProduct => return None,
        };
        Some(result)
    });

    ctx.push_output(result.map_or(Value::None, Value::Vector));
}

fn dot_product(ctx: &mut ProcessContext<'_>) {
    let a = ctx.input(0).as_vector();
    let b = ctx.input(1).as_vector();
    let result = a.zip(b).map(|(a, b)| a.dot(b));

    ctx.push_output(result.map_or(Value::None, Value::Float));
}

fn compare(ctx: &mut ProcessContext<'_>, op: CompareOp) {
    let a = ctx.input(0);
    let b = ctx.input(1);

    let result = match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => Some(match op {
            CompareOp::GreaterThan => a > b,
            CompareOp::SmallerThan => a < b,
            CompareOp::Equal => a == b,
        }),
        _ => a.as_f64().zip(b.as_f64()).map(|(a, b)| match op {
            CompareOp::GreaterThan => a > b,
            CompareOp::SmallerThan => a < b,
            CompareOp::Equal => approx_eq(a, b),
        }),
    };

    ctx.push_output(result.map_or(Value::None, Value::Bool));
}

fn logic(ctx: &mut ProcessContext<'_>, op: LogicOp) {
    let result = match op {
        LogicOp::Not => ctx.input(0).as_bool().map(|value| !value),
        LogicOp::And | LogicOp::Or => {
            let values: Option<Vec<bool>> =
                ctx.present_inputs().iter().map(Value::as_bool).collect();
            values.filter(|values| !values.is_empty()).map(|values| {
                if op == LogicOp::And {
                    values.iter().all(|value| *value)
                } else {
                    values.iter().any(|value| *value)
                }
            })
        }
    };

    ctx.push_output(result.map_or(Value::None, Value::Bool));
}

fn compose_polygon(ctx: &mut ProcessContext<'_>) {
    let mut vertices = Vec::new();
    for value in ctx.present_inputs() {
        let indices: Vec<i64> = match &value {
            Value::List(list) => list.iter().filter_map(Value::as_i64).collect(),
            other => other.as_i64().into_iter().collect(),
        };
        for index in indices {
            match u32::try_from(index) {
                Ok(index) => vertices.push(index),
                Err(_) => warn!("Skipping invalid vertex index {}", index),
            }
        }
    }

    ctx.push_output(Value::Polygon(Polygon { vertices }));
}

pub(crate) fn register_node_types(library: &mut NodeLibrary) {
    for op in MathOp::iter() {
        library.register(format!("Math.{op}"), move |graph, container| {
            let node = match op {
                MathOp::DotProduct => Node::new(op.to_string(), NodeKind::Math(op))
                    .with_input("a", DataType::Vector)
                    .with_input("b", DataType::Vector)
                    .with_output("result", DataType::Float),
                _ => Node::new(op.to_string(), NodeKind::Math(op))
                    .with_input("a", DataType::Variable)
                    .with_input("b", DataType::Variable)
                    .with_output("result", DataType::Variable),
            };
            graph.add_node_to(container, node)
        });
    }

    for op in CompareOp::iter() {
        library.register(format!("Compare.{op}"), move |graph, container| {
            let node = Node::new(op.to_string(), NodeKind::Compare(op))
                .with_input("a", DataType::Variable)
                .with_input("b", DataType::Variable)
                .with_output("result", DataType::Bool);
            graph.add_node_to(container, node)
        });
    }

    for op in LogicOp::iter() {
        library.register(format!("Logic.{op}"), move |graph, container| {
            let mut node =
                Node::new(op.to_string(), NodeKind::Logic(op)).with_input("a", DataType::Bool);
            if op != LogicOp::Not {
                node = node.with_input("b", DataType::Bool);
            }
            graph.add_node_to(container, node.with_output("result", DataType::Bool))
        });
    }

    let literals: [(&str, DataType, Value); 6] = [
        ("Float", DataType::Float, Value::Float(0.0)),
        ("Integer", DataType::Int, Value::Int(0)),
        ("Bool", DataType::Bool, Value::Bool(false)),
        ("String", DataType::String, Value::from("")),
        ("Vector", DataType::Vector, Value::Vector(DVec3::ZERO)),
        ("Color", DataType::Color, Value::Color(Vec4::ONE)),
    ];
    for (name, data_type, value) in literals {
        library.register(format!("Values.{name} Value"), move |graph, container| {
            let node = Node::new(format!("{name} Value"), NodeKind::Value)
                .with_literal("value", data_type.clone(), value.clone())
                .with_output("value", data_type.clone());
            graph.add_node_to(container, node)
        });
    }

    library.register("Vector.Float To Vector", |graph, container| {
        let node = Node::new("Float To Vector", NodeKind::FloatToVector)
            .with_literal("x", DataType::Float, 0.0)
            .with_literal("y", DataType::Float, 0.0)
            .with_literal("z", DataType::Float, 0.0)
            .with_output("vector", DataType::Vector);
        graph.add_node_to(container, node)
    });

    library.register("Objects.Compose Polygon", |graph, container| {
        let node = Node::new("Compose Polygon", NodeKind::ComposePolygon)
            .with_input("vertices", DataType::list_of(DataType::Int))
            .with_output("polygon", DataType::Polygon);
        graph.add_node_to(container, node)
    });
}
