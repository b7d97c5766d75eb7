use crate::config::EngineConfig;
use crate::data::{DataType, ListValue, Value};
use crate::engine::Engine;
use crate::graph::{
    Graph, InputAddress, LoopKind, NodeId, OutputAddress, FOR_END_INPUT, FOR_START_INPUT,
    FOR_STEP_INPUT, WHILE_CONDITION_INPUT,
};
use crate::tests::{calls, counting_processor, custom_node};

fn int_list(items: &[i64]) -> Value {
    Value::List(ListValue::new(
        DataType::Int,
        items.iter().copied().map(Value::Int).collect(),
    ))
}

fn loop_output(node_id: NodeId, index: usize) -> OutputAddress {
    OutputAddress { node_id, index }
}

fn loop_input(node_id: NodeId, index: usize) -> InputAddress {
    InputAddress { node_id, index }
}

/// `for i in 0..end` feeding `i * i` into a list output and a constant into a
/// plain output.
fn squares_graph(graph: &mut Graph, end: i64) -> anyhow::Result<NodeId> {
    let for_loop = graph.add_loop("squares", LoopKind::For, None)?;
    graph.set_input_value(loop_input(for_loop, FOR_END_INPUT), Value::Int(end))?;
    graph.add_container_output(for_loop, "squares", DataType::list_of(DataType::Int))?;
    graph.add_container_output(for_loop, "constant", DataType::Float)?;
    let data = graph.try_loop_data(for_loop)?.clone();

    let square = graph.add_node_to(
        Some(for_loop),
        custom_node("square", &[DataType::Int], DataType::Int),
    )?;
    let constant = graph.add_node_to(Some(for_loop), custom_node("constant", &[], DataType::Float))?;

    graph.connect(
        OutputAddress {
            node_id: data.container.inputs_node,
            index: FOR_STEP_INPUT,
        },
        InputAddress {
            node_id: square,
            index: 0,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: square,
            index: 0,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: 0,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: constant,
            index: 0,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: 1,
        },
    )?;

    Ok(for_loop)
}

#[test]
fn for_loop_recomputes_only_step_dependent_nodes() -> anyhow::Result<()> {
    let engine = Engine::default();
    let square_calls = counting_processor(engine.registry(), "square", |ctx| {
        let x = ctx.input(0).as_i64().unwrap_or_default();
        ctx.push_output(Value::Int(x * x));
    });
    let constant_calls = counting_processor(engine.registry(), "constant", |ctx| {
        ctx.push_output(Value::Float(2.5));
    });

    let mut graph = Graph::default();
    let for_loop = squares_graph(&mut graph, 5)?;

    assert_eq!(
        engine.evaluate(&graph, loop_output(for_loop, 0)),
        int_list(&[0, 1, 4, 9, 16])
    );
    assert_eq!(
        engine.evaluate(&graph, loop_output(for_loop, 1)),
        Value::Float(2.5)
    );
    assert_eq!(calls(&square_calls), 5);
    assert_eq!(calls(&constant_calls), 1);

    Ok(())
}

#[test]
fn for_loop_with_unreachable_end_is_empty() -> anyhow::Result<()> {
    let engine = Engine::default();
    let square_calls = counting_processor(engine.registry(), "square", |ctx| {
        let x = ctx.input(0).as_i64().unwrap_or_default();
        ctx.push_output(Value::Int(x * x));
    });
    counting_processor(engine.registry(), "constant", |ctx| {
        ctx.push_output(Value::Float(2.5));
    });

    let mut graph = Graph::default();
    let for_loop = squares_graph(&mut graph, 5)?;

    for step in [0, -1] {
        engine.set_input_value(&mut graph, loop_input(for_loop, FOR_STEP_INPUT), Value::Int(step))?;
        assert_eq!(engine.evaluate(&graph, loop_output(for_loop, 0)), int_list(&[]));
        assert_eq!(engine.evaluate(&graph, loop_output(for_loop, 1)), Value::None);
    }

    engine.set_input_value(&mut graph, loop_input(for_loop, FOR_STEP_INPUT), Value::Int(1))?;
    engine.set_input_value(&mut graph, loop_input(for_loop, FOR_END_INPUT), Value::Int(-3))?;
    assert_eq!(engine.evaluate(&graph, loop_output(for_loop, 0)), int_list(&[]));
    assert_eq!(calls(&square_calls), 0);

    Ok(())
}

#[test]
fn looped_values_carry_between_iterations() -> anyhow::Result<()> {
    let engine = Engine::default();
    let mut graph = Graph::default();

    let for_loop = graph.add_loop("sum", LoopKind::For, None)?;
    graph.set_input_value(loop_input(for_loop, FOR_END_INPUT), Value::Int(4))?;
    let looped = graph.add_looped_socket(for_loop, "sum", DataType::Float)?;
    graph.set_input_value(loop_input(for_loop, looped.input), Value::Float(0.0))?;
    let data = graph.try_loop_data(for_loop)?.clone();

    let add = engine.create_node(&mut graph, "Math.Add", Some(for_loop))?;
    graph.connect(
        OutputAddress {
            node_id: data.looped_node,
            index: 0,
        },
        InputAddress {
            node_id: add,
            index: 0,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: data.container.inputs_node,
            index: FOR_STEP_INPUT,
        },
        InputAddress {
            node_id: add,
            index: 1,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: add,
            index: 0,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: looped.output,
        },
    )?;

    // 0 + 0 + 1 + 2 + 3
    assert_eq!(
        engine.evaluate(&graph, loop_output(for_loop, looped.output)),
        Value::Float(6.0)
    );

    // without iterations the initial value passes through
    engine.set_input_value(&mut graph, loop_input(for_loop, FOR_END_INPUT), Value::Int(0))?;
    engine.set_input_value(&mut graph, loop_input(for_loop, looped.input), Value::Float(1.5))?;
    assert_eq!(
        engine.evaluate(&graph, loop_output(for_loop, looped.output)),
        Value::Float(1.5)
    );

    // outside an iteration the looped node shows the initial value
    assert_eq!(
        engine.evaluate(
            &graph,
            OutputAddress {
                node_id: data.looped_node,
                index: 0
            }
        ),
        Value::Float(1.5)
    );

    Ok(())
}

#[test]
fn nested_loops_see_the_enclosing_step() -> anyhow::Result<()> {
    let engine = Engine::default();
    let mut graph = Graph::default();

    let outer = graph.add_loop("rows", LoopKind::For, None)?;
    graph.set_input_value(loop_input(outer, FOR_END_INPUT), Value::Int(3))?;
    graph.add_container_output(
        outer,
        "rows",
        DataType::list_of(DataType::list_of(DataType::Int)),
    )?;
    let outer_data = graph.try_loop_data(outer)?.clone();

    let inner = graph.add_loop("columns", LoopKind::For, Some(outer))?;
    graph.set_input_value(loop_input(inner, FOR_END_INPUT), Value::Int(2))?;
    let offset = graph.add_container_input(inner, "offset", DataType::Int)?;
    graph.add_container_output(inner, "row", DataType::list_of(DataType::Int))?;
    let inner_data = graph.try_loop_data(inner)?.clone();

    graph.connect(
        OutputAddress {
            node_id: outer_data.container.inputs_node,
            index: FOR_STEP_INPUT,
        },
        loop_input(inner, offset),
    )?;
    graph.connect(
        loop_output(inner, 0),
        InputAddress {
            node_id: outer_data.container.outputs_node,
            index: 0,
        },
    )?;

    let add = engine.create_node(&mut graph, "Math.Add", Some(inner))?;
    graph.connect(
        OutputAddress {
            node_id: inner_data.container.inputs_node,
            index: FOR_STEP_INPUT,
        },
        InputAddress {
            node_id: add,
            index: 0,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: inner_data.container.inputs_node,
            index: offset,
        },
        InputAddress {
            node_id: add,
            index: 1,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: add,
            index: 0,
        },
        InputAddress {
            node_id: inner_data.container.outputs_node,
            index: 0,
        },
    )?;

    let expected = Value::List(ListValue::new(
        DataType::list_of(DataType::Int),
        vec![int_list(&[0, 1]), int_list(&[1, 2]), int_list(&[2, 3])],
    ));
    assert_eq!(engine.evaluate(&graph, loop_output(outer, 0)), expected);

    Ok(())
}

#[test]
fn iteration_cap_limits_runaway_loops() -> anyhow::Result<()> {
    let engine = Engine::new(EngineConfig {
        max_loop_iterations: 3,
        ..Default::default()
    });
    counting_processor(engine.registry(), "square", |ctx| {
        let x = ctx.input(0).as_i64().unwrap_or_default();
        ctx.push_output(Value::Int(x * x));
    });
    counting_processor(engine.registry(), "constant", |ctx| {
        ctx.push_output(Value::Float(2.5));
    });

    let mut graph = Graph::default();
    let for_loop = squares_graph(&mut graph, 100)?;

    assert_eq!(
        engine.evaluate(&graph, loop_output(for_loop, 0)),
        int_list(&[0, 1, 4])
    );

    Ok(())
}

#[test]
fn foreach_skips_lists_of_other_lengths() -> anyhow::Result<()> {
    let engine = Engine::default();
    let mut graph = Graph::default();

    let foreach = graph.add_loop("foreach", LoopKind::Foreach, None)?;
    let short = graph.add_looped_socket(foreach, "short", DataType::Int)?;
    let long = graph.add_looped_socket(foreach, "long", DataType::Int)?;
    graph.set_input_value(loop_input(foreach, short.input), int_list(&[1, 2, 3]))?;
    graph.set_input_value(loop_input(foreach, long.input), int_list(&[1, 2, 3, 4]))?;
    let data = graph.try_loop_data(foreach)?.clone();

    let multiply = engine.create_node(&mut graph, "Math.Multiply", Some(foreach))?;
    graph.set_input_value(
        InputAddress {
            node_id: multiply,
            index: 1,
        },
        Value::Int(2),
    )?;
    graph.connect(
        OutputAddress {
            node_id: data.looped_node,
            index: 0,
        },
        InputAddress {
            node_id: multiply,
            index: 0,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: multiply,
            index: 0,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: short.output,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: data.looped_node,
            index: 1,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: long.output,
        },
    )?;

    assert_eq!(
        engine.evaluate(&graph, loop_output(foreach, short.output)),
        int_list(&[2, 4, 6])
    );
    assert_eq!(
        engine.evaluate(&graph, loop_output(foreach, long.output)),
        Value::None
    );

    Ok(())
}

#[test]
fn foreach_measures_against_the_first_list() -> anyhow::Result<()> {
    let engine = Engine::default();
    let mut graph = Graph::default();

    let foreach = graph.add_loop("foreach", LoopKind::Foreach, None)?;
    let long = graph.add_looped_socket(foreach, "long", DataType::Int)?;
    let short = graph.add_looped_socket(foreach, "short", DataType::Int)?;
    graph.set_input_value(loop_input(foreach, long.input), int_list(&[1, 2, 3, 4]))?;
    graph.set_input_value(loop_input(foreach, short.input), int_list(&[1, 2, 3]))?;
    let data = graph.try_loop_data(foreach)?.clone();

    let multiply = engine.create_node(&mut graph, "Math.Multiply", Some(foreach))?;
    graph.set_input_value(
        InputAddress {
            node_id: multiply,
            index: 1,
        },
        Value::Int(2),
    )?;
    graph.connect(
        OutputAddress {
            node_id: data.looped_node,
            index: 0,
        },
        InputAddress {
            node_id: multiply,
            index: 0,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: multiply,
            index: 0,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: long.output,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: data.looped_node,
            index: 1,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: short.output,
        },
    )?;

    assert_eq!(
        engine.evaluate(&graph, loop_output(foreach, long.output)),
        int_list(&[2, 4, 6, 8])
    );
    assert_eq!(
        engine.evaluate(&graph, loop_output(foreach, short.output)),
        Value::None
    );

    Ok(())
}

#[test]
fn foreach_iterates_plain_list_inputs() -> anyhow::Result<()> {
    let engine = Engine::default();
    let mut graph = Graph::default();

    let foreach = graph.add_loop("foreach", LoopKind::Foreach, None)?;
    let items = graph.add_looped_socket(foreach, "items", DataType::Int)?;
    let offsets = graph.add_container_input(foreach, "offsets", DataType::list_of(DataType::Int))?;
    graph.set_input_value(loop_input(foreach, items.input), int_list(&[1, 2, 3]))?;
    graph.set_input_value(loop_input(foreach, offsets), int_list(&[10, 20, 30]))?;
    let data = graph.try_loop_data(foreach)?.clone();

    let add = engine.create_node(&mut graph, "Math.Add", Some(foreach))?;
    graph.connect(
        OutputAddress {
            node_id: data.looped_node,
            index: 0,
        },
        InputAddress {
            node_id: add,
            index: 0,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: data.container.inputs_node,
            index: offsets,
        },
        InputAddress {
            node_id: add,
            index: 1,
        },
    )?;
    graph.connect(
        OutputAddress {
            node_id: add,
            index: 0,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: items.output,
        },
    )?;

    assert_eq!(
        engine.evaluate(&graph, loop_output(foreach, items.output)),
        int_list(&[11, 22, 33])
    );

    // a plain list of another length is left out of the iteration
    engine.set_input_value(&mut graph, loop_input(foreach, offsets), int_list(&[10, 20]))?;
    assert_eq!(
        engine.evaluate(&graph, loop_output(foreach, items.output)),
        int_list(&[1, 2, 3])
    );

    Ok(())
}

#[test]
fn for_counter_survives_extreme_bounds() -> anyhow::Result<()> {
    let engine = Engine::default();
    let mut graph = Graph::default();

    let for_loop = graph.add_loop("extremes", LoopKind::For, None)?;
    graph.set_input_value(loop_input(for_loop, FOR_START_INPUT), Value::Int(i64::MIN))?;
    graph.set_input_value(loop_input(for_loop, FOR_END_INPUT), Value::Int(i64::MAX))?;
    graph.set_input_value(loop_input(for_loop, FOR_STEP_INPUT), Value::Int(i64::MAX))?;
    graph.add_container_output(for_loop, "counters", DataType::list_of(DataType::Int))?;
    let data = graph.try_loop_data(for_loop)?.clone();
    graph.connect(
        OutputAddress {
            node_id: data.container.inputs_node,
            index: FOR_STEP_INPUT,
        },
        InputAddress {
            node_id: data.container.outputs_node,
            index: 0,
        },
    )?;

    assert_eq!(
        engine.evaluate(&graph, loop_output(for_loop, 0)),
        int_list(&[i64::MIN, -1, i64::MAX - 1])
    );

    Ok(())
}

#[test]
fn foreach_without_lists_produces_nothing() -> anyhow::Result<()> {
    let engine = Engine::default();
    let mut graph = Graph::default();
    let foreach = graph.add_loop("foreach", LoopKind::Foreach, None)?;
    graph.add_looped_socket(foreach, "items", DataType::Float)?;

    assert_eq!(engine.evaluate(&graph, loop_output(foreach, 0)), Value::None);
    assert!(!engine.is_cached(foreach));

    Ok(())
}

// While loops only resolve to a processor; iterating them is left open.
#[test]
fn while_loop_is_an_unevaluated_extension_point() -> anyhow::Result<()> {
    let engine = Engine::default();
    let mut graph = Graph::default();
    let while_loop = graph.add_loop("while", LoopKind::While, None)?;
    graph.add_container_output(while_loop, "result", DataType::Float)?;
    assert_eq!(
        graph.input(loop_input(while_loop, WHILE_CONDITION_INPUT))?.value,
        Value::Bool(false)
    );

    assert_eq!(engine.evaluate(&graph, loop_output(while_loop, 0)), Value::None);
    assert!(!engine.is_cached(while_loop));

    Ok(())
}

#[test]
fn counter_socket_outside_the_loop_mirrors_the_step_input() -> anyhow::Result<()> {
    let engine = Engine::default();
    counting_processor(engine.registry(), "square", |ctx| {
        let x = ctx.input(0).as_i64().unwrap_or_default();
        ctx.push_output(Value::Int(x * x));
    });
    counting_processor(engine.registry(), "constant", |ctx| {
        ctx.push_output(Value::Float(2.5));
    });

    let mut graph = Graph::default();
    let for_loop = squares_graph(&mut graph, 3)?;
    engine.evaluate(&graph, loop_output(for_loop, 0));

    let inputs_node = graph.try_loop_data(for_loop)?.container.inputs_node;
    assert_eq!(
        engine.evaluate(
            &graph,
            OutputAddress {
                node_id: inputs_node,
                index: FOR_STEP_INPUT
            }
        ),
        Value::Int(1)
    );
    Ok(())
}
