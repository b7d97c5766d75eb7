use log::{debug, warn};

use crate::data::{DataType, ListValue, Value};
use crate::evaluator::ProcessContext;
use crate::graph::{
    InputAddress, LoopData, LoopKind, Node, NodeKind, NodeType, FOR_END_INPUT, FOR_START_INPUT,
    FOR_STEP_INPUT, WHILE_CONDITION_INPUT,
};
use crate::loop_context::LoopContext;
use crate::node_lib::NodeLibrary;
use crate::registry::Registry;

pub(crate) fn register_processors(registry: &Registry) {
    registry.add_generic_processor(NodeType::Container, step_in);
    registry.add_generic_processor(NodeType::Inputs, step_out);
    registry.add_generic_processor(NodeType::LoopedInputs, looped_inputs);
    registry.add_generic_processor(NodeType::Loop(LoopKind::For), for_loop);
    registry.add_generic_processor(NodeType::Loop(LoopKind::Foreach), foreach_loop);
    registry.add_generic_processor(NodeType::Loop(LoopKind::While), while_loop);
    registry.add_generic_processor(NodeType::Array, array);
    registry.add_generic_processor(NodeType::CreateList, create_list);
}

/// Outer outputs of a container come from its interior output node.
fn step_in(ctx: &mut ProcessContext<'_>) {
    let node = ctx.node();
    let Some(data) = node.kind.container_data() else {
        return;
    };

    for index in 0..node.outputs.len() {
        let value = ctx.evaluate_input(InputAddress {
            node_id: data.outputs_node,
            index,
        });
        ctx.push_output(value);
    }
}

/// Interior input node outputs come from the container's outer inputs.
fn step_out(ctx: &mut ProcessContext<'_>) {
    let node = ctx.node();
    let NodeKind::Inputs { container } = node.kind else {
        return;
    };

    for index in 0..node.outputs.len() {
        let value = ctx.evaluate_input(InputAddress {
            node_id: container,
            index,
        });
        ctx.push_output(value);
    }
}

/// Looped values read outside an iteration fall back to their initial value.
fn looped_inputs(ctx: &mut ProcessContext<'_>) {
    let node = ctx.node();
    let NodeKind::LoopedInputs { container } = node.kind else {
        return;
    };
    let Some(data) = ctx.graph().node(container).and_then(|n| n.kind.loop_data()) else {
        return;
    };

    for (looped, output) in data.looped.iter().zip(node.outputs.iter()) {
        let value = ctx
            .evaluate_input(InputAddress {
                node_id: container,
                index: looped.input,
            })
            .convert_type(&output.data_type);
        ctx.push_output(value);
    }
}

/// Iterations of `start..end` advancing by `step`. Zero when `step` cannot reach `end`.
pub(crate) fn iteration_count(start: i64, end: i64, step: i64) -> usize {
    if step <= 0 || end <= start {
        return 0;
    }
    let span = end as i128 - start as i128;
    let count = (span + step as i128 - 1) / step as i128;
    usize::try_from(count).unwrap_or(usize::MAX)
}

fn for_loop(ctx: &mut ProcessContext<'_>) {
    let node = ctx.node();
    let Some(data) = node.kind.loop_data() else {
        return;
    };

    let start = ctx.input(FOR_START_INPUT).as_i64();
    let end = ctx.input(FOR_END_INPUT).as_i64();
    let step = ctx.input(FOR_STEP_INPUT).as_i64();
    let (Some(start), Some(end), Some(step)) = (start, end, step) else {
        warn!("Loop \"{}\" has non-integer bounds", node.name);
        return;
    };

    let mut count = iteration_count(start, end, step);
    if count == 0 && end > start {
        warn!(
            "Loop \"{}\" step {} never reaches {}, skipping",
            node.name, step, end
        );
    }
    if count > ctx.max_loop_iterations() {
        warn!(
            "Loop \"{}\" capped at {} of {} iterations",
            node.name,
            ctx.max_loop_iterations(),
            count
        );
        count = ctx.max_loop_iterations();
    }

    let initial: Vec<Value> = data
        .looped
        .iter()
        .map(|looped| ctx.input(looped.input))
        .collect();

    let graph = ctx.graph();
    let cache = ctx.cache();
    let mut loop_ctx = LoopContext::new(node.id, ctx.loop_context());
    let mut carried = initial.clone();
    let mut counter = Some(start);

    for _ in 0..count {
        // the last counter can sit within one step of i64::MAX
        let Some(current) = counter else {
            break;
        };
        counter = current.checked_add(step);

        loop_ctx.add_data(carried);
        loop_ctx.set_step(current, graph, cache);

        let values = evaluate_body(ctx, &loop_ctx, data);
        carried = data
            .looped
            .iter()
            .map(|looped| values.get(looped.output).cloned().unwrap_or_default())
            .collect();
        loop_ctx.record(values);
    }
    debug!("Loop \"{}\" ran {} iterations", node.name, loop_ctx.iteration());

    let history = loop_ctx.close();
    for (index, output) in node.outputs.iter().enumerate() {
        let value = match &output.data_type {
            DataType::List(element_type) => {
                let items = history
                    .iter()
                    .map(|values| values.get(index).cloned().unwrap_or_default())
                    .collect();
                Value::List(ListValue::new((**element_type).clone(), items))
            }
            _ => match history.last() {
                Some(values) => values.get(index).cloned().unwrap_or_default(),
                None => data
                    .looped
                    .iter()
                    .position(|looped| looped.output == index)
                    .map(|position| initial[position].clone())
                    .unwrap_or_default(),
            },
        };
        ctx.push_output(value);
    }
}

/// Evaluates every input of the loop's interior output node for one iteration.
fn evaluate_body(
    ctx: &mut ProcessContext<'_>,
    loop_ctx: &LoopContext<'_>,
    data: &LoopData,
) -> Vec<Value> {
    let outputs_node = data.container.outputs_node;
    let count = ctx
        .graph()
        .node(outputs_node)
        .map_or(0, |node| node.inputs.len());

    (0..count)
        .map(|index| {
            ctx.evaluate_input_in(
                loop_ctx,
                InputAddress {
                    node_id: outputs_node,
                    index,
                },
            )
        })
        .collect()
}

fn foreach_loop(ctx: &mut ProcessContext<'_>) {
    let node = ctx.node();
    let Some(data) = node.kind.loop_data() else {
        return;
    };

    // every list-valued input is iterated, looped or not
    let lists: Vec<Option<ListValue>> = (0..ctx.input_count())
        .map(|index| ctx.input(index).into_list())
        .collect();
    let Some(len) = lists.iter().flatten().map(ListValue::len).next() else {
        debug!("Foreach \"{}\" has no list input", node.name);
        return;
    };

    let included: Vec<bool> = lists
        .iter()
        .map(|list| list.as_ref().is_some_and(|list| list.len() == len))
        .collect();
    for (input, list) in lists.iter().enumerate() {
        if let Some(list) = list.as_ref().filter(|list| list.len() != len) {
            warn!(
                "Foreach \"{}\" skips input {}: length {} differs from {}",
                node.name,
                input,
                list.len(),
                len
            );
        }
    }
    let element = |input: usize, item: usize| -> Option<Value> {
        let list = lists.get(input)?.as_ref()?;
        if included[input] {
            Some(list.get(item).cloned().unwrap_or_default())
        } else {
            Some(Value::None)
        }
    };

    let count = len.min(ctx.max_loop_iterations());
    let graph = ctx.graph();
    let cache = ctx.cache();
    let mut loop_ctx = LoopContext::new(node.id, ctx.loop_context());

    for item in 0..count {
        let looped = data
            .looped
            .iter()
            .map(|looped| element(looped.input, item).unwrap_or_default())
            .collect();
        loop_ctx.set_elements((0..lists.len()).map(|input| element(input, item)).collect());
        loop_ctx.add_data(looped);
        loop_ctx.set_step(item as i64, graph, cache);

        let values = evaluate_body(ctx, &loop_ctx, data);
        loop_ctx.record(values);
    }

    let history = loop_ctx.close();
    for (index, output) in node.outputs.iter().enumerate() {
        let looped = data.looped.iter().find(|looped| looped.output == index);

        let value = match looped {
            Some(looped) => match lists.get(looped.input) {
                Some(Some(list)) if included[looped.input] => {
                    let mut result = list.clone();
                    for (item, values) in history.iter().enumerate() {
                        match values.get(index) {
                            Some(value) if !value.is_none() => result.set(item, value.clone()),
                            _ => {}
                        }
                    }
                    Value::List(result)
                }
                _ => Value::None,
            },
            None => match &output.data_type {
                DataType::List(element_type) => Value::List(ListValue::new(
                    (**element_type).clone(),
                    history
                        .iter()
                        .map(|values| values.get(index).cloned().unwrap_or_default())
                        .collect(),
                )),
                _ => history
                    .last()
                    .and_then(|values| values.get(index).cloned())
                    .unwrap_or_default(),
            },
        };
        ctx.push_output(value);
    }
}

/// Registered so while loops resolve, but iterates nothing. Every output is empty.
fn while_loop(ctx: &mut ProcessContext<'_>) {
    let condition = ctx.input(WHILE_CONDITION_INPUT);
    debug!(
        "While loop \"{}\" is not evaluated (condition {:?})",
        ctx.node().name,
        condition
    );
}

fn array(ctx: &mut ProcessContext<'_>) {
    let items = ctx.present_inputs();

    let element_type = match ctx.data_type().element_type() {
        Some(element_type) if !element_type.is_variable() => element_type.clone(),
        _ => items.first().map(Value::data_type).unwrap_or_default(),
    };

    let mut list = ListValue::empty(element_type.clone());
    for item in items {
        let converted = item.clone().convert_type(&element_type);
        if converted.is_none() {
            warn!(
                "Array \"{}\" drops {} item, expected {}",
                ctx.node().name,
                item.data_type(),
                element_type
            );
            continue;
        }
        list.push(converted);
    }

    ctx.push_output(Value::List(list));
}

fn create_list(ctx: &mut ProcessContext<'_>) {
    let value = ctx.input(0);
    let count = ctx.input(1).as_i64().unwrap_or_default().max(0);
    let max = ctx.max_loop_iterations();
    if count as u64 > max as u64 {
        warn!(
            "Create List \"{}\" refuses {} items, the limit is {}",
            ctx.node().name,
            count,
            max
        );
        ctx.push_output(Value::None);
        return;
    }
    let count = count as usize;

    let element_type = match ctx.data_type().element_type() {
        Some(element_type) if !element_type.is_variable() => element_type.clone(),
        _ => value.data_type(),
    };
    let value = value.convert_type(&element_type);

    ctx.push_output(Value::List(ListValue::filled(element_type, count, value)));
}

pub(crate) fn register_node_types(library: &mut NodeLibrary) {
    library.register("General.Container", |graph, container| {
        graph.add_container("Container", container)
    });
    library.register("General.For", |graph, container| {
        graph.add_loop("For", LoopKind::For, container)
    });
    library.register("General.While", |graph, container| {
        graph.add_loop("While", LoopKind::While, container)
    });
    library.register("General.Foreach", |graph, container| {
        graph.add_loop("Foreach", LoopKind::Foreach, container)
    });
    library.register("General.Array", |graph, container| {
        let node = Node::new("Array", NodeKind::Array)
            .with_input("item", DataType::Variable)
            .with_input("add", DataType::Variable)
            .with_output("array", DataType::list_of(DataType::Variable));
        graph.add_node_to(container, node)
    });
    library.register("General.Create List", |graph, container| {
        let node = Node::new("Create List", NodeKind::CreateList)
            .with_input("value", DataType::Variable)
            .with_literal("count", DataType::Int, 0)
            .with_output("list", DataType::list_of(DataType::Variable));
        graph.add_node_to(container, node)
    });
}
