//! reference::materialize
//!
//! Wiring of cross-unit references.
//!
//! # Algorithm
//!
//! For a producer unit P and a consumer unit C, take the chains of
//! enclosing units from the outermost unit down to each of them and let k
//! be the length of their common prefix.
//!
//! 1. Walk up from P: every unit below the meeting point publishes the
//!    value as an output, read by its parent through
//!    `Fn::GetAtt [nested, Outputs.<name>]`
//! 2. If the chains share no unit (k == 0), P's outermost unit exports
//!    the value under `<stackName>:<outputName>` and C's outermost unit
//!    reads it with `Fn::ImportValue`. The environments must not differ
//!    concretely, and the importing unit depends on the exporting one
//! 3. Walk down to C: every nested unit declares a parameter, its parent
//!    passes the value in, and the unit reads it with `Ref`
//!
//! List references are joined with `,` wherever they must travel as a
//! string and split again on the consuming side.
//!
//! Every name is derived from the target's path and attribute, never from
//! token ids, so output is stable across runs and each attribute is
//! exported once however often it is consumed.

use std::collections::BTreeSet;
use std::rc::Rc;

use serde_json::{json, Value};
use tracing::debug;

use super::{Reference, ReferenceError};
use crate::construct::{NodeIdx, Tree};
use crate::core::naming::prefixed_unique_id;
use crate::stack::{Output, Parameter};
use crate::token::{TokenId, ValueDomain};

const EXPORT_PREFIX: &str = "ExportsOutput";
const NESTED_OUTPUT_PREFIX: &str = "Output";
const PARAMETER_PREFIX: &str = "referenceto";
const IMPORT_PREFIX: &str = "Import";
const LIST_DELIMITER: &str = ",";

/// Wire every recorded cross-unit reference.
///
/// Returns the number of (reference, consuming unit) pairs wired.
pub fn materialize(
    tree: &mut Tree,
    uses: &BTreeSet<(NodeIdx, TokenId)>,
) -> Result<usize, ReferenceError> {
    let mut wired = 0;
    for (scope, token) in uses {
        let Some(reference) = tree.tokens().lookup(*token).and_then(|e| e.reference().cloned())
        else {
            continue;
        };
        let Some(consumer) = tree.unit_of(*scope) else {
            continue;
        };
        let producer = tree
            .unit_of(reference.target())
            .ok_or_else(|| ReferenceError::NoEnclosingUnit {
                path: tree.path(reference.target()),
            })?;

        if producer == consumer || reference.replacement(consumer).is_some() {
            continue;
        }

        wire(tree, &reference, producer, consumer)?;
        wired += 1;
    }
    Ok(wired)
}

fn wire(
    tree: &mut Tree,
    reference: &Rc<Reference>,
    producer: NodeIdx,
    consumer: NodeIdx,
) -> Result<(), ReferenceError> {
    let target = reference.target();
    let target_path = tree.path(target);
    let is_list = reference.domain() == ValueDomain::List;

    let logical_id = tree
        .logical_id(target)
        .ok_or_else(|| ReferenceError::NoEnclosingUnit {
            path: target_path.clone(),
        })?;

    let hint = reference.attribute().hint();
    let mut components: Vec<String> = tree
        .path_components(target)
        .into_iter()
        .map(str::to_string)
        .collect();
    components.push(hint);
    let components: Vec<&str> = components.iter().map(String::as_str).collect();

    let producer_chain = tree.unit_chain(producer);
    let consumer_chain = tree.unit_chain(consumer);
    let common = producer_chain
        .iter()
        .zip(consumer_chain.iter())
        .take_while(|(p, c)| p == c)
        .count();

    // Index in each chain of the unit where the value meets.
    let meet = common.saturating_sub(1);

    let mut value = reference.attribute().intrinsic(&logical_id);

    // Up from the producer.
    let output_name = prefixed_unique_id(NESTED_OUTPUT_PREFIX, &components);
    let mut level = producer_chain.len() - 1;
    while level > meet {
        let unit = producer_chain[level];
        let published = if is_list { join_list(value) } else { value };
        stack_data(tree, unit, &target_path)?.add_derived_output(&output_name, Output::new(published));

        let nested_id = tree.logical_id(unit).ok_or_else(|| materialization_error(&target_path, "nested stack has no logical id"))?;
        let read = json!({ "Fn::GetAtt": [nested_id, format!("Outputs.{output_name}")] });
        value = if is_list { split_list(read) } else { read };
        level -= 1;
    }

    // Across top-level units.
    if common == 0 {
        let exporter = producer_chain[0];
        let importer = consumer_chain[0];
        check_environments(tree, exporter, importer, &target_path)?;

        let export_output = prefixed_unique_id(EXPORT_PREFIX, &components);
        let stack_name = stack_data(tree, exporter, &target_path)?.stack_name().to_string();
        let export_name = format!("{stack_name}:{export_output}");

        let published = if is_list { join_list(value) } else { value };
        let mut output = Output::new(published);
        output.export_name = Some(export_name.clone());
        stack_data(tree, exporter, &target_path)?.add_derived_output(&export_output, output);

        let read = json!({ "Fn::ImportValue": export_name });
        value = if is_list { split_list(read) } else { read };

        let importer_data = stack_data(tree, importer, &target_path)?;
        importer_data.derived.unit_dependencies.insert(exporter);
        debug!(export = %export_name, "cross-stack export");
    }

    // Down to the consumer.
    let parameter_name = prefixed_unique_id(PARAMETER_PREFIX, &components);
    for &unit in consumer_chain.iter().skip(meet + 1) {
        let param_type = if is_list { "CommaDelimitedList" } else { "String" };
        let passed = if is_list { join_list(value) } else { value };

        let data = stack_data(tree, unit, &target_path)?;
        data.add_derived_parameter(&parameter_name, Parameter::new(param_type));
        data.derived
            .nested_parameters
            .insert(parameter_name.clone(), passed);

        value = json!({ "Ref": parameter_name });
    }

    let import = tree
        .tokens()
        .literal(value, reference.domain(), "import");
    let import_name = prefixed_unique_id(IMPORT_PREFIX, &components);
    stack_data(tree, consumer, &target_path)?
        .derived
        .imports
        .insert(import_name, import.id());
    reference.set_replacement(consumer, Value::String(import.as_string()));
    Ok(())
}

fn stack_data<'t>(
    tree: &'t mut Tree,
    unit: NodeIdx,
    target: &str,
) -> Result<&'t mut crate::stack::StackData, ReferenceError> {
    tree.stack_mut(unit)
        .ok_or_else(|| materialization_error(target, "enclosing unit is not a stack"))
}

fn materialization_error(target: &str, message: &str) -> ReferenceError {
    ReferenceError::Materialization {
        target: target.to_string(),
        message: message.to_string(),
    }
}

fn check_environments(
    tree: &Tree,
    producer: NodeIdx,
    consumer: NodeIdx,
    target: &str,
) -> Result<(), ReferenceError> {
    let (Some(p), Some(c)) = (tree.stack(producer), tree.stack(consumer)) else {
        return Err(materialization_error(target, "enclosing unit is not a stack"));
    };
    if p.environment().concretely_differs(c.environment()) {
        return Err(ReferenceError::CrossEnvironment {
            producer: tree.path(producer),
            consumer: tree.path(consumer),
            producer_env: p.environment().to_string(),
            consumer_env: c.environment().to_string(),
        });
    }
    Ok(())
}

fn join_list(value: Value) -> Value {
    json!({ "Fn::Join": [LIST_DELIMITER, value] })
}

fn split_list(value: Value) -> Value {
    json!({ "Fn::Split": [LIST_DELIMITER, value] })
}
