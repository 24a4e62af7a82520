//! Compiles a [`WritePlan`] into one statement. Clause order is fixed: deletion
//! of relationships dropped from their fields, MATCHes of persisted nodes and
//! relationships, their SETs, then MERGE and CREATE of everything new, and
//! finally the ids of every reference.

use serde_json::Value;

use crate::{
    decompose::{NodeUpsert, UpsertMode, VersionCheck, WritePlan},
    result::PropertyMap,
    statement::{Operation, Parameters, Statement, label_fragment, quote},
};

/// Parameter listing the relationships to delete.
pub const DELETED_PARAMETER: &str = "deleted";

pub fn compile(plan: &WritePlan) -> Statement {
    let mut deletes = Vec::new();
    let mut matches = Vec::new();
    let mut sets = Vec::new();
    let mut creates = Vec::new();
    let mut parameters = Parameters::new();

    if !plan.deleted_relationships.is_empty() {
        parameters.insert(
            DELETED_PARAMETER.to_string(),
            Value::from(plan.deleted_relationships.clone()),
        );
        deletes.push(format!(
            "OPTIONAL MATCH ()-[_d]->() WHERE id(_d) IN ${DELETED_PARAMETER} DELETE _d WITH count(*) AS _deleted"
        ));
    }

    for node in &plan.nodes {
        let reference = &node.reference;
        let props = format!("{reference}_props");
        parameters.insert(props.clone(), properties_value(&node.properties));
        let guard = node
            .version
            .as_ref()
            .map(|check| version_guard(reference, check, &mut parameters));
        let relabel = relabel(node);
        match &node.mode {
            UpsertMode::Match { id } => {
                let id_param = format!("{reference}_id");
                parameters.insert(id_param.clone(), Value::from(*id));
                let guard = guard.map(|guard| format!(" AND {guard}")).unwrap_or_default();
                matches.push(format!(
                    "MATCH ({reference}) WHERE id({reference}) = ${id_param}{guard}"
                ));
                sets.push(format!("SET {reference} += ${props}{relabel}"));
            }
            UpsertMode::Merge { property, value } => {
                let id_param = format!("{reference}_id");
                parameters.insert(id_param.clone(), value.clone());
                let pattern = format!(
                    "({reference}{} {{{}: ${id_param}}})",
                    label_fragment(&node.mapped_labels()),
                    quote(property)
                );
                let persisted = node.version.as_ref().is_some_and(|check| check.expected.is_some());
                match guard {
                    Some(guard) if persisted => {
                        matches.push(format!("MATCH {pattern} WHERE {guard}"));
                        sets.push(format!("SET {reference} += ${props}{relabel}"));
                    }
                    _ => creates.push(format!("MERGE {pattern} SET {reference} += ${props}{relabel}")),
                }
            }
            UpsertMode::Create => {
                creates.push(format!(
                    "CREATE ({reference}{} ${props})",
                    label_fragment(&node.labels)
                ));
            }
        }
    }

    for relationship in &plan.relationships {
        let reference = &relationship.reference;
        let props = format!("{reference}_props");
        parameters.insert(props.clone(), properties_value(&relationship.properties));
        let (start, end) = (&relationship.start, &relationship.end);
        let rel_type = quote(&relationship.rel_type);
        match (relationship.id, relationship.entity) {
            (Some(id), _) => {
                let id_param = format!("{reference}_id");
                parameters.insert(id_param.clone(), Value::from(id));
                matches.push(format!(
                    "MATCH ()-[{reference}]->() WHERE id({reference}) = ${id_param}"
                ));
                sets.push(format!("SET {reference} += ${props}"));
            }
            (None, Some(_)) => creates.push(format!(
                "CREATE ({start})-[{reference}:{rel_type} ${props}]->({end})"
            )),
            (None, None) => creates.push(format!(
                "MERGE ({start})-[{reference}:{rel_type}]->({end}) SET {reference} += ${props}"
            )),
        }
    }

    let returns: Vec<String> = plan
        .nodes
        .iter()
        .map(|node| &node.reference)
        .chain(plan.relationships.iter().map(|rel| &rel.reference))
        .map(|reference| format!("id({reference}) AS {reference}"))
        .collect();

    let mut clauses = deletes;
    clauses.extend(matches);
    clauses.extend(sets);
    clauses.extend(creates);
    clauses.push(format!("RETURN {}", returns.join(", ")));

    Statement::new(clauses.join(" "), parameters, Operation::Write(plan.clone()))
}

/// `<ref>.<version> = $<ref>_version`, or `IS NULL` for a node never versioned.
fn version_guard(reference: &str, check: &VersionCheck, parameters: &mut Parameters) -> String {
    let property = quote(&check.property);
    match check.expected {
        Some(expected) => {
            let name = format!("{reference}_version");
            parameters.insert(name.clone(), Value::from(expected));
            format!("{reference}.{property} = ${name}")
        }
        None => format!("{reference}.{property} IS NULL"),
    }
}

/// Label changes of an existing node: dynamic labels added, stale ones removed.
fn relabel(node: &NodeUpsert) -> String {
    let reference = &node.reference;
    let mut clause = String::new();
    if !node.dynamic_labels.is_empty() {
        clause.push_str(&format!(", {reference}{}", label_fragment(&node.dynamic_labels)));
    }
    if !node.removed_labels.is_empty() {
        clause.push_str(&format!(" REMOVE {reference}{}", label_fragment(&node.removed_labels)));
    }
    clause
}

fn properties_value(properties: &PropertyMap) -> Value {
    Value::Object(
        properties
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}
