use serde_json::{Map, Value, json};

use crate::{
    depth::DepthBound,
    errors::MappingError,
    materialize::Materialized,
    model::Related,
    schema::{EntityKind, SchemaRegistry},
    statement::{Statement, StatementGenerator},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub config: Option<String>,
    pub database: String,
    pub command: String,
    pub entity: Option<String>,
    pub id: Option<String>,
    pub depth: Option<i32>,
    pub log: Option<String>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut config = None;
        let mut database = String::from("memory");
        let mut command = String::from("entities");
        let mut entity = None;
        let mut id = None;
        let mut depth = None;
        let mut log = None;
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .map(|v| v.to_string())
                    .ok_or_else(|| format!("{flag} requires a value"))
            };
            match *arg {
                "--config" => config = Some(value("--config")?),
                "--db" | "--database" => database = value("--db")?,
                "--command" => command = value("--command")?,
                "--entity" => entity = Some(value("--entity")?),
                "--id" => id = Some(value("--id")?),
                "--depth" => {
                    let raw = value("--depth")?;
                    depth = Some(
                        raw.parse::<i32>()
                            .map_err(|_| format!("--depth expects an integer, got {raw}"))?,
                    );
                }
                "--log" => log = Some(value("--log")?),
                other if other.starts_with('-') => {
                    return Err(format!("unknown flag {other}"));
                }
                _ => {
                    command = arg.to_string();
                }
            }
        }
        Ok(Self {
            config,
            database,
            command,
            entity,
            id,
            depth,
            log,
        })
    }

    pub fn help() -> &'static str {
        "Usage: graphmap --config PATH [--db memory|PATH] [--command entities|statements|count|load]\n\
         \x20               [--entity NAME] [--id VALUE] [--depth N] [--log FILTER]\n"
    }

    /// The `--id` argument as JSON, falling back to a plain string.
    pub fn id_value(&self) -> Option<Value> {
        self.id.as_deref().map(|raw| {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        })
    }
}

/// One line per registered type: name, kind, and labels or relationship type.
pub fn describe_entities(registry: &SchemaRegistry) -> Vec<String> {
    registry
        .descriptors()
        .map(|descriptor| match descriptor.kind() {
            EntityKind::Node { labels } => {
                format!("{} node labels={}", descriptor.name(), labels.join(":"))
            }
            EntityKind::Relationship {
                rel_type,
                start,
                end,
            } => format!(
                "{} relationship type={rel_type} start={start} end={end}",
                descriptor.name()
            ),
        })
        .collect()
}

/// The statements generated for one type, labelled by operation.
pub fn entity_statements(
    registry: &SchemaRegistry,
    entity: &str,
    id: Value,
    bound: DepthBound,
) -> Result<Vec<(&'static str, Statement)>, MappingError> {
    let descriptor = registry.describe(entity)?;
    let generator = StatementGenerator::new(registry);
    let mut statements = Vec::new();
    if descriptor.is_relationship_entity() {
        statements.push((
            "find_one",
            generator.find_one_relationship(descriptor, id.clone(), bound)?,
        ));
        statements.push((
            "find_all",
            generator.find_all_relationships_by_type(descriptor, bound)?,
        ));
        statements.push(("delete_one", generator.delete_relationship(descriptor, id)?));
        if let Some(rel_type) = descriptor.rel_type() {
            statements.push(("count", generator.count_relationships(rel_type)));
        }
    } else {
        statements.push(("find_one", generator.find_one(descriptor, id.clone(), bound)?));
        statements.push(("find_all", generator.find_by_label(descriptor, bound)?));
        statements.push(("delete_one", generator.delete_one(descriptor, id)?));
        statements.push(("count", generator.count_by_labels(descriptor.node_labels())));
    }
    Ok(statements)
}

pub fn statement_line(operation: &str, statement: &Statement) -> String {
    let parameters = Value::Object(
        statement
            .parameters()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    format!("{operation}\t{}\t{parameters}", statement.text())
}

/// JSON rendering of a materialized result, roots first.
pub fn materialized_json(result: &Materialized) -> Value {
    let entities: Vec<Value> = result
        .graph
        .iter()
        .map(|(key, entity)| {
            let mut relationships = Map::new();
            for (field, related) in entity.relationships() {
                let value = match related {
                    Related::Grouped(groups) => json!(groups
                        .iter()
                        .map(|(rel_type, keys)| (
                            rel_type.clone(),
                            json!(keys.iter().map(|k| k.index()).collect::<Vec<_>>())
                        ))
                        .collect::<Map<String, Value>>()),
                    other => json!(other.keys().iter().map(|k| k.index()).collect::<Vec<_>>()),
                };
                relationships.insert(field.clone(), value);
            }
            json!({
                "key": key.index(),
                "type": entity.type_name(),
                "internal_id": entity.internal_id(),
                "properties": entity.properties(),
                "relationships": relationships,
            })
        })
        .collect();
    json!({
        "roots": result.roots.iter().map(|k| k.index()).collect::<Vec<_>>(),
        "entities": entities,
    })
}
