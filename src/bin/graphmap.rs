use std::{env, process, sync::Arc};

use graphmap::{
    MappingConfig, MappingError, Session, SqliteStore,
    cli::{self, CommandLineConfig},
    depth::DepthBound,
};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };
    install_tracing(config.log.as_deref());

    let mapping = match load_mapping(&config) {
        Ok(mapping) => mapping,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    if let Err(err) = run_command(&config, &mapping) {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn install_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn load_mapping(config: &CommandLineConfig) -> Result<MappingConfig, MappingError> {
    match &config.config {
        Some(path) => MappingConfig::from_path(path),
        None => Err(MappingError::config("--config is required")),
    }
}

fn open_store(config: &CommandLineConfig) -> Result<SqliteStore, MappingError> {
    if config.database == "memory" {
        SqliteStore::open_in_memory()
    } else {
        SqliteStore::open(&config.database)
    }
}

fn required_entity(config: &CommandLineConfig) -> Result<&str, MappingError> {
    config
        .entity
        .as_deref()
        .ok_or_else(|| MappingError::config(format!("{} requires --entity", config.command)))
}

fn run_command(config: &CommandLineConfig, mapping: &MappingConfig) -> Result<(), MappingError> {
    let registry = Arc::new(mapping.registry()?);
    let bound = DepthBound::new(config.depth.unwrap_or(mapping.load_depth));
    match config.command.as_str() {
        "entities" => {
            for line in cli::describe_entities(&registry) {
                println!("{line}");
            }
            Ok(())
        }
        "statements" => {
            let entity = required_entity(config)?;
            let id = config.id_value().unwrap_or(Value::Null);
            for (operation, statement) in cli::entity_statements(&registry, entity, id, bound)? {
                println!("{}", cli::statement_line(operation, &statement));
            }
            Ok(())
        }
        "count" => {
            let entity = required_entity(config)?;
            let session = Session::new(registry, open_store(config)?);
            println!("{entity} count={}", session.count_entities_of_type(entity)?);
            Ok(())
        }
        "load" => {
            let entity = required_entity(config)?;
            let id = config
                .id_value()
                .ok_or_else(|| MappingError::config("load requires --id"))?;
            let session = Session::new(registry, open_store(config)?);
            let loaded = session.load(entity, id, bound)?;
            println!("{}", cli::materialized_json(&loaded));
            Ok(())
        }
        other => Err(MappingError::config(format!("unknown command {other}"))),
    }
}
