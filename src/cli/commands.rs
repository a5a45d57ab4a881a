//! CLI command implementations
//!
//! Each invocation loads the snapshot, runs one request against an engine
//! over it, and writes the snapshot back when the command can change data.
//! Request failures are written to stdout as error responses.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::context::RuleContext;
use crate::engine::{
    is_node_collection, DeleteRequest, Engine, EngineError, EngineResult, QueryRequest, UpdateRequest,
    CATALOG_COLLECTION,
};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::store::{load_snapshot, save_snapshot, MemoryStore};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args())
}

/// Run one command against the snapshot named in `cli`
pub fn run_command(cli: Cli) -> CliResult<()> {
    let config = load_config(cli.config.as_deref())?;
    let request = if cli.command.reads_request() {
        read_request()?
    } else {
        Value::Null
    };

    match execute_on_snapshot(&cli, config, request)? {
        Ok(data) => write_response(data),
        Err(err) => write_error(err.code(), &err.to_string()),
    }
}

/// Load config (defaults when no file is given) and apply the log level
pub fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    Logger::set_min_severity(config.severity());
    log_event_with_fields(Event::ConfigLoaded, &[("project", &config.project_id)]);
    Ok(config)
}

/// Load the snapshot, run the request, and save if it succeeded and mutates
///
/// The outer error is fatal to the invocation; the inner one is the
/// request's own failure.
pub fn execute_on_snapshot(cli: &Cli, config: EngineConfig, request: Value) -> CliResult<EngineResult<Value>> {
    let store = Arc::new(load_snapshot(&cli.data)?);
    let path = cli.data.display().to_string();
    log_event_with_fields(Event::SnapshotLoaded, &[("path", &path)]);

    let engine = Engine::new(store.clone(), config);
    let ctx = context_for(cli, engine.config());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::runtime_error(format!("Failed to create tokio runtime: {}", e)))?;
    let outcome = runtime.block_on(execute(&engine, &store, &cli.command, &ctx, request));

    if outcome.is_ok() && cli.command.mutates() {
        save_snapshot(&store, &cli.data)?;
        log_event_with_fields(Event::SnapshotSaved, &[("path", &path)]);
    }
    Ok(outcome)
}

fn context_for(cli: &Cli, config: &EngineConfig) -> RuleContext {
    let mut ctx = RuleContext::new(cli.app.clone().unwrap_or_else(|| config.project_id.clone()));
    ctx.uid = cli.uid.clone();
    ctx.use_master_key = cli.master_key;
    ctx
}

/// Execute one command
pub async fn execute(
    engine: &Engine,
    store: &MemoryStore,
    command: &Command,
    ctx: &RuleContext,
    request: Value,
) -> EngineResult<Value> {
    match command {
        Command::Write { domain } => match request {
            Value::Array(documents) => Ok(Value::Array(engine.create_many(domain, documents, ctx).await?)),
            document => engine.create(domain, document, ctx).await,
        },
        Command::Query { domain } => {
            let request: QueryRequest = parse(request)?;
            Ok(engine.query(domain, request, ctx).await?.to_json())
        }
        Command::Update { domain } => {
            let request: UpdateRequest = parse(request)?;
            Ok(Value::Array(engine.update(domain, request, ctx).await?))
        }
        Command::Delete { domain } => {
            let request: DeleteRequest = parse(request)?;
            Ok(json!({ "deleted": engine.delete(domain, request, ctx).await? }))
        }
        Command::Sweep { domain } => Ok(json!(engine.sweep(domain, ctx).await?)),
        Command::Stats => stats(store),
    }
}

fn parse<T: serde::de::DeserializeOwned>(request: Value) -> EngineResult<T> {
    serde_json::from_value(request).map_err(|e| EngineError::validation(format!("Invalid request: {}", e)))
}

/// Row counts per domain, plus node and catalog totals
fn stats(store: &MemoryStore) -> EngineResult<Value> {
    let collections = store.export()?;
    let mut domains = serde_json::Map::new();
    let mut node_collections = 0;
    let mut nodes = 0;
    for (name, rows) in &collections {
        if is_node_collection(name) {
            node_collections += 1;
            nodes += rows.len();
        } else if name != CATALOG_COLLECTION {
            domains.insert(name.clone(), json!(rows.len()));
        }
    }
    Ok(json!({
        "domains": domains,
        "node_collections": node_collections,
        "nodes": nodes,
        "paths": store.len(CATALOG_COLLECTION),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn cli(dir: &TempDir, args: &[&str]) -> Cli {
        let data = dir.path().join("db.json");
        let mut full = vec!["arbordb", "--data", data.to_str().unwrap()];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    fn run(cli: &Cli, request: Value) -> EngineResult<Value> {
        execute_on_snapshot(cli, EngineConfig::default(), request).unwrap()
    }

    #[test]
    fn test_write_then_query_across_invocations() {
        let dir = TempDir::new().unwrap();

        let written = run(
            &cli(&dir, &["write", "Laptop"]),
            json!([{"_id": "d1", "model": "xps"}, {"_id": "d2", "model": "air"}]),
        )
        .unwrap();
        assert_eq!(written.as_array().unwrap().len(), 2);

        let found = run(
            &cli(&dir, &["query", "Laptop"]),
            json!({"filter": {"model": "xps"}}),
        )
        .unwrap();
        assert_eq!(found[0]["_id"], "d1");
    }

    #[test]
    fn test_failed_request_does_not_save() {
        let dir = TempDir::new().unwrap();
        let err = run(&cli(&dir, &["write", "__bad"]), json!({"a": 1})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!dir.path().join("db.json").exists());
    }

    #[test]
    fn test_delete_and_stats() {
        let dir = TempDir::new().unwrap();
        run(&cli(&dir, &["write", "Laptop"]), json!({"_id": "d1", "price": 20})).unwrap();

        let deleted = run(&cli(&dir, &["delete", "Laptop"]), json!({"filter": {"price": 20}})).unwrap();
        assert_eq!(deleted, json!({"deleted": ["d1"]}));

        let swept = run(&cli(&dir, &["sweep", "Laptop"]), Value::Null).unwrap();
        // price, createdAt, updatedAt, createdBy
        assert_eq!(swept["nodes_removed"], 4);

        let stats = run(&cli(&dir, &["stats"]), Value::Null).unwrap();
        assert_eq!(stats["nodes"], 0);
        assert_eq!(stats["paths"], 5);
        assert_eq!(stats["domains"], json!({}));
    }

    #[test]
    fn test_reserved_domain_needs_flag() {
        let dir = TempDir::new().unwrap();
        assert!(run(&cli(&dir, &["write", "_User"]), json!({"n": 1})).is_err());
        assert!(run(&cli(&dir, &["--master-key", "write", "_User"]), json!({"n": 1})).is_ok());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arbordb.json");
        fs::write(&path, r#"{"project_id": "shop"}"#).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().project_id, "shop");

        fs::write(&path, r#"{"store_timeout_ms": 0}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
