//! Inspect command implementation.

use crate::config::AppConfig;
use crate::error::CliResult;
use facetdb_core::{Engine, EntitySummary};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory, if any.
    pub data_dir: Option<String>,
    /// Journal size in bytes after recovery.
    pub journal_size: u64,
    /// Per-entity summaries.
    pub entities: Vec<EntitySummary>,
}

/// Runs the inspect command.
pub fn run(path: &Path, data_dir: Option<PathBuf>, format: &str) -> CliResult<()> {
    let mut config = AppConfig::load(path)?;
    if let Some(dir) = data_dir {
        config.storage.data_dir = Some(dir);
    }
    config.validate()?;

    let engine_config = config.engine_config().create_if_missing(false);
    let engine = Engine::open(engine_config, config.entities.clone())?;
    let result = inspect(&engine, config.storage.data_dir.as_deref())?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Collects summaries of every entity of an open engine.
pub fn inspect(engine: &Engine, data_dir: Option<&Path>) -> CliResult<InspectResult> {
    let entities = engine
        .registry()
        .names()
        .iter()
        .map(|name| engine.summary(name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InspectResult {
        data_dir: data_dir.map(|d| d.display().to_string()),
        journal_size: engine.journal_size()?,
        entities,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("facetdb inspection");
    println!("==================");
    println!(
        "Data directory: {}",
        result.data_dir.as_deref().unwrap_or("(in memory)")
    );
    println!("Journal size:   {} bytes", result.journal_size);

    for summary in &result.entities {
        println!();
        println!("{} ({} documents)", summary.entity, summary.documents);
        for (field, entries) in &summary.facets {
            let shown: Vec<String> = entries
                .iter()
                .map(|e| format!("{} ({})", e.value, e.count))
                .collect();
            println!("  {field}: {}", shown.join(", "));
        }
    }
}
