//! Check command implementation.

use crate::config::AppConfig;
use crate::error::CliResult;
use std::path::Path;

/// Runs the check command.
pub fn run(path: &Path) -> CliResult<()> {
    let config = AppConfig::load(path)?;
    config.validate()?;

    println!("{}: ok", path.display());
    for def in &config.entities {
        let facets: Vec<&str> = def.facet_fields().collect();
        println!(
            "  {:<16} {:>3} fields, facets: [{}]",
            def.name,
            def.fields.len(),
            facets.join(", ")
        );
    }
    Ok(())
}
