//! Overrides command implementation.

use super::open_cache;
use nssync_engine::OverrideEntry;
use std::path::Path;

/// Runs the overrides command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cache = open_cache(path);
    let entries = cache.entries();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(entries)?);
        }
        "text" => print_text(path, entries),
        other => return Err(format!("Unknown format '{other}' (expected text or json)").into()),
    }
    Ok(())
}

fn print_text(path: &Path, entries: &[OverrideEntry]) {
    println!("Cached overrides ({})", path.display());
    println!("================");
    if entries.is_empty() {
        println!("  (none)");
        return;
    }
    for entry in entries {
        println!("  {}  started {}", entry.id, entry.created_at);
    }
    println!();
    println!("Total: {}", entries.len());
}
