use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use harvest_core::{to_csv, to_flat_rows, to_hierarchical, HarvestOutcome};

pub const CONVERSATIONS_FILE: &str = "conversations.json";
pub const MESSAGES_JSON_FILE: &str = "messages.json";
pub const MESSAGES_CSV_FILE: &str = "messages.csv";

/// Write the run's output files into `dir`, creating it if needed.
///
/// Summaries always go to `conversations.json`. Message history is only
/// written for full-history runs.
pub fn write_outcome(
    dir: &Path,
    outcome: &HarvestOutcome,
    full_history: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut written = Vec::new();

    let summaries = serde_json::to_string_pretty(&outcome.summaries)?;
    written.push(write_file(dir, CONVERSATIONS_FILE, &summaries)?);

    if full_history {
        let messages = serde_json::to_string_pretty(&to_hierarchical(&outcome.details))?;
        written.push(write_file(dir, MESSAGES_JSON_FILE, &messages)?);

        let csv = to_csv(&to_flat_rows(&outcome.details));
        written.push(write_file(dir, MESSAGES_CSV_FILE, &csv)?);
    }

    Ok(written)
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
