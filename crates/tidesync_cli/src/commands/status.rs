//! Status command implementation.

use std::path::Path;
use tidesync_core::{Checkpoint, CheckpointStore, FileCheckpointStore};

/// Runs the status command.
pub fn run(checkpoint_dir: &Path, job: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileCheckpointStore::open(checkpoint_dir)?;
    let Some(checkpoint) = store.load(job)? else {
        println!("No checkpoint for job '{job}'");
        return Ok(());
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
        "text" => print_text(&checkpoint),
        other => return Err(format!("unknown format {other:?} (expected text or json)").into()),
    }
    Ok(())
}

fn print_text(cp: &Checkpoint) {
    println!("Job:         {}", cp.job);
    println!("Status:      {}", cp.status);
    println!("Cursor:      {}", cp.cursor);
    println!("Fetched:     {}", cp.records_fetched);
    println!("Written:     {}", cp.records_written);
    println!("Partitions:  {}", cp.partitions_validated);
    println!("Batch size:  {}", cp.adaptive_size);
    if !cp.completed_windows.is_empty() {
        println!("Windows:     {}", cp.completed_windows.len());
    }
    if let Some(error) = &cp.last_error {
        println!("Last error:  {error}");
    }
    println!("Created:     {}", cp.created_at.to_rfc3339());
    println!("Updated:     {}", cp.updated_at.to_rfc3339());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_checkpoint_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), "nope", "text").is_ok());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        store.save(&Checkpoint::new("orders", 100)).unwrap();
        assert!(run(dir.path(), "orders", "yaml").is_err());
    }
}
