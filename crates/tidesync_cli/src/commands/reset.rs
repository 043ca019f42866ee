//! Reset command implementation.

use std::path::Path;
use tidesync_core::{CheckpointStore, FileCheckpointStore};

/// Runs the reset command.
pub fn run(checkpoint_dir: &Path, job: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileCheckpointStore::open(checkpoint_dir)?;
    match store.load(job)? {
        Some(checkpoint) => {
            store.clear(job)?;
            println!(
                "Cleared checkpoint for job '{job}' (was {}, {} partitions)",
                checkpoint.status, checkpoint.partitions_validated
            );
        }
        None => println!("No checkpoint for job '{job}'"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidesync_core::Checkpoint;

    #[test]
    fn reset_removes_the_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        store.save(&Checkpoint::new("orders", 100)).unwrap();

        run(dir.path(), "orders").unwrap();
        assert!(store.load("orders").unwrap().is_none());
        // Resetting again is harmless.
        run(dir.path(), "orders").unwrap();
    }
}
