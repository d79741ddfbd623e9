use std::fs;
use std::path::PathBuf;

const SAMPLE_CONFIG: &str = r#"# cartflow configuration
#
# Each partition is an independently-ordered, independently-resumable JSONL
# file; one entry is the single-input case.
partitions:
  p0: ~/data/cart-join.json

# Lines starting with this marker are treated as corrupt and skipped.
corrupt_marker: "FAIL"

pipeline:
  # Max events pulled from each partition per batch.
  batch_size: 100

recovery:
  # DuckDB database holding committed snapshots.
  path: ~/.local/share/cartflow/recovery.duckdb
  # Zero commits a snapshot after every batch of progress.
  checkpoint_interval: 0s
  # Committed snapshots kept behind the latest.
  retain: 2
"#;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    if stdout {
        print!("{SAMPLE_CONFIG}");
        return Ok(());
    }

    let config_path = match dirs::home_dir() {
        Some(home_dir) => home_dir.join(".config/cartflow/config.yml"),
        None => PathBuf::from("/etc/cartflow/config.yml"),
    };

    if config_path.exists() {
        return Err(format!(
            "config already exists at {}; remove it first or use --stdout",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, SAMPLE_CONFIG)?;
    println!("Wrote sample config to {}", config_path.display());

    Ok(())
}
