//! Dry-run driver: one reconciliation batch against a JSON store snapshot.
//!
//! Inputs come from the environment:
//!
//! - `BINSYNC_CONFIG`: JSON config file (otherwise defaults + `BINSYNC_*` overrides)
//! - `BINSYNC_SNAPSHOT`: snapshot to load, unless given as the first argument
//! - `BINSYNC_SNAPSHOT_OUT`: where to write the store contents after the batch

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use binsync_infra::{
    BatchExecutor, BatchSummary, InMemoryRecordStore, ReconcileConfig, StoreSnapshot,
};

/// Resolved inputs of one runner invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: ReconcileConfig,
    pub snapshot: PathBuf,
    pub snapshot_out: Option<PathBuf>,
}

impl RunOptions {
    /// Build options from the process environment; `snapshot_arg` wins over `BINSYNC_SNAPSHOT`.
    pub fn from_env(snapshot_arg: Option<String>) -> Result<Self> {
        Self::from_lookup(snapshot_arg, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(snapshot_arg: Option<String>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = match lookup("BINSYNC_CONFIG") {
            Some(path) => load_config(Path::new(&path))?,
            None => ReconcileConfig::default().with_env_overrides(&lookup)?,
        };

        let snapshot = snapshot_arg
            .or_else(|| lookup("BINSYNC_SNAPSHOT"))
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("no snapshot given (pass a path or set BINSYNC_SNAPSHOT)"))?;

        Ok(Self {
            config,
            snapshot,
            snapshot_out: lookup("BINSYNC_SNAPSHOT_OUT").map(PathBuf::from),
        })
    }
}

pub fn load_config(path: &Path) -> Result<ReconcileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = ReconcileConfig::from_json_str(&raw)
        .with_context(|| format!("loading config {}", path.display()))?;
    Ok(config)
}

pub fn load_snapshot(path: &Path) -> Result<StoreSnapshot> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {}", path.display()))
}

/// Run one batch and optionally persist the resulting store contents.
pub fn run(options: &RunOptions) -> Result<BatchSummary> {
    let snapshot = load_snapshot(&options.snapshot)?;
    info!(
        snapshot = %options.snapshot.display(),
        items = snapshot.items.len(),
        rules = snapshot.rules.len(),
        "snapshot loaded"
    );

    let store = InMemoryRecordStore::from_snapshot(snapshot);
    let summary = BatchExecutor::new(&store, options.config.clone()).run();

    if let Some(out) = &options.snapshot_out {
        let json = serde_json::to_string_pretty(&store.snapshot())?;
        fs::write(out, json).with_context(|| format!("writing snapshot {}", out.display()))?;
        info!(path = %out.display(), "snapshot written");
    }

    Ok(summary)
}
