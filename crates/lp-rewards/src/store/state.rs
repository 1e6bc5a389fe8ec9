use crate::{
    calculator::{allocation::PayoutMap, loyalty::LoyaltySnapshot},
    ingestor::types::Address,
};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Cumulative payouts of every sub-period up to `end_timestamp`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeReport {
    pub end_timestamp: i64,
    pub payouts: PayoutMap,
}

/// Engine state persisted between runs.
///
/// Layout below the state directory:
/// - `loyalty/<pool>/<end_block>.json`
/// - `cumulative/<end_timestamp>.json`
///
/// An unreadable record is an error; runs never silently start over.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stack_path(&self, pool: &Address, end_block: u64) -> PathBuf {
        self.dir
            .join("loyalty")
            .join(pool.to_string())
            .join(format!("{end_block}.json"))
    }

    fn cumulative_path(&self, end_timestamp: i64) -> PathBuf {
        self.dir
            .join("cumulative")
            .join(format!("{end_timestamp}.json"))
    }

    pub fn save_stacks(&self, snapshot: &LoyaltySnapshot) -> Result<()> {
        let path = self.stack_path(&snapshot.pool, snapshot.end_block);
        write_atomic(&path, snapshot)?;
        info!(
            "Saved loyalty stacks of pool {} at block {} ({} holders)",
            snapshot.pool,
            snapshot.end_block,
            snapshot.stacks.len()
        );
        Ok(())
    }

    /// Stacks saved for `pool` at `end_block`, if any
    pub fn load_stacks(&self, pool: &Address, end_block: u64) -> Result<Option<LoyaltySnapshot>> {
        let path = self.stack_path(pool, end_block);
        let Some(snapshot) = read_json::<LoyaltySnapshot>(&path)? else {
            debug!("No loyalty stacks for pool {} at block {}", pool, end_block);
            return Ok(None);
        };
        ensure!(
            snapshot.pool == *pool && snapshot.end_block == end_block,
            "Loyalty snapshot {path:?} is keyed ({}, {}) but stored as ({pool}, {end_block})",
            snapshot.pool,
            snapshot.end_block
        );
        Ok(Some(snapshot))
    }

    /// End blocks with saved stacks for `pool`, ascending
    pub fn stack_blocks(&self, pool: &Address) -> Result<Vec<u64>> {
        let dir = self.dir.join("loyalty").join(pool.to_string());
        list_keys(&dir)
    }

    pub fn save_cumulative(&self, report: &CumulativeReport) -> Result<()> {
        let path = self.cumulative_path(report.end_timestamp);
        write_atomic(&path, report)?;
        info!(
            "Saved cumulative report at {} ({} addresses)",
            report.end_timestamp,
            report.payouts.len()
        );
        Ok(())
    }

    pub fn load_cumulative(&self, end_timestamp: i64) -> Result<Option<CumulativeReport>> {
        read_json(&self.cumulative_path(end_timestamp))
    }

    /// Most recent cumulative report strictly before `end_timestamp`
    pub fn latest_cumulative_before(&self, end_timestamp: i64) -> Result<Option<CumulativeReport>> {
        let keys: Vec<i64> = list_keys(&self.dir.join("cumulative"))?;
        match keys.into_iter().filter(|ts| *ts < end_timestamp).next_back() {
            Some(ts) => self.load_cumulative(ts),
            None => Ok(None),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read state file: {path:?}"))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("State file is corrupted: {path:?}"))?;
    Ok(Some(value))
}

/// Sorted numeric file stems of the `.json` files in `dir`
fn list_keys<K: std::str::FromStr + Ord>(dir: &Path) -> Result<Vec<K>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {dir:?}"))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(key) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
        {
            keys.push(key);
        }
    }
    keys.sort();
    Ok(keys)
}

/// Write `value` as pretty JSON via a synced temp file and a rename
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {parent:?}"))?;
    }

    let contents = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
    let temp_path = path.with_extension("json.tmp");

    {
        let mut temp_file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {temp_path:?}"))?;

        temp_file
            .write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to temp file: {temp_path:?}"))?;

        temp_file
            .sync_all()
            .with_context(|| format!("Failed to sync temp file: {temp_path:?}"))?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {temp_path:?} to {path:?}"))?;

    debug!("Saved state atomically to {:?}", path);
    Ok(())
}
