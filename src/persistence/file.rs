//! JSON file snapshot store.

use crate::persistence::{PersistenceResult, Snapshot, SnapshotStore};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores the latest snapshot as a pretty-printed JSON file.
///
/// Writes go to `<path>.tmp` first and are renamed over the destination after
/// an fsync, so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn write(&self, snapshot: &Snapshot) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let payload = snapshot.to_json_pretty()?;
        let temp = self.temp_path();
        if let Err(e) = replace_with(&temp, &self.path, payload.as_bytes()) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), bytes = payload.len(), "Wrote snapshot file");
        Ok(())
    }

    fn read(&self) -> PersistenceResult<Option<Snapshot>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Snapshot::from_json(&raw).map(Some)
    }
}

/// Writes `payload` to `temp`, fsyncs it and renames it over `dest`.
fn replace_with(temp: &Path, dest: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(temp)?;
    file.write_all(payload)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp, dest)
}
