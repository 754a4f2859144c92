use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::results::types::{ResultRecord, StoreError, StoreResult};

/// A flat directory of result record files
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Open an existing results directory
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        let metadata = fs::metadata(&dir).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StoreError::MissingDirectory(dir.clone()),
            _ => StoreError::Io {
                path: dir.clone(),
                source,
            },
        })?;
        if !metadata.is_dir() {
            return Err(StoreError::NotADirectory(dir));
        }
        Ok(Self { dir })
    }

    /// Resolve a file name inside the results directory
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// List every readable record file, in file name order
    pub fn load_all(&self) -> StoreResult<Vec<ResultRecord>> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && path.extension().map(|e| e == "json").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => debug!("skipping {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }

    /// Records whose status is failed or broken; malformed files are skipped
    pub fn discover(&self) -> StoreResult<Vec<ResultRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|record| record.status().is_analyzable())
            .collect())
    }

    /// Overwrite the record's originating file with its current content
    pub fn persist(&self, record: &ResultRecord) -> StoreResult<()> {
        let text = record.to_pretty_json()?;
        write_atomic(record.path(), text.as_bytes())
    }
}

fn read_record(path: &Path) -> StoreResult<ResultRecord> {
    let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ResultRecord::parse(path, &text)
}

/// Write `bytes` to a sibling temp file, then rename it over `path`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, bytes).map_err(io_err)?;
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(source));
    }
    Ok(())
}
