use std::path::{Path, PathBuf};

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use crate::config::Aggregation;
use crate::declaration::Declaration;
use crate::error::{Error, Result};
use crate::types::Verified;
use crate::validator::Validator;

/// Result of checking a single file.
#[derive(Debug)]
pub struct FileReport<T = Verified> {
    pub path: PathBuf,
    pub result: Result<T>,
}

/// Results of a run over many files, sorted by path.
#[derive(Debug)]
pub struct BatchReport<T = Verified> {
    pub reports: Vec<FileReport<T>>,
}

impl<T> BatchReport<T> {
    fn new(mut reports: Vec<FileReport<T>>) -> Self {
        reports.sort_by(|a, b| a.path.cmp(&b.path));
        Self { reports }
    }

    /// Number of files that were checked.
    pub fn checked(&self) -> usize {
        self.reports.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &Error)> {
        self.reports
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (r.path.as_path(), e)))
    }

    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.result.is_ok())
    }
}

/// Regular, non-hidden files directly inside `dir`, sorted by path.
pub async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_err = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let file_type = entry.file_type().await.map_err(io_err)?;
        if hidden || !file_type.is_file() {
            debug!(path = %entry.path().display(), "skipping directory entry");
            continue;
        }
        files.push(entry.path());
    }

    files.sort();
    Ok(files)
}

/// Validates every declaration file in `dir` concurrently.
///
/// With [`Aggregation::FailFast`] the run stops at the first failure and
/// validations still in flight are dropped; the report then holds only the
/// files that finished.
pub async fn validate_dir(
    validator: &Validator,
    dir: &Path,
    aggregation: Aggregation,
) -> Result<BatchReport> {
    let files = list_files(dir).await?;

    let mut pending: FuturesUnordered<_> = files
        .into_iter()
        .map(|path| async move {
            let result = validator.validate_file(&path).await;
            FileReport { path, result }
        })
        .collect();

    let mut reports = Vec::new();
    while let Some(report) = pending.next().await {
        let failed = report.result.is_err();
        if let Err(e) = &report.result {
            warn!(path = %report.path.display(), error = %e, "validation failed");
        }
        reports.push(report);
        if failed && aggregation == Aggregation::FailFast {
            break;
        }
    }

    Ok(BatchReport::new(reports))
}

/// Checks that no file outside the key directory declares a key.
///
/// Every non-hidden top-level file in `root` whose name is not in
/// `allow_list` is parsed; files that parse as a mapping with a `name` or
/// `fingerprint` field fail with [`Error::MisplacedKey`]. Files that are not
/// YAML at all, or cannot be read as text, are not keys.
pub async fn scan_misplaced(root: &Path, allow_list: &[String]) -> Result<BatchReport<()>> {
    let files = list_files(root).await?;

    let mut reports = Vec::new();
    for path in files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if allow_list.iter().any(|allowed| allowed == &file_name) {
            debug!(file = %file_name, "allow-listed");
            continue;
        }

        let result = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match Declaration::parse(&text) {
                Some(decl) if decl.looks_like_key() => Err(Error::MisplacedKey {
                    file: path.display().to_string(),
                }),
                _ => Ok(()),
            },
            Err(e) => {
                debug!(file = %file_name, error = %e, "not a text file");
                Ok(())
            }
        };
        reports.push(FileReport { path, result });
    }

    Ok(BatchReport::new(reports))
}
