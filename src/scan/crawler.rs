use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::PathError;
use crate::state::data::{Mtime, PathInfo};

/// Walks a root directory and yields one `PathInfo` per matching regular file.
#[derive(Debug, Clone)]
pub struct Crawler {
    /// Lowercase extensions without the leading dot
    extensions: HashSet<String>,
}

impl Crawler {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// Check if this is a catalog file by extension (case-insensitive)
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| self.extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    /// Start walking `root`. Symlinks are never followed and unreadable
    /// directories are yielded as errors and skipped. The walk stops as
    /// soon as `cancel` is observed.
    pub fn crawl(&self, root: &Path, cancel: &CancelToken) -> Crawl<'_> {
        debug!("Crawling {}", root.display());
        Crawl {
            crawler: self,
            walker: WalkDir::new(root).follow_links(false).into_iter(),
            cancel: cancel.clone(),
            canceled: false,
        }
    }
}

/// Lazy, cancellable stream of discovered files.
pub struct Crawl<'a> {
    crawler: &'a Crawler,
    walker: walkdir::IntoIter,
    cancel: CancelToken,
    canceled: bool,
}

impl Crawl<'_> {
    /// True if the walk ended because cancellation was observed.
    pub fn was_canceled(&self) -> bool {
        self.canceled
    }
}

impl Iterator for Crawl<'_> {
    type Item = Result<PathInfo, PathError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Polled before every entry, so also between directory descents
            if self.canceled || self.cancel.is_canceled() {
                self.canceled = true;
                return None;
            }

            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    return Some(Err(PathError::Walk(err)));
                }
            };

            // Symlinks report their own file type here and are skipped
            if !entry.file_type().is_file() || !self.crawler.accepts(entry.path()) {
                continue;
            }

            return Some(path_info(entry.path(), entry.metadata()));
        }
    }
}

fn path_info(
    path: &Path,
    metadata: Result<std::fs::Metadata, walkdir::Error>,
) -> Result<PathInfo, PathError> {
    let stat_error = |source: std::io::Error| PathError::Stat {
        path: path.to_path_buf(),
        source,
    };

    let metadata = metadata.map_err(|err| {
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("metadata unavailable"));
        stat_error(source)
    })?;
    let modified = metadata.modified().map_err(stat_error)?;

    let key = path
        .to_str()
        .ok_or_else(|| PathError::NotUtf8(path.to_path_buf()))?
        .to_string();

    Ok(PathInfo {
        absolute_path: path.to_path_buf(),
        key,
        size_bytes: metadata.len(),
        mtime: Mtime::from(modified),
    })
}

/// Lowercase an extension and strip a leading dot
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Canonicalize crawl roots, drop the ones that cannot be read and the ones
/// nested inside another root, so that no file is emitted twice per cycle.
pub fn normalize_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut canonical: Vec<PathBuf> = Vec::new();
    for root in roots {
        match std::fs::canonicalize(root) {
            Ok(path) if path.is_dir() => canonical.push(path),
            Ok(path) => warn!("Skipping root {}: not a directory", path.display()),
            Err(err) => warn!("Skipping root {}: {}", root.display(), err),
        }
    }

    canonical.sort();
    canonical.dedup();

    // After sorting, a nested root always follows one of its ancestors
    let mut kept: Vec<PathBuf> = Vec::with_capacity(canonical.len());
    for root in canonical {
        if kept.iter().any(|parent| root.starts_with(parent)) {
            debug!("Dropping nested root {}", root.display());
            continue;
        }
        kept.push(root);
    }
    kept
}
