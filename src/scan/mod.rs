use sha2::{Digest, Sha256};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("source root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A media file observed on disk, not yet known to be new. Flows from the
/// scanner or watcher into the batch accumulator.
#[derive(Debug, Clone)]
pub struct MediaCandidate {
    pub path: PathBuf,
    pub size: u64,
    pub content_key: String,
    pub modified: SystemTime,
}

impl MediaCandidate {
    pub fn from_metadata(path: PathBuf, meta: &Metadata) -> Self {
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        let size = meta.len();
        let content_key = content_key(&path, size, modified);
        Self {
            path,
            size,
            content_key,
            modified,
        }
    }
}

/// Case-insensitive extension filter for supported image/video formats.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    extensions: Vec<String>,
}

impl MediaFilter {
    /// Extensions are expected lowercase without leading dots
    /// (see `Config::normalized_extensions`).
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    pub fn matches(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

/// Fingerprint over name, size, and mtime. A cheap surrogate for a content
/// hash: distinct files sharing all three will collide, which is acceptable
/// for a duplicate pre-filter.
pub fn content_key(path: &Path, size: u64, modified: SystemTime) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mtime_secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(format!("{}_{}_{}", name, size, mtime_secs).as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Walks the source tree once and returns every matching media file sorted
/// ascending by modification time, so historical catch-up imports in
/// chronological order. Unreadable entries are skipped, never fatal.
pub fn scan_backlog(root: &Path, filter: &MediaFilter) -> Result<Vec<MediaCandidate>, ScanError> {
    if !root.exists() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }

    info!(root = %root.display(), "scanning backlog");

    let mut candidates = Vec::new();
    let mut files_seen: u64 = 0;

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Permission errors and races with concurrent deletion land
                // here. Skip the entry and keep walking.
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        files_seen += 1;
        if files_seen % 500 == 0 {
            info!(files_seen, matched = candidates.len(), "scan in progress");
        }

        if !filter.matches(entry.path()) {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping file, stat failed");
                continue;
            }
        };

        candidates.push(MediaCandidate::from_metadata(
            entry.path().to_path_buf(),
            &meta,
        ));
    }

    // Oldest first, so the destination library receives history in order.
    candidates.sort_by_key(|c| c.modified);

    info!(
        files_seen,
        matched = candidates.len(),
        "backlog scan complete"
    );

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn default_filter() -> MediaFilter {
        MediaFilter::new(vec!["jpg".into(), "heic".into(), "mp4".into()])
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let filter = default_filter();
        assert!(filter.matches(Path::new("/ftp/IMG_0001.JPG")));
        assert!(filter.matches(Path::new("/ftp/clip.Mp4")));
        assert!(!filter.matches(Path::new("/ftp/notes.txt")));
        assert!(!filter.matches(Path::new("/ftp/no_extension")));
    }

    #[test]
    fn test_content_key_depends_on_name_size_mtime() {
        let mtime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let key = content_key(Path::new("/a/img.jpg"), 100, mtime);

        // Same name under a different directory yields the same key.
        assert_eq!(key, content_key(Path::new("/b/img.jpg"), 100, mtime));

        assert_ne!(key, content_key(Path::new("/a/img.jpg"), 101, mtime));
        assert_ne!(
            key,
            content_key(Path::new("/a/img.jpg"), 100, mtime + Duration::from_secs(1))
        );
        assert_ne!(key, content_key(Path::new("/a/other.jpg"), 100, mtime));
    }

    #[test]
    fn test_scan_sorts_by_mtime_not_directory_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        // Names chosen so lexical traversal order differs from mtime order.
        fs::create_dir_all(root.join("nested")).unwrap();
        let newest = root.join("a_newest.jpg");
        let middle = root.join("nested/m_middle.jpg");
        let oldest = root.join("z_oldest.jpg");

        for path in [&newest, &middle, &oldest] {
            fs::write(path, b"data").unwrap();
        }

        let base = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&oldest, base);
        set_mtime(&middle, base + Duration::from_secs(60));
        set_mtime(&newest, base + Duration::from_secs(120));

        let candidates = scan_backlog(root, &default_filter()).unwrap();
        let paths: Vec<_> = candidates.iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec![oldest, middle, newest]);
    }

    #[test]
    fn test_scan_filters_unsupported_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.heic"), b"x").unwrap();
        fs::write(dir.path().join("skip.txt"), b"x").unwrap();

        let candidates = scan_backlog(dir.path(), &default_filter()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].path.ends_with("keep.heic"));
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let err = scan_backlog(Path::new("/nonexistent/camsync-root"), &default_filter())
            .unwrap_err();
        assert!(matches!(err, ScanError::MissingRoot(_)));
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
        drop(file);
    }
}
