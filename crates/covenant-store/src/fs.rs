use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, StoreError};

/// Low-level, retrying, atomic-rename file I/O rooted at a base directory.
/// Every other module in this crate goes through here rather than touching
/// `std::fs` directly, so retry/backoff policy lives in exactly one place.
#[derive(Debug, Clone)]
pub struct FileTree {
    base_dir: PathBuf,
    max_retries: u32,
    backoff_base: f64,
}

impl FileTree {
    pub fn new(base_dir: impl Into<PathBuf>, max_retries: u32, backoff_base: f64) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_retries,
            backoff_base,
        }
    }

    fn full_path(&self, rel: &str) -> PathBuf {
        self.base_dir.join(rel)
    }

    pub fn read_file(&self, rel: &str) -> Result<Option<String>> {
        let full = self.full_path(rel);
        match std::fs::read_to_string(&full) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %full.display(), "file not found");
                Ok(None)
            }
            Err(e) => Err(StoreError::Io {
                path: full.display().to_string(),
                source: e,
            }),
        }
    }

    /// Write content to `rel`, retrying with exponential backoff on
    /// transient I/O failure. Uses a temp-file-then-rename so a reader never
    /// observes a partially written file.
    pub fn write_file(&self, rel: &str, content: &str) -> Result<()> {
        let full = self.full_path(rel);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        self.retry(&full, || self.write_once(&full, content))
    }

    /// Writes several files as one unit: every temp file is staged first,
    /// and only once all of them have landed does the rename pass begin.
    /// Narrows the crash window between sibling writes that must agree with
    /// each other (a contract's `current` file and its version snapshot)
    /// compared to writing each one through a separate `write_file` call.
    pub fn write_batch(&self, files: &[(&str, &str)]) -> Result<()> {
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
        for (rel, content) in files {
            let full = self.full_path(rel);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    path: parent.display().to_string(),
                    source: e,
                })?;
            }
            let tmp = Self::tmp_path(&full);
            self.retry(&full, || std::fs::write(&tmp, content))?;
            staged.push((tmp, full));
        }
        for (tmp, full) in &staged {
            self.retry(full, || std::fs::rename(tmp, full))?;
        }
        Ok(())
    }

    fn tmp_path(full: &Path) -> PathBuf {
        full.with_extension(format!(
            "{}.tmp-{}",
            full.extension().and_then(|e| e.to_str()).unwrap_or(""),
            std::process::id()
        ))
    }

    fn write_once(&self, full: &Path, content: &str) -> std::io::Result<()> {
        let tmp = Self::tmp_path(full);
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, full)
    }

    /// Runs `op` up to `max_retries + 1` times with exponential backoff,
    /// reporting failures against `path_for_err` (which may be a temp path
    /// mid-batch rather than the file's final name).
    fn retry(&self, path_for_err: &Path, mut op: impl FnMut() -> std::io::Result<()>) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match op() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(path = %path_for_err.display(), attempt, error = %e, "write attempt failed");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        let delay_ms =
                            (self.backoff_base * 2f64.powi(attempt as i32) * 1000.0) as u64;
                        std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        Err(StoreError::WriteExhausted {
            path: path_for_err.display().to_string(),
            attempts: self.max_retries + 1,
            source: last_err.expect("loop always sets last_err before exiting"),
        })
    }

    pub fn append_jsonl(&self, rel: &str, line: &serde_json::Value) -> Result<()> {
        let full = self.full_path(rel);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let serialized = serde_json::to_string(line).map_err(|e| StoreError::Json {
            path: full.display().to_string(),
            source: e,
        })?;
        use std::io::Write;
        let mut attempt = 0;
        loop {
            let result = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&full)
                .and_then(|mut f| writeln!(f, "{serialized}"));
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms =
                        (self.backoff_base * 2f64.powi(attempt as i32) * 1000.0) as u64;
                    std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                    let _ = e;
                }
                Err(e) => {
                    return Err(StoreError::WriteExhausted {
                        path: full.display().to_string(),
                        attempts: attempt + 1,
                        source: e,
                    })
                }
            }
        }
    }

    pub fn read_jsonl(&self, rel: &str) -> Result<Vec<serde_json::Value>> {
        let Some(content) = self.read_file(rel)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(v) => out.push(v),
                Err(e) => {
                    tracing::error!(path = rel, error = %e, "invalid JSONL line, skipping");
                }
            }
        }
        Ok(out)
    }

    pub fn read_json<T: serde::de::DeserializeOwned>(&self, rel: &str) -> Result<Option<T>> {
        let Some(content) = self.read_file(rel)? else {
            return Ok(None);
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Json {
                path: rel.to_string(),
                source: e,
            })
    }

    pub fn write_json<T: serde::Serialize>(&self, rel: &str, value: &T) -> Result<()> {
        let serialized = serde_json::to_string_pretty(value).map_err(|e| StoreError::Json {
            path: rel.to_string(),
            source: e,
        })?;
        self.write_file(rel, &serialized)
    }

    pub fn list_dir_stems(&self, rel_dir: &str, suffix: &str) -> Result<Vec<String>> {
        let full = self.full_path(rel_dir);
        let entries = match std::fs::read_dir(&full) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: full.display().to_string(),
                    source: e,
                })
            }
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io {
                path: full.display().to_string(),
                source: e,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(suffix) {
                    out.push(stem.to_string());
                }
            }
        }
        Ok(out)
    }

    pub fn sha256(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FileTree::new(dir.path(), 3, 0.0);
        tree.write_file("a/b.md", "hello").unwrap();
        assert_eq!(tree.read_file("a/b.md").unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FileTree::new(dir.path(), 3, 0.0);
        assert!(tree.read_file("nope.md").unwrap().is_none());
    }

    #[test]
    fn write_batch_lands_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FileTree::new(dir.path(), 3, 0.0);
        tree.write_batch(&[("current.md", "v2"), ("versions/v2.md", "v2"), ("versions/v1_prev.md", "v1")])
            .unwrap();
        assert_eq!(tree.read_file("current.md").unwrap().as_deref(), Some("v2"));
        assert_eq!(tree.read_file("versions/v2.md").unwrap().as_deref(), Some("v2"));
        assert_eq!(tree.read_file("versions/v1_prev.md").unwrap().as_deref(), Some("v1"));
    }

    #[test]
    fn jsonl_append_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FileTree::new(dir.path(), 3, 0.0);
        tree.append_jsonl("x.jsonl", &serde_json::json!({"n": 1}))
            .unwrap();
        tree.append_jsonl("x.jsonl", &serde_json::json!({"n": 2}))
            .unwrap();
        let lines = tree.read_jsonl("x.jsonl").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["n"], 1);
        assert_eq!(lines[1]["n"], 2);
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(FileTree::sha256("abc"), FileTree::sha256("abc"));
        assert_ne!(FileTree::sha256("abc"), FileTree::sha256("abd"));
    }
}
