use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Entry returned from directory listing
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl Entry {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Trait for local file operations used by the deploy stages
pub trait FileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&self, path: &Path, content: &[u8]) -> Result<()>;
    fn list(&self, dir: &Path) -> Result<Vec<Entry>>;
}

/// Local filesystem implementation
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for LocalFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::internal_io(
                    format!("File not found: {}", path.display()),
                    Some("read file".to_string()),
                )
            } else {
                Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
            }
        })
    }

    fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        // Atomic write: write to temp file, then rename
        let parent = path.parent().ok_or_else(|| {
            Error::internal_io(
                format!("Invalid path: {}", path.display()),
                Some("write file".to_string()),
            )
        })?;

        let filename = path.file_name().ok_or_else(|| {
            Error::internal_io(
                format!("Invalid path: {}", path.display()),
                Some("write file".to_string()),
            )
        })?;

        let tmp_path = parent.join(format!(".{}.tmp", filename.to_string_lossy()));

        fs::write(&tmp_path, content)
            .map_err(|e| Error::internal_io(e.to_string(), Some("write temp file".to_string())))?;

        fs::rename(&tmp_path, path)
            .map_err(|e| Error::internal_io(e.to_string(), Some("rename temp file".to_string())))?;

        Ok(())
    }

    /// Entries sorted by name. A missing directory is an error: the build
    /// output must exist by the time anything lists it.
    fn list(&self, dir: &Path) -> Result<Vec<Entry>> {
        let entries = fs::read_dir(dir).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("list {}", dir.display())))
        })?;

        let mut result = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = path.is_dir();
            result.push(Entry { path, is_dir });
        }
        result.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(result)
    }
}

/// Convenience function to get local filesystem
pub fn local() -> LocalFs {
    LocalFs::new()
}

/// File and directory names directly under `dir`, sorted.
pub fn list_names(dir: &Path) -> Result<Vec<String>> {
    Ok(local().list(dir)?.iter().map(Entry::name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_fs_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.txt");
        let fs = local();

        fs.write(&path, b"hello world").unwrap();
        let content = fs.read(&path).unwrap();
        assert_eq!(content, b"hello world");
    }

    #[test]
    fn test_local_fs_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        local().write(&dir.path().join(".env"), b"A=1\n").unwrap();

        assert_eq!(list_names(dir.path()).unwrap(), vec![".env".to_string()]);
    }

    #[test]
    fn test_list_names_sorted() {
        let dir = tempdir().unwrap();
        let fs = local();

        fs.write(&dir.path().join("b.js"), b"b").unwrap();
        fs.write(&dir.path().join("a.js"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();

        let names = list_names(dir.path()).unwrap();
        assert_eq!(names, vec!["a.js", "assets", "b.js"]);
    }

    #[test]
    fn test_list_missing_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(local().list(&dir.path().join("dist")).is_err());
    }
}
