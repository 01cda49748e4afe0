//! The data directory that uploaded files are saved into.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| AppError::Documents(format!("cannot create {}: {e}", self.dir.display())))
    }

    /// Write `bytes` under the final component of `file_name`, replacing any
    /// file of the same name. Returns the stored path.
    pub fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
        let name = sanitize_file_name(file_name)
            .ok_or_else(|| AppError::Documents(format!("invalid upload file name: {file_name:?}")))?;
        self.ensure()?;
        let path = self.dir.join(name);
        fs::write(&path, bytes)
            .map_err(|e| AppError::Documents(format!("cannot write {}: {e}", path.display())))?;
        info!(path = %path.display(), bytes = bytes.len(), "saved upload");
        Ok(path)
    }

    /// Sorted names of the files directly in the data directory.
    pub fn list(&self) -> Result<Vec<String>, AppError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| AppError::Documents(format!("cannot list {}: {e}", self.dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(|e| AppError::Documents(format!("cannot list uploads: {e}")))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove the data directory with everything in it, then recreate it empty.
    pub fn clear(&self) -> Result<(), AppError> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .map_err(|e| AppError::Documents(format!("cannot remove {}: {e}", self.dir.display())))?;
        }
        self.ensure()?;
        info!(dir = %self.dir.display(), "cleared data directory");
        Ok(())
    }
}

/// Final path component of a browser-supplied name, or `None` if nothing
/// usable remains. Both `/` and `\` count as separators.
fn sanitize_file_name(file_name: &str) -> Option<&str> {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_keeps_final_component() {
        assert_eq!(sanitize_file_name("notes.md"), Some("notes.md"));
        assert_eq!(sanitize_file_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\Users\\me\\main.rs"), Some("main.rs"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name(""), None);
    }

    #[test]
    fn save_then_list() {
        let tmp = TempDir::new().unwrap();
        let store = UploadStore::new(tmp.path().join("data"));
        store.save("b.txt", b"bee").unwrap();
        let path = store.save("../a.txt", b"ay").unwrap();
        assert_eq!(path, tmp.path().join("data/a.txt"));
        assert_eq!(store.list().unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn save_rejects_empty_names() {
        let tmp = TempDir::new().unwrap();
        let store = UploadStore::new(tmp.path());
        assert!(matches!(store.save("..", b"x"), Err(AppError::Documents(_))));
    }

    #[test]
    fn clear_recreates_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let store = UploadStore::new(tmp.path().join("data"));
        store.save("x.md", b"# x").unwrap();
        fs::create_dir_all(store.dir().join("sub")).unwrap();

        store.clear().unwrap();
        assert!(store.dir().is_dir());
        assert!(fs::read_dir(store.dir()).unwrap().next().is_none());
    }
}
