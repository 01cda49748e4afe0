//! Local directory loader.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::Document;
use crate::error::AppError;

/// Read every regular file under `dir`, recursively, in sorted path order.
///
/// Hidden entries (leading `.`) are skipped, as are files that are not valid
/// UTF-8. A missing directory yields an empty list.
pub fn load_dir(dir: &Path) -> Result<Vec<Document>, AppError> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "document directory missing, nothing to load");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut docs = Vec::with_capacity(files.len());
    for path in files {
        let bytes = fs::read(&path)
            .map_err(|e| AppError::Documents(format!("cannot read {}: {e}", path.display())))?;
        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                warn!(path = %path.display(), "skipping non-UTF-8 file");
                continue;
            }
        };
        if content.trim().is_empty() {
            debug!(path = %path.display(), "skipping empty file");
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative = path.strip_prefix(dir).unwrap_or(&path).to_string_lossy().into_owned();
        let size = content.len();
        docs.push(
            Document::new(file_name.clone(), path.to_string_lossy(), content)
                .with_metadata("file_name", file_name)
                .with_metadata("file_path", relative)
                .with_metadata("file_size", size.to_string()),
        );
    }

    debug!(dir = %dir.display(), count = docs.len(), "loaded local documents");
    Ok(docs)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), AppError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::Documents(format!("cannot list {}: {e}", dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| AppError::Documents(format!("cannot list {}: {e}", dir.display())))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| AppError::Documents(format!("cannot stat {}: {e}", path.display())))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(load_dir(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn walks_recursively_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src/nested")).unwrap();
        fs::write(tmp.path().join("b.md"), "# B").unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        fs::write(tmp.path().join("src/nested/lib.rs"), "fn main() {}").unwrap();

        let docs = load_dir(tmp.path()).unwrap();
        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["a.txt", "b.md", "lib.rs"]);
        assert_eq!(docs[2].metadata["file_path"], "src/nested/lib.rs");
        assert!(docs.iter().all(|d| d.id.is_empty()));
    }

    #[test]
    fn skips_binary_hidden_and_empty_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("logo.bin"), [0xFF, 0xFE, 0x00, 0x9F]).unwrap();
        fs::write(tmp.path().join(".secret"), "token").unwrap();
        fs::write(tmp.path().join("blank.txt"), "   \n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "kept").unwrap();

        let docs = load_dir(tmp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "kept");
    }
}
