//! File backend: one JSON file per key in a directory.
//!
//! File names are the hex SHA-256 of the key, so any key maps to a valid,
//! fixed-length name. Writes go through a temp file and a rename.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::Result;
use crate::persistence::PersistenceBackend;

const RECORD_EXT: &str = "json";

/// Directory-backed record store.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (creating if needed) a record directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), RECORD_EXT))
    }
}

impl PersistenceBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn load_all(&self) -> Result<Vec<String>> {
        let mut bodies = Vec::new();
        for item in fs::read_dir(&self.dir)? {
            let path = match item {
                Ok(item) => item.path(),
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(body) => bodies.push(body),
                Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        Ok(bodies)
    }

    fn save(&self, key: &str, body: &str) -> Result<()> {
        let path = self.record_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<()> {
        for item in fs::read_dir(&self.dir)? {
            let path = item?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if ext == Some(RECORD_EXT) || ext == Some("tmp") {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_dir;

    #[test]
    fn test_file_backend_crud() {
        let dir = test_dir("file-crud");
        let backend = FileBackend::open(&dir).unwrap();

        backend.save("quotes:7203", "{\"a\":1}").unwrap();
        backend.save("quotes/9984?range=1y", "{\"b\":2}").unwrap();
        backend.save("quotes:7203", "{\"a\":3}").unwrap();

        let mut bodies = backend.load_all().unwrap();
        bodies.sort();
        assert_eq!(bodies, vec!["{\"a\":3}", "{\"b\":2}"]);

        backend.remove("quotes:7203").unwrap();
        backend.remove("quotes:7203").unwrap();
        assert_eq!(backend.load_all().unwrap().len(), 1);

        backend.clear().unwrap();
        assert!(backend.load_all().unwrap().is_empty());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_file_backend_ignores_foreign_files() {
        let dir = test_dir("file-foreign");
        let backend = FileBackend::open(&dir).unwrap();
        fs::write(dir.join("notes.txt"), "hello").unwrap();

        backend.save("k", "body").unwrap();
        assert_eq!(backend.load_all().unwrap(), vec!["body"]);

        backend.clear().unwrap();
        assert!(dir.join("notes.txt").exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_long_keys_get_fixed_length_names() {
        let dir = test_dir("file-long");
        let backend = FileBackend::open(&dir).unwrap();
        let key = "k".repeat(1000);

        backend.save(&key, "body").unwrap();
        let name = backend.record_path(&key);
        assert_eq!(name.file_stem().unwrap().len(), 64);

        let _ = fs::remove_dir_all(dir);
    }
}
