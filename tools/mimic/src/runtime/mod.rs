use crate::errors::MimicError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, MimicError>;
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, MimicError>;
    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), MimicError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), MimicError>;
    fn remove_file(&self, path: &Path) -> Result<(), MimicError>;
    fn remove_dir(&self, path: &Path) -> Result<(), MimicError>;
    /// Regular files directly inside `path`. Missing directory is an error.
    fn list_files(&self, path: &Path) -> Result<Vec<PathBuf>, MimicError>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), MimicError> {
        self.write_bytes(path, contents.as_bytes())
    }
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), MimicError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, MimicError> {
        std::fs::read_to_string(path).map_err(|e| MimicError::Io(e.to_string()))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, MimicError> {
        std::fs::read(path).map_err(|e| MimicError::Io(e.to_string()))
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), MimicError> {
        std::fs::write(path, contents).map_err(|e| MimicError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), MimicError> {
        std::fs::create_dir_all(path).map_err(|e| MimicError::Io(e.to_string()))
    }

    fn remove_file(&self, path: &Path) -> Result<(), MimicError> {
        std::fs::remove_file(path).map_err(|e| MimicError::Io(e.to_string()))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), MimicError> {
        std::fs::remove_dir(path).map_err(|e| MimicError::Io(e.to_string()))
    }

    fn list_files(&self, path: &Path) -> Result<Vec<PathBuf>, MimicError> {
        let mut files = std::fs::read_dir(path)
            .map_err(|e| MimicError::Io(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), MimicError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| MimicError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory file system. Directories are tracked explicitly so vault
/// creation and removal can be asserted.
#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
    dirs: Arc<Mutex<BTreeSet<PathBuf>>>,
    fail_next: Arc<Mutex<Option<MimicError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs.insert_dirs(parent);
        }
        fs.files
            .lock()
            .expect("files lock")
            .insert(path, contents.into().into_bytes());
        fs
    }

    pub fn set_fail_next(&self, error: MimicError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.lock().expect("files lock").keys().cloned().collect()
    }

    fn maybe_fail(&self) -> Result<(), MimicError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }

    fn insert_dirs(&self, path: &Path) {
        let mut dirs = self.dirs.lock().expect("dirs lock");
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, MimicError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|e| MimicError::Io(e.to_string()))
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, MimicError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| MimicError::Io(format!("missing file {}", path.display())))
    }

    fn write_bytes(&self, path: &Path, contents: &[u8]) -> Result<(), MimicError> {
        self.maybe_fail()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.is_dir(parent) {
                return Err(MimicError::Io(format!(
                    "missing directory {}",
                    parent.display()
                )));
            }
        }
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), MimicError> {
        self.maybe_fail()?;
        self.insert_dirs(path);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), MimicError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| MimicError::Io(format!("missing file {}", path.display())))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), MimicError> {
        self.maybe_fail()?;
        let occupied = self
            .files
            .lock()
            .expect("files lock")
            .keys()
            .any(|file| file.starts_with(path));
        if occupied {
            return Err(MimicError::Io(format!(
                "directory not empty {}",
                path.display()
            )));
        }
        let mut dirs = self.dirs.lock().expect("dirs lock");
        if !dirs.remove(path) {
            return Err(MimicError::Io(format!("missing directory {}", path.display())));
        }
        dirs.retain(|dir| !dir.starts_with(path));
        Ok(())
    }

    fn list_files(&self, path: &Path) -> Result<Vec<PathBuf>, MimicError> {
        self.maybe_fail()?;
        if !self.is_dir(path) {
            return Err(MimicError::Io(format!("missing directory {}", path.display())));
        }
        Ok(self
            .files
            .lock()
            .expect("files lock")
            .keys()
            .filter(|file| file.parent() == Some(path))
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path) || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().expect("dirs lock").contains(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), MimicError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FakeFileSystem, FileSystem};
    use std::path::Path;

    #[test]
    fn fake_fs_refuses_writes_into_missing_directories() {
        let fs = FakeFileSystem::default();
        let err = fs
            .write_bytes(Path::new("/vault/a.json"), b"1")
            .expect_err("missing parent");
        assert!(err.to_string().contains("missing directory /vault"));

        fs.create_dir_all(Path::new("/vault")).expect("mkdir");
        fs.write_bytes(Path::new("/vault/a.json"), b"1").expect("write");
        assert_eq!(
            fs.list_files(Path::new("/vault")).expect("list"),
            vec![Path::new("/vault/a.json").to_path_buf()]
        );
    }

    #[test]
    fn fake_fs_remove_dir_requires_empty_directory() {
        let fs = FakeFileSystem::default();
        fs.create_dir_all(Path::new("/vault")).expect("mkdir");
        fs.write_bytes(Path::new("/vault/a.json"), b"1").expect("write");
        assert!(fs.remove_dir(Path::new("/vault")).is_err());

        fs.remove_file(Path::new("/vault/a.json")).expect("rm");
        fs.remove_dir(Path::new("/vault")).expect("rmdir");
        assert!(!fs.is_dir(Path::new("/vault")));
        assert!(fs.is_dir(Path::new("/")));
    }
}
