use crate::errors::MimicError;
use crate::fingerprint::Fingerprint;
use crate::runtime::FileSystem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Flat directory of `<fingerprint>.<ext>` files.
///
/// The vault directory is created on the first write and may be absent
/// before that. There is no index file and no locking: one test process is
/// expected to own the directory for the duration of a run.
#[derive(Clone)]
pub struct RecordingStore {
    fs: Arc<dyn FileSystem>,
    vault: PathBuf,
    extension: String,
}

impl RecordingStore {
    pub fn new(fs: Arc<dyn FileSystem>, vault: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            fs,
            vault: vault.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn path_for(&self, key: &Fingerprint) -> PathBuf {
        self.vault.join(format!("{key}.{}", self.extension))
    }

    pub fn exists(&self, key: &Fingerprint) -> bool {
        self.fs.exists(&self.path_for(key))
    }

    pub fn read(&self, key: &Fingerprint) -> Result<Vec<u8>, MimicError> {
        let path = self.path_for(key);
        if !self.fs.exists(&path) {
            return Err(MimicError::RecordingNotFound(key.to_string()));
        }
        self.fs
            .read_bytes(&path)
            .map_err(|e| e.into_persistence(&format!("read recording {key}")))
    }

    pub fn write(&self, key: &Fingerprint, bytes: &[u8]) -> Result<(), MimicError> {
        self.fs
            .create_dir_all(&self.vault)
            .map_err(|e| e.into_persistence(&format!("create vault {}", self.vault.display())))?;
        self.fs
            .write_bytes(&self.path_for(key), bytes)
            .map_err(|e| e.into_persistence(&format!("write recording {key}")))
    }

    /// Returns whether a recording was removed.
    pub fn delete(&self, key: &Fingerprint) -> Result<bool, MimicError> {
        let path = self.path_for(key);
        if !self.fs.exists(&path) {
            return Ok(false);
        }
        self.fs
            .remove_file(&path)
            .map_err(|e| e.into_persistence(&format!("delete recording {key}")))?;
        Ok(true)
    }

    pub fn enumerate(&self) -> Result<Vec<Fingerprint>, MimicError> {
        if !self.fs.is_dir(&self.vault) {
            return Ok(Vec::new());
        }
        let files = self
            .fs
            .list_files(&self.vault)
            .map_err(|e| e.into_persistence(&format!("list vault {}", self.vault.display())))?;
        let mut keys = files
            .iter()
            .filter_map(|path| self.recording_key(path))
            .collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }

    /// The fingerprint of `path` if it names a recording file.
    fn recording_key(&self, path: &Path) -> Option<Fingerprint> {
        if path.extension().and_then(|ext| ext.to_str()) != Some(self.extension.as_str()) {
            return None;
        }
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(Fingerprint::parse)
    }

    /// Removes every file in the vault and then the vault directory.
    /// Returns how many of the removed files were recordings.
    pub fn clear_all(&self) -> Result<usize, MimicError> {
        if !self.fs.is_dir(&self.vault) {
            return Ok(0);
        }
        let context = format!("clear vault {}", self.vault.display());
        let files = self
            .fs
            .list_files(&self.vault)
            .map_err(|e| e.into_persistence(&context))?;
        let mut recordings = 0;
        for file in &files {
            self.fs
                .remove_file(file)
                .map_err(|e| e.into_persistence(&context))?;
            if self.recording_key(file).is_some() {
                recordings += 1;
            }
        }
        self.fs
            .remove_dir(&self.vault)
            .map_err(|e| e.into_persistence(&context))?;
        Ok(recordings)
    }
}
