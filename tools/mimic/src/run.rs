//! End-of-run handling of recordings nobody looked up.

use crate::codec::PayloadCodec;
use crate::errors::MimicError;
use crate::fingerprint::Fingerprint;
use crate::interceptor::Mimic;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedPolicy {
    /// Write the unused fingerprints here as JSON.
    pub report_path: Option<PathBuf>,
    /// Delete unused recordings.
    pub clean: bool,
    /// Fail the run when any recording was unused.
    pub fail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub vault: PathBuf,
    pub total: usize,
    pub unused: Vec<Fingerprint>,
    pub removed: usize,
}

impl<C: PayloadCodec> Mimic<C> {
    /// Recordings in the vault that were not looked up since the last reset.
    pub fn unused_recordings(&self) -> Result<Vec<Fingerprint>, MimicError> {
        let all = self.store().enumerate()?;
        Ok(self.usage().unused(&all))
    }

    /// Deletes unused recordings; returns how many were removed.
    pub fn clear_unused_recordings(&self) -> Result<usize, MimicError> {
        let unused = self.unused_recordings()?;
        let removed = self.usage().clear(&unused, self.store())?;
        self.log(
            "info",
            "unused_cleaned",
            json!({ "vault": self.store().vault().display().to_string(), "removed": removed }),
        );
        Ok(removed)
    }

    pub fn reset_usage(&self) {
        self.usage().reset();
    }

    /// Applies `policy` at the end of a run. Cleaning happens before the
    /// fail check, so a run that both cleans and fails still prunes.
    pub fn finish_run(
        &self,
        policy: &UnusedPolicy,
        fs: &dyn FileSystem,
    ) -> Result<RunReport, MimicError> {
        let all = self.store().enumerate()?;
        let unused = self.usage().unused(&all);
        let vault = self.store().vault().to_path_buf();

        if let Some(path) = &policy.report_path {
            write_report(fs, path, &unused)?;
            self.log(
                "info",
                "unused_report",
                json!({ "path": path.display().to_string(), "unused": unused.len() }),
            );
        }

        let removed = if policy.clean {
            let removed = self.usage().clear(&unused, self.store())?;
            self.log(
                "info",
                "unused_cleaned",
                json!({ "vault": vault.display().to_string(), "removed": removed }),
            );
            removed
        } else {
            0
        };

        if policy.fail && !unused.is_empty() {
            return Err(MimicError::UnusedRecordings {
                count: unused.len(),
                vault,
            });
        }

        Ok(RunReport {
            vault,
            total: all.len(),
            unused,
            removed,
        })
    }
}

fn write_report(
    fs: &dyn FileSystem,
    path: &std::path::Path,
    unused: &[Fingerprint],
) -> Result<(), MimicError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs.create_dir_all(parent)?;
        }
    }
    let body = serde_json::to_string_pretty(&json!({ "unused": unused }))
        .map_err(|e| MimicError::Io(e.to_string()))?;
    fs.write_string(path, &body)
}
