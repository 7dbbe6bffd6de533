use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MimicError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("invalid function path: {0}")]
    InvalidFunctionPath(String),
    #[error(
        "missing mimic recording for function call {function} with fingerprint {fingerprint}.\n\
         Enable record mode (set MIMIC_RECORD=1 or `[record] enabled = true`) to record responses."
    )]
    MissingRecording {
        function: String,
        fingerprint: String,
    },
    #[error(
        "running function {function} has mutated its inputs.\n\
         Mimicking must not be used on functions that mutate their arguments."
    )]
    MutatedInput { function: String },
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("recording not found: {0}")]
    RecordingNotFound(String),
    #[error("unsafe interception: {0}")]
    UnsafeInterception(String),
    #[error("{count} unused mimic recording(s) in {}", vault.display())]
    UnusedRecordings { count: usize, vault: PathBuf },
}

impl MimicError {
    /// Re-labels an I/O failure as a persistence failure for recording access.
    pub(crate) fn into_persistence(self, context: &str) -> Self {
        match self {
            Self::Io(message) => Self::Persistence(format!("{context}: {message}")),
            other => other,
        }
    }
}
