use crate::errors::MimicError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Append-only JSONL event log for vault activity.
///
/// The live file stays under `budget_bytes`: when the next line would not
/// fit, the file is first moved to `<name>.old`, replacing the previous
/// rotation.
#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), MimicError> {
        let mut line = self.render(event)?;
        line.push('\n');
        let mut file = self.open_with_room(line.len() as u64)?;
        file.write_all(line.as_bytes())
            .map_err(|e| MimicError::Io(e.to_string()))
    }

    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".old");
        self.path.with_file_name(name)
    }

    fn render(&self, event: &LogEvent<'_>) -> Result<String, MimicError> {
        serde_json::to_string(&LogEvent {
            payload: truncate_json(&event.payload, self.max_payload_bytes),
            ..event.clone()
        })
        .map_err(|e| MimicError::Io(e.to_string()))
    }

    /// Opens the log for appending `incoming` bytes, rotating first if the
    /// live file would exceed the budget. A line larger than the whole
    /// budget still goes into a fresh file.
    fn open_with_room(&self, incoming: u64) -> Result<File, MimicError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() > 0 && meta.len() + incoming > self.budget_bytes => {
                fs::rename(&self.path, self.rotated_path())
                    .map_err(|e| MimicError::Io(e.to_string()))?;
            }
            Ok(_) => {}
            Err(_) => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent).map_err(|e| MimicError::Io(e.to_string()))?;
                }
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MimicError::Io(e.to_string()))
    }
}

fn truncate_json(value: &Value, max_bytes: usize) -> Value {
    let rendered = value.to_string();
    if rendered.len() <= max_bytes {
        return value.clone();
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}

#[cfg(test)]
mod tests {
    use super::{JsonlLogger, LogEvent};
    use serde_json::json;

    fn replay_event() -> LogEvent<'static> {
        LogEvent {
            level: "debug",
            event_type: "replay",
            payload: json!({"fingerprint": "0".repeat(40)}),
        }
    }

    #[test]
    fn logger_truncates_large_payloads_and_writes_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs/mimic.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.max_payload_bytes = 20;

        logger
            .append(&LogEvent {
                level: "info",
                event_type: "record",
                payload: json!({"function": "abcdefghijklmnopqrstuvwxyz"}),
            })
            .expect("append");

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"event_type\":\"record\""));
        assert!(text.contains("..."));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn live_log_never_exceeds_budget() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mimic.jsonl");
        let line_len = {
            let sizing = JsonlLogger::new(dir.path().join("sizing.jsonl"));
            sizing.append(&replay_event()).expect("append");
            std::fs::metadata(dir.path().join("sizing.jsonl"))
                .expect("meta")
                .len()
        };
        let mut logger = JsonlLogger::new(&path);
        logger.budget_bytes = line_len * 2;

        logger.append(&replay_event()).expect("first");
        logger.append(&replay_event()).expect("second");
        assert!(!logger.rotated_path().exists());
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), line_len * 2);

        logger.append(&replay_event()).expect("third");
        assert!(logger.rotated_path().ends_with("mimic.jsonl.old"));
        assert_eq!(
            std::fs::metadata(logger.rotated_path()).expect("old").len(),
            line_len * 2
        );
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), line_len);
    }

    #[test]
    fn oversized_line_starts_a_fresh_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = JsonlLogger::new(dir.path().join("mimic.jsonl"));
        logger.budget_bytes = 8;

        logger.append(&replay_event()).expect("first");
        assert!(!logger.rotated_path().exists());
        logger.append(&replay_event()).expect("second");
        assert!(logger.rotated_path().exists());
    }
}
