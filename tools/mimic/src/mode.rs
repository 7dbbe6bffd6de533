use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_RECORD_ENV_VAR: &str = "MIMIC_RECORD";

/// Record/replay switch, consulted on every intercepted call.
///
/// When `env_var` is set and present in the environment its value decides;
/// otherwise the in-process flag does. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct ModeSwitch {
    flag: Arc<AtomicBool>,
    env_var: Option<String>,
}

impl ModeSwitch {
    pub fn flag(recording: bool) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(recording)),
            env_var: None,
        }
    }

    pub fn with_env(recording: bool, env_var: impl Into<String>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(recording)),
            env_var: Some(env_var.into()),
        }
    }

    pub fn is_recording(&self) -> bool {
        if let Some(var) = &self.env_var {
            if let Ok(value) = std::env::var(var) {
                return is_truthy(&value);
            }
        }
        self.flag.load(Ordering::SeqCst)
    }

    pub fn set_recording(&self, recording: bool) {
        self.flag.store(recording, Ordering::SeqCst);
    }

    pub fn env_var(&self) -> Option<&str> {
        self.env_var.as_deref()
    }
}

impl Default for ModeSwitch {
    fn default() -> Self {
        Self::with_env(false, DEFAULT_RECORD_ENV_VAR)
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
