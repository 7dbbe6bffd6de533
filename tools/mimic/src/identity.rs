use crate::errors::MimicError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a callable is reached. Decides whether interception is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallableKind {
    #[default]
    Free,
    /// Associated function without a receiver and without type-level state.
    Static,
    /// Associated function that may touch type-level state (statics, caches).
    TypeScoped,
    /// Method called through a live value.
    BoundInstance,
}

impl CallableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Static => "static",
            Self::TypeScoped => "type_scoped",
            Self::BoundInstance => "bound_instance",
        }
    }
}

/// Identity of an intercepted callable.
///
/// Only `module` and `name` feed the fingerprint. The owning type and any
/// other nesting are ignored, so `Client::fetch` and `Cache::fetch` declared
/// in the same module share an identity and their recordings collide. This
/// is a known limitation: give such functions distinct names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionIdentity {
    pub module: String,
    pub name: String,
    pub owner: Option<String>,
    pub kind: CallableKind,
}

impl FunctionIdentity {
    pub fn free(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            owner: None,
            kind: CallableKind::Free,
        }
    }

    pub fn associated(
        module: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
        kind: CallableKind,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            owner: Some(owner.into()),
            kind,
        }
    }

    /// Builds an identity from a parsed path. A single segment is a free
    /// function; nested segments are associated with `kind`.
    pub fn from_path(path: &FunctionPath, kind: CallableKind) -> Self {
        match path.owner() {
            Some(owner) => Self::associated(&path.module, owner, path.name(), kind),
            None => Self::free(&path.module, path.name()),
        }
    }

    /// The string hashed into every fingerprint: `<module>.<name>`.
    pub fn fingerprint_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn display_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}:{owner}.{}", self.module, self.name),
            None => format!("{}:{}", self.module, self.name),
        }
    }
}

impl fmt::Display for FunctionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Identity of a free function in the calling module.
#[macro_export]
macro_rules! function_identity {
    ($name:ident) => {
        $crate::identity::FunctionIdentity::free(module_path!(), stringify!($name))
    };
    ($owner:ident :: $name:ident, $kind:expr) => {
        $crate::identity::FunctionIdentity::associated(
            module_path!(),
            stringify!($owner),
            stringify!($name),
            $kind,
        )
    };
}

/// Textual function reference: `module::path:Qualified.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPath {
    pub module: String,
    pub qualified: Vec<String>,
}

impl FunctionPath {
    pub fn parse(raw: &str) -> Result<Self, MimicError> {
        let trimmed = raw.trim();
        let invalid = || {
            MimicError::InvalidFunctionPath(format!(
                "{trimmed:?}; expected 'module::path:function' or 'module::path:Type.method'"
            ))
        };
        let (module, qualified) = split_module(trimmed).ok_or_else(invalid)?;
        if module.is_empty() || module.split("::").any(|segment| segment.trim().is_empty()) {
            return Err(invalid());
        }
        let qualified = qualified
            .split('.')
            .map(|segment| segment.trim().to_string())
            .collect::<Vec<_>>();
        if qualified.iter().any(|segment| !is_identifier(segment)) {
            return Err(invalid());
        }
        Ok(Self {
            module: module.to_string(),
            qualified,
        })
    }

    pub fn name(&self) -> &str {
        self.qualified.last().map(String::as_str).unwrap_or_default()
    }

    /// Innermost enclosing segment, if the path is nested.
    pub fn owner(&self) -> Option<&str> {
        let len = self.qualified.len();
        if len < 2 {
            return None;
        }
        Some(self.qualified[len - 2].as_str())
    }
}

impl fmt::Display for FunctionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.qualified.join("."))
    }
}

/// Splits at the last `:` that is not part of a `::` separator.
fn split_module(raw: &str) -> Option<(&str, &str)> {
    let bytes = raw.as_bytes();
    let mut idx = bytes.len();
    while idx > 0 {
        idx -= 1;
        if bytes[idx] != b':' {
            continue;
        }
        let prev_colon = idx > 0 && bytes[idx - 1] == b':';
        let next_colon = idx + 1 < bytes.len() && bytes[idx + 1] == b':';
        if prev_colon {
            idx -= 1;
            continue;
        }
        if next_colon {
            continue;
        }
        return Some((&raw[..idx], &raw[idx + 1..]));
    }
    None
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}
