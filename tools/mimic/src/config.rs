use crate::errors::MimicError;
use crate::identity::FunctionPath;
use crate::interceptor::Mimic;
use crate::logging::{JsonlLogger, DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::mode::{ModeSwitch, DEFAULT_RECORD_ENV_VAR};
use crate::run::UnusedPolicy;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_VAULT_DIR: &str = ".mimic_vault";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub vault: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MimicConfig {
    pub vault: VaultConfig,
    pub record: RecordConfig,
    pub functions: FunctionsConfig,
    pub unused: UnusedConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordConfig {
    pub enabled: bool,
    /// Empty disables the environment lookup.
    pub env_var: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionsConfig {
    pub mimic: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnusedConfig {
    pub report_path: Option<PathBuf>,
    pub clean: bool,
    pub fail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for MimicConfig {
    fn default() -> Self {
        Self {
            vault: VaultConfig {
                path: PathBuf::from(DEFAULT_VAULT_DIR),
            },
            record: RecordConfig {
                enabled: false,
                env_var: DEFAULT_RECORD_ENV_VAR.to_string(),
            },
            functions: FunctionsConfig { mimic: Vec::new() },
            unused: UnusedConfig {
                report_path: None,
                clean: false,
                fail: false,
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialMimicConfig {
    vault: Option<PartialVaultConfig>,
    record: Option<PartialRecordConfig>,
    functions: Option<PartialFunctionsConfig>,
    unused: Option<PartialUnusedConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialVaultConfig {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecordConfig {
    enabled: Option<bool>,
    env_var: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialFunctionsConfig {
    mimic: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialUnusedConfig {
    report_path: Option<PathBuf>,
    clean: Option<bool>,
    fail: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

/// Configuration with every path resolved against the root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub root: PathBuf,
    pub vault: PathBuf,
    pub config: MimicConfig,
    pub functions: Vec<FunctionPath>,
}

impl ResolvedConfig {
    pub fn mode_switch(&self) -> ModeSwitch {
        let env_var = self.config.record.env_var.trim();
        if env_var.is_empty() {
            ModeSwitch::flag(self.config.record.enabled)
        } else {
            ModeSwitch::with_env(self.config.record.enabled, env_var)
        }
    }

    pub fn unused_policy(&self) -> UnusedPolicy {
        UnusedPolicy {
            report_path: self
                .config
                .unused
                .report_path
                .as_ref()
                .map(|path| absolutize_path(&self.root, path)),
            clean: self.config.unused.clean,
            fail: self.config.unused.fail,
        }
    }

    /// Registry wired to the resolved vault, mode switch and log.
    pub fn build_mimic(&self, fs: Arc<dyn FileSystem>) -> Mimic {
        let mimic = Mimic::new(fs, self.vault.clone(), self.mode_switch());
        match self.logger() {
            Some(logger) => mimic.with_logger(logger),
            None => mimic,
        }
    }

    pub fn logger(&self) -> Option<JsonlLogger> {
        let path = self.config.logging.path.as_ref()?;
        let mut logger = JsonlLogger::new(absolutize_path(&self.root, path));
        logger.max_payload_bytes = self.config.logging.max_payload_bytes;
        logger.budget_bytes = self.config.logging.budget_bytes;
        Some(logger)
    }
}

pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<ResolvedConfig, MimicError> {
    let mut cfg = MimicConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        cfg = parse_config(&file_contents)?;
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;

    let root = match &overrides.root {
        Some(root) => absolutize_path(process_cwd, root),
        None => process_cwd.to_path_buf(),
    };
    let vault = absolutize_path(&root, &cfg.vault.path);
    let functions = cfg
        .functions
        .mimic
        .iter()
        .map(|raw| FunctionPath::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedConfig {
        root,
        vault,
        config: cfg,
        functions,
    })
}

pub fn parse_config(contents: &str) -> Result<MimicConfig, MimicError> {
    let partial: PartialMimicConfig =
        toml::from_str(contents).map_err(|e| MimicError::ConfigParse(e.to_string()))?;
    let mut cfg = MimicConfig::default();
    merge_partial_config(&mut cfg, partial);
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut MimicConfig, partial: PartialMimicConfig) {
    if let Some(vault) = partial.vault {
        if let Some(path) = vault.path {
            cfg.vault.path = path;
        }
    }

    if let Some(record) = partial.record {
        if let Some(enabled) = record.enabled {
            cfg.record.enabled = enabled;
        }
        if let Some(env_var) = record.env_var {
            cfg.record.env_var = env_var;
        }
    }

    if let Some(functions) = partial.functions {
        if let Some(mimic) = functions.mimic {
            cfg.functions.mimic = mimic;
        }
    }

    if let Some(unused) = partial.unused {
        if let Some(report_path) = unused.report_path {
            cfg.unused.report_path = Some(report_path);
        }
        if let Some(clean) = unused.clean {
            cfg.unused.clean = clean;
        }
        if let Some(fail) = unused.fail {
            cfg.unused.fail = fail;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut MimicConfig, overrides: &CliOverrides) {
    if let Some(vault) = &overrides.vault {
        cfg.vault.path = vault.clone();
    }
}

fn validate_config(cfg: &MimicConfig) -> Result<(), MimicError> {
    if cfg.vault.path.as_os_str().is_empty() {
        return Err(MimicError::InvalidConfig(
            "vault.path must not be empty".to_string(),
        ));
    }
    if cfg.logging.max_payload_bytes < 16 {
        return Err(MimicError::InvalidConfig(
            "logging.max_payload_bytes must be at least 16".to_string(),
        ));
    }
    if cfg.logging.budget_bytes == 0 {
        return Err(MimicError::InvalidConfig(
            "logging.budget_bytes must be greater than zero".to_string(),
        ));
    }
    if cfg.record.env_var.contains('=') {
        return Err(MimicError::InvalidConfig(format!(
            "record.env_var {:?} is not a valid variable name",
            cfg.record.env_var
        )));
    }
    Ok(())
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{load_config, parse_config, CliOverrides, MimicConfig};
    use crate::errors::MimicError;
    use crate::runtime::FakeFileSystem;
    use std::path::{Path, PathBuf};

    #[test]
    fn defaults_put_vault_under_root() {
        let fs = FakeFileSystem::default();
        let resolved =
            load_config(&CliOverrides::default(), Path::new("/work"), &fs).expect("load");
        assert_eq!(resolved.root, PathBuf::from("/work"));
        assert_eq!(resolved.vault, PathBuf::from("/work/.mimic_vault"));
        assert_eq!(resolved.config, MimicConfig::default());
        assert!(resolved.functions.is_empty());
        assert!(resolved.logger().is_none());
        assert_eq!(resolved.mode_switch().env_var(), Some("MIMIC_RECORD"));
    }

    #[test]
    fn file_values_merge_onto_defaults() {
        let cfg = parse_config(
            r#"
            [vault]
            path = "fixtures/vault"

            [functions]
            mimic = ["app::weather:fetch", "app::models:Model.infer"]

            [unused]
            fail = true
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.vault.path, PathBuf::from("fixtures/vault"));
        assert_eq!(cfg.functions.mimic.len(), 2);
        assert!(cfg.unused.fail);
        assert!(!cfg.unused.clean);
        assert_eq!(cfg.record.env_var, "MIMIC_RECORD");
    }

    #[test]
    fn cli_overrides_win_and_paths_resolve_against_root() {
        let fs = FakeFileSystem::with_file(
            "/work/mimic.toml",
            r#"
            [vault]
            path = "from-file"
            [record]
            enabled = true
            env_var = ""
            [unused]
            report_path = "target/unused.json"
            [logging]
            path = "target/mimic.jsonl"
            "#,
        );
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/work/mimic.toml")),
            root: Some(PathBuf::from("project")),
            vault: Some(PathBuf::from("/abs/vault")),
        };
        let resolved = load_config(&overrides, Path::new("/work"), &fs).expect("load");
        assert_eq!(resolved.root, PathBuf::from("/work/project"));
        assert_eq!(resolved.vault, PathBuf::from("/abs/vault"));
        assert!(resolved.mode_switch().is_recording());
        assert_eq!(resolved.mode_switch().env_var(), None);
        assert_eq!(
            resolved.unused_policy().report_path,
            Some(PathBuf::from("/work/project/target/unused.json"))
        );
        assert_eq!(
            resolved.logger().expect("logger").path,
            PathBuf::from("/work/project/target/mimic.jsonl")
        );
    }

    #[test]
    fn malformed_function_paths_fail_loading() {
        let fs = FakeFileSystem::with_file(
            "/work/mimic.toml",
            "[functions]\nmimic = [\"no_colon_here\"]\n",
        );
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/work/mimic.toml")),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, Path::new("/work"), &fs).expect_err("bad path");
        assert!(matches!(err, MimicError::InvalidFunctionPath(_)));
    }

    #[test]
    fn unknown_sections_and_invalid_values_are_rejected() {
        assert!(matches!(
            parse_config("[vaults]\npath = \"x\"\n"),
            Err(MimicError::ConfigParse(_))
        ));

        let fs = FakeFileSystem::with_file("/c.toml", "[logging]\nbudget_bytes = 0\n");
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/c.toml")),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, Path::new("/"), &fs).expect_err("invalid");
        assert_eq!(
            err.to_string(),
            "invalid config: logging.budget_bytes must be greater than zero"
        );
    }
}
