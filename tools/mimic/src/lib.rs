//! Record/replay test doubles for expensive functions.
//!
//! A [`Mimic`] registry wraps a callable so that, in record mode, each new
//! argument combination runs the real function and stores its result under
//! a fingerprint in an on-disk vault. In replay mode the stored result is
//! returned without running the function.

pub mod codec;
pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod identity;
pub mod interceptor;
pub mod logging;
pub mod mode;
pub mod run;
pub mod runtime;
pub mod store;
pub mod usage;

pub use codec::{JsonCodec, PayloadCodec};
pub use config::{load_config, CliOverrides, MimicConfig, ResolvedConfig};
pub use errors::MimicError;
pub use fingerprint::{fingerprint, Args, CallArgs, Fingerprint, FingerprintOutcome};
pub use identity::{CallableKind, FunctionIdentity, FunctionPath};
pub use interceptor::{CallError, InterceptOptions, Mimic, Mimicked, MimickedAsync};
pub use mode::ModeSwitch;
pub use run::{RunReport, UnusedPolicy};

use clap::{error::ErrorKind, Parser, Subcommand};
use runtime::ProductionRuntime;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "mimic")]
#[command(about = "Inspect and maintain a mimic recording vault")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub root: Option<PathBuf>,
    #[arg(long)]
    pub vault: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List recorded fingerprints.
    List,
    /// Print the stored payload of one recording.
    Show { fingerprint: String },
    /// Delete every recording and the vault directory.
    Clear,
    /// Print the configured function identities.
    Functions,
}

pub fn run() -> Result<i32, MimicError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| MimicError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
) -> Result<i32, MimicError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(MimicError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        root: cli.root.clone(),
        vault: cli.vault.clone(),
    };
    let resolved = load_config(&overrides, cwd, runtime.file_system.as_ref())?;
    let mimic = resolved.build_mimic(runtime.file_system.clone());
    let terminal = runtime.terminal.as_ref();

    match &cli.command {
        Command::List => {
            let keys = mimic.store().enumerate()?;
            for key in &keys {
                terminal.write_line(key.as_str())?;
            }
            terminal.write_line(&format!(
                "{} recording(s) in {}",
                keys.len(),
                resolved.vault.display()
            ))?;
        }
        Command::Show { fingerprint } => {
            let key = Fingerprint::parse(fingerprint.trim()).ok_or_else(|| {
                MimicError::Cli(format!(
                    "{fingerprint:?} is not a fingerprint; expected 64 lowercase hex characters"
                ))
            })?;
            let bytes = mimic.store().read(&key)?;
            terminal.write_line(&render_payload(&bytes))?;
        }
        Command::Clear => {
            let removed = mimic.clear_vault()?;
            terminal.write_line(&format!(
                "removed {removed} recording(s) from {}",
                resolved.vault.display()
            ))?;
        }
        Command::Functions => {
            if resolved.functions.is_empty() {
                terminal.write_line("no functions configured")?;
            }
            for path in &resolved.functions {
                let identity = FunctionIdentity::from_path(path, CallableKind::Static);
                terminal.write_line(&format!(
                    "{} (fingerprinted as {})",
                    identity.display_name(),
                    identity.fingerprint_name()
                ))?;
            }
        }
    }
    Ok(0)
}

/// Pretty-prints JSON payloads; anything else is shown as lossy UTF-8.
fn render_payload(bytes: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned()),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::{render_payload, run_with_runtime};
    use crate::errors::MimicError;
    use crate::runtime::{FakeFileSystem, FakeTerminal, FileSystem, ProductionRuntime};
    use std::ffi::OsString;
    use std::path::Path;
    use std::sync::Arc;

    const KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn runtime(fs: &FakeFileSystem, terminal: &FakeTerminal) -> ProductionRuntime {
        ProductionRuntime {
            file_system: Arc::new(fs.clone()),
            terminal: Arc::new(terminal.clone()),
        }
    }

    fn args(values: &[&str]) -> Vec<OsString> {
        std::iter::once("mimic")
            .chain(values.iter().copied())
            .map(OsString::from)
            .collect()
    }

    fn seeded() -> FakeFileSystem {
        let fs = FakeFileSystem::default();
        fs.create_dir_all(Path::new("/work/.mimic_vault"))
            .expect("vault dir");
        fs.write_string(
            &Path::new("/work/.mimic_vault").join(format!("{KEY}.json")),
            "{\"total\":8}",
        )
        .expect("seed");
        fs
    }

    #[test]
    fn list_prints_fingerprints_and_count() {
        let fs = seeded();
        let terminal = FakeTerminal::default();
        let code = run_with_runtime(&args(&["list"]), Path::new("/work"), &runtime(&fs, &terminal))
            .expect("list");
        assert_eq!(code, 0);
        let lines = terminal.written_lines();
        assert_eq!(lines[0], KEY);
        assert_eq!(lines[1], "1 recording(s) in /work/.mimic_vault");
    }

    #[test]
    fn show_pretty_prints_payload_and_rejects_bad_keys() {
        let fs = seeded();
        let terminal = FakeTerminal::default();
        let rt = runtime(&fs, &terminal);
        run_with_runtime(&args(&["show", KEY]), Path::new("/work"), &rt).expect("show");
        assert!(terminal.written_lines()[0].contains("\"total\": 8"));

        let err = run_with_runtime(&args(&["show", "nope"]), Path::new("/work"), &rt)
            .expect_err("bad key");
        assert!(matches!(err, MimicError::Cli(_)));

        let missing = "f".repeat(64);
        let err = run_with_runtime(&args(&["show", &missing]), Path::new("/work"), &rt)
            .expect_err("absent");
        assert!(matches!(err, MimicError::RecordingNotFound(_)));
    }

    #[test]
    fn clear_removes_vault() {
        let fs = seeded();
        let terminal = FakeTerminal::default();
        run_with_runtime(&args(&["clear"]), Path::new("/work"), &runtime(&fs, &terminal))
            .expect("clear");
        assert!(!fs.exists(Path::new("/work/.mimic_vault")));
        assert_eq!(
            terminal.written_lines(),
            vec!["removed 1 recording(s) from /work/.mimic_vault".to_string()]
        );
    }

    #[test]
    fn functions_lists_configured_identities() {
        let fs = FakeFileSystem::with_file(
            "/work/mimic.toml",
            "[functions]\nmimic = [\"app::weather:fetch\", \"app::models:Model.infer\"]\n",
        );
        let terminal = FakeTerminal::default();
        run_with_runtime(
            &args(&["--config", "/work/mimic.toml", "functions"]),
            Path::new("/work"),
            &runtime(&fs, &terminal),
        )
        .expect("functions");
        assert_eq!(
            terminal.written_lines(),
            vec![
                "app::weather:fetch (fingerprinted as app::weather.fetch)".to_string(),
                "app::models:Model.infer (fingerprinted as app::models.infer)".to_string(),
            ]
        );
    }

    #[test]
    fn vault_flag_overrides_config() {
        let fs = FakeFileSystem::default();
        let terminal = FakeTerminal::default();
        run_with_runtime(
            &args(&["--vault", "elsewhere", "list"]),
            Path::new("/work"),
            &runtime(&fs, &terminal),
        )
        .expect("list");
        assert_eq!(
            terminal.written_lines(),
            vec!["0 recording(s) in /work/elsewhere".to_string()]
        );
    }

    #[test]
    fn non_json_payloads_render_as_text() {
        assert_eq!(render_payload(b"plain"), "plain");
        assert_eq!(render_payload(b"[1,2]"), "[\n  1,\n  2\n]");
    }
}
