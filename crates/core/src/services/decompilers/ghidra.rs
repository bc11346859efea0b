use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::config::GhidraConfig;
use crate::model::DecompiledFunction;
use crate::services::decompiler::{DecompileError, Decompiler};

/// Project name passed to analyzeHeadless.
const PROJECT_NAME: &str = "codepair";

/// Resolve the analyzeHeadless executable path from environment variables.
///
/// Precedence:
/// - `GHIDRA_HEADLESS` or `GHIDRA_ANALYZE_HEADLESS` pointing directly to the executable.
/// - `GHIDRA_INSTALL_DIR`, appended with platform-specific analyzeHeadless name.
fn resolve_headless_path() -> Result<PathBuf, DecompileError> {
    for key in ["GHIDRA_HEADLESS", "GHIDRA_ANALYZE_HEADLESS"] {
        if let Some(p) = env::var_os(key) {
            let path = PathBuf::from(p);
            if path.is_file() {
                return Ok(path);
            }
        }
    }

    if let Some(dir) = env::var_os("GHIDRA_INSTALL_DIR") {
        let dir = PathBuf::from(dir);
        let p = if cfg!(windows) {
            dir.join("support").join("analyzeHeadless.bat")
        } else {
            dir.join("support").join("analyzeHeadless")
        };
        if p.is_file() {
            return Ok(p);
        }
    }

    Err(DecompileError::Unconfigured {
        name: "ghidra".into(),
        reason: "set GHIDRA_HEADLESS (path to analyzeHeadless) or GHIDRA_INSTALL_DIR".into(),
    })
}

fn bundled_script_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("resources").join("ghidra_scripts").join("decompile.py")
}

/// Ghidra headless decompiler.
///
/// Each call imports the binary into a throwaway Ghidra project and runs a
/// post-script that writes the decompiled functions as a JSON array of
/// [`crate::model::DecompiledFunctionRecord`]s. The project directory and the
/// output file are removed when the call returns, whether it succeeded or not.
#[derive(Debug, Clone)]
pub struct Ghidra {
    headless: PathBuf,
    script: PathBuf,
}

impl Ghidra {
    pub fn new(headless: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self { headless: headless.into(), script: script.into() }
    }

    pub fn from_config(config: &GhidraConfig) -> Result<Self, DecompileError> {
        let headless = match &config.headless_path {
            Some(path) => path.clone(),
            None => resolve_headless_path()?,
        };
        let script = config.script_path.clone().unwrap_or_else(bundled_script_path);
        Ok(Self::new(headless, script))
    }

    pub fn headless_path(&self) -> &Path {
        &self.headless
    }
}

impl Decompiler for Ghidra {
    fn decompile(&self, path: &Path) -> Result<Vec<DecompiledFunction>, DecompileError> {
        if !path.is_file() {
            return Err(DecompileError::MissingBinary(path.to_path_buf()));
        }
        let script_dir = self.script.parent().unwrap_or_else(|| Path::new("."));
        let script_name = self.script.file_name().ok_or_else(|| DecompileError::Unconfigured {
            name: "ghidra".into(),
            reason: format!("script path {} has no file name", self.script.display()),
        })?;

        let project_dir = tempfile::Builder::new().prefix("codepair-ghidra-").tempdir()?;
        let output = tempfile::Builder::new().prefix("codepair-").suffix(".json").tempfile()?;
        debug!(
            project = %project_dir.path().display(),
            output = %output.path().display(),
            binary = %path.display(),
            "running analyzeHeadless"
        );

        let result = Command::new(&self.headless)
            .arg(project_dir.path())
            .arg(PROJECT_NAME)
            .arg("-import")
            .arg(path)
            .arg("-scriptPath")
            .arg(script_dir)
            .arg("-noanalysis")
            .arg("-postScript")
            .arg(script_name)
            .arg(output.path())
            .output()
            .map_err(|e| DecompileError::Tool {
                tool: "ghidra".into(),
                status: "not started".into(),
                stderr: format!("failed to spawn {}: {e}", self.headless.display()),
            })?;
        if !result.status.success() {
            return Err(DecompileError::Tool {
                tool: "ghidra".into(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let body = fs::read_to_string(output.path())?;
        serde_json::from_str::<Vec<DecompiledFunction>>(&body).map_err(|e| {
            DecompileError::MalformedOutput {
                tool: "ghidra post script".into(),
                reason: e.to_string(),
                stdout: String::from_utf8_lossy(&result.stdout).trim().to_string(),
            }
        })
    }
}
