//! Runs the setup scripts that create runtimes and install the service.
//!
//! Scripts are opaque: only the exit status and the combined output are
//! looked at.

use aftp_core::error::AftpError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Default bound on one installer run
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(3600);

/// Compute backend a runtime can be installed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Cpu,
    Cuda,
    Rocm,
    Intel,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Cuda => "cuda",
            Backend::Rocm => "rocm",
            Backend::Intel => "intel",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = AftpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Backend::Cpu),
            "cuda" => Ok(Backend::Cuda),
            "rocm" => Ok(Backend::Rocm),
            "intel" => Ok(Backend::Intel),
            other => Err(AftpError::installer(format!("unknown backend: {}", other))),
        }
    }
}

/// Backends offered for a runtime. Every runtime has `cpu`.
pub fn backends_for(runtime: &str) -> Vec<Backend> {
    match runtime {
        "image" | "ai_dev" | "stt" => vec![Backend::Cpu, Backend::Cuda, Backend::Rocm, Backend::Intel],
        "embeddings" => vec![Backend::Cpu, Backend::Cuda],
        _ => vec![Backend::Cpu],
    }
}

/// Result of one script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub script: PathBuf,
    pub success: bool,
    /// `None` when the script was ended by a signal
    pub exit_code: Option<i32>,
    /// Standard output followed by standard error
    pub output: String,
    pub elapsed: Duration,
}

/// Runs scripts from the scripts directory.
#[derive(Debug, Clone)]
pub struct Installer {
    scripts_dir: PathBuf,
    timeout: Duration,
}

impl Installer {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            timeout: DEFAULT_INSTALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// `setup_venv_<runtime>[_<backend>].sh` (`.ps1` on Windows)
    pub fn script_for(&self, runtime: &str, backend: Option<Backend>) -> PathBuf {
        let stem = match backend {
            Some(backend) => format!("setup_venv_{}_{}", runtime, backend),
            None => format!("setup_venv_{}", runtime),
        };
        self.scripts_dir.join(format!("{}.{}", stem, script_extension()))
    }

    /// The script that installs the model service
    pub fn service_script(&self) -> PathBuf {
        self.scripts_dir
            .join(format!("install_ollama.{}", script_extension()))
    }

    /// Create or update a runtime
    pub async fn run(&self, runtime: &str, backend: Option<Backend>) -> Result<InstallOutcome, AftpError> {
        if let Some(backend) = backend {
            if !backends_for(runtime).contains(&backend) {
                return Err(AftpError::installer(format!(
                    "backend {} is not offered for runtime {}",
                    backend, runtime
                )));
            }
        }
        self.run_script(&self.script_for(runtime, backend)).await
    }

    /// Install the model service using `script`, or the default service script
    pub async fn install_service(&self, script: Option<&Path>) -> Result<InstallOutcome, AftpError> {
        let script = script
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.service_script());
        self.run_script(&script).await
    }

    /// Run one script with the platform shell, bounded by the timeout.
    pub async fn run_script(&self, script: &Path) -> Result<InstallOutcome, AftpError> {
        if !script.is_file() {
            return Err(AftpError::installer(format!(
                "{} not found",
                script.display()
            )));
        }

        tracing::info!("running installer script {}", script.display());
        let started = Instant::now();

        let child = shell_command(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AftpError::installer(format!("cannot run {}: {}", script.display(), e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(AftpError::timeout(format!(
                    "{} did not finish within {:?}",
                    script.display(),
                    self.timeout
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let combined = if stderr.trim().is_empty() {
            stdout
        } else if stdout.trim().is_empty() {
            stderr
        } else {
            format!("{}\n{}", stdout.trim_end(), stderr)
        };

        let outcome = InstallOutcome {
            script: script.to_path_buf(),
            success: output.status.success(),
            exit_code: output.status.code(),
            output: combined,
            elapsed: started.elapsed(),
        };

        if outcome.success {
            tracing::info!("{} finished in {:?}", script.display(), outcome.elapsed);
        } else {
            tracing::warn!("{} failed with {}", script.display(), output.status);
        }
        Ok(outcome)
    }
}

fn script_extension() -> &'static str {
    if cfg!(windows) {
        "ps1"
    } else {
        "sh"
    }
}

#[cfg(windows)]
fn shell_command(script: &Path) -> Command {
    let mut command = Command::new("powershell");
    command
        .arg("-ExecutionPolicy")
        .arg("Bypass")
        .arg("-File")
        .arg(script);
    command
}

#[cfg(not(windows))]
fn shell_command(script: &Path) -> Command {
    let mut command = Command::new("bash");
    command.arg(script);
    command
}
