//! Lookup of external command-line tools.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// The model service binary
pub const SERVICE_TOOL: &str = "ollama";

/// Tools recorded in the runtime registry
pub const KNOWN_TOOLS: [&str; 3] = [SERVICE_TOOL, "ffmpeg", "tesseract"];

/// Registry entry for one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub found: bool,
    #[serde(default)]
    pub path: String,
}

impl ToolStatus {
    pub fn found(path: &Path) -> Self {
        Self {
            found: true,
            path: path.display().to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            path: String::new(),
        }
    }
}

/// Search `path_var` (a `PATH`-style list) for an executable named `name`.
pub fn which_in(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidate_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|candidate| is_executable(candidate))
}

/// Search the process `PATH`
pub fn which(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH");
    which_in(name, path_var.as_deref())
}

/// Default install locations checked when `PATH` has no match
pub fn fallback_locations(name: &str) -> Vec<PathBuf> {
    let mut locations = Vec::new();

    if cfg!(windows) {
        match name {
            SERVICE_TOOL => {
                if let Some(local) = dirs::data_local_dir() {
                    locations.push(local.join("Programs").join("Ollama").join("ollama.exe"));
                }
            }
            "tesseract" => {
                locations.push(PathBuf::from(r"C:\Program Files\Tesseract-OCR\tesseract.exe"));
            }
            _ => {}
        }
    } else if name == SERVICE_TOOL {
        locations.push(PathBuf::from("/usr/local/bin/ollama"));
        locations.push(PathBuf::from("/usr/bin/ollama"));
        if let Some(home) = dirs::home_dir() {
            locations.push(home.join("bin").join("ollama"));
        }
    }

    locations
}

/// Locate a tool on `PATH`, then in its fallback locations
pub fn locate(name: &str) -> ToolStatus {
    which(name)
        .or_else(|| {
            fallback_locations(name)
                .into_iter()
                .find(|p| is_executable(p))
        })
        .map(|p| ToolStatus::found(&p))
        .unwrap_or_else(ToolStatus::not_found)
}

/// Locate every known tool
pub fn scan_tools() -> BTreeMap<String, ToolStatus> {
    KNOWN_TOOLS
        .iter()
        .map(|name| (name.to_string(), locate(name)))
        .collect()
}

fn candidate_names(name: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(name).extension().is_none() {
        vec![format!("{}.exe", name), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
