//! Locating the real recording tool behind the wrapper.

use std::ffi::OsString;
use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use turnstamp_core::config::settings::TOOL_OVERRIDE_VARS;

pub const TOOL_NAME: &str = "specstory";
/// Name the Homebrew install step gives the renamed real binary. Also the
/// last-resort command when nothing else resolves.
const REAL_TOOL_NAME: &str = "specstory-real";

/// Byte string that identifies a script or binary as this wrapper.
const WRAPPER_SIGNATURE: &[u8] = b"turnstamp";
const SIGNATURE_WINDOW: u64 = 512;

#[derive(Debug, Clone)]
pub struct ToolLocator {
    /// Values of the override variables that are set, in lookup order.
    overrides: Vec<String>,
    home: Option<PathBuf>,
    self_exe: Option<PathBuf>,
    search_path: Option<OsString>,
    homebrew: bool,
}

impl ToolLocator {
    pub fn from_env() -> Self {
        Self {
            overrides: TOOL_OVERRIDE_VARS
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .filter(|value| !value.trim().is_empty())
                .collect(),
            home: std::env::var_os("HOME").map(PathBuf::from),
            self_exe: std::env::current_exe().ok(),
            search_path: std::env::var_os("PATH"),
            homebrew: true,
        }
    }

    /// Resolve the tool. Never fails: the last resort is a bare command
    /// name, leaving any error to the moment it is spawned.
    pub fn resolve(&self) -> PathBuf {
        if let Some(tool) = self.override_tool() {
            tracing::debug!("Recording tool from environment: {}", tool.display());
            return tool;
        }
        if let Some(tool) = self.homebrew.then(|| self.homebrew_tool()).flatten() {
            tracing::debug!("Recording tool from Homebrew: {}", tool.display());
            return tool;
        }
        if let Some(tool) = self.search(TOOL_NAME) {
            tracing::debug!("Recording tool from PATH: {}", tool.display());
            return tool;
        }
        tracing::debug!("Falling back to bare {REAL_TOOL_NAME}");
        PathBuf::from(REAL_TOOL_NAME)
    }

    /// Only the first override that is set is considered.
    fn override_tool(&self) -> Option<PathBuf> {
        let raw = self.overrides.first()?;
        let candidate = self.expand_home(raw.trim());

        if candidate.is_absolute() {
            if candidate.exists() && !self.is_wrapper(&candidate) {
                return Some(candidate);
            }
            return None;
        }
        self.search(&candidate.to_string_lossy())
    }

    fn homebrew_tool(&self) -> Option<PathBuf> {
        let prefix = brew_prefix(&[])?;
        let real = prefix.join("bin").join(REAL_TOOL_NAME);
        // metadata follows symlinks, so a dangling link is skipped
        if fs::metadata(&real).is_ok() {
            return Some(real);
        }

        let keg = brew_prefix(&[TOOL_NAME])?;
        let bin = keg.join("bin").join(TOOL_NAME);
        (is_executable(&bin) && !self.is_wrapper(&bin)).then_some(bin)
    }

    /// Search the executable path, minus the wrapper's own directories, for
    /// a non-wrapper `name`.
    fn search(&self, name: &str) -> Option<PathBuf> {
        let name = Path::new(name);
        if name.components().count() > 1 {
            let path = std::env::current_dir().ok()?.join(name);
            return (is_executable(&path) && !self.is_wrapper(&path)).then_some(path);
        }

        self.search_dirs()
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|path| is_executable(path) && !self.is_wrapper(path))
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let excluded: Vec<PathBuf> = [
            self.self_exe
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf),
            self.home.as_ref().map(|h| h.join("bin")),
        ]
        .into_iter()
        .flatten()
        .collect();

        let Some(search_path) = &self.search_path else {
            return Vec::new();
        };
        std::env::split_paths(search_path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .filter(|dir| !excluded.iter().any(|ex| same_path(ex, dir)))
            .collect()
    }

    fn expand_home(&self, raw: &str) -> PathBuf {
        match (raw.strip_prefix("~/"), &self.home) {
            (Some(rest), Some(home)) => home.join(rest),
            _ if raw == "~" => self.home.clone().unwrap_or_else(|| PathBuf::from(raw)),
            _ => PathBuf::from(raw),
        }
    }

    /// A path is the wrapper if it is the running executable, the
    /// conventional `~/bin/specstory` install, or carries the wrapper
    /// signature near the start of the file.
    pub fn is_wrapper(&self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        if let Some(exe) = &self.self_exe {
            if same_path(exe, path) {
                return true;
            }
        }
        if let Some(home) = &self.home {
            if same_path(&home.join("bin").join(TOOL_NAME), path) {
                return true;
            }
        }
        has_signature(path)
    }
}

fn brew_prefix(args: &[&str]) -> Option<PathBuf> {
    let output = Command::new("brew")
        .arg("--prefix")
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let prefix = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!prefix.is_empty()).then(|| PathBuf::from(prefix))
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn has_signature(path: &Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut head = Vec::new();
    if file.take(SIGNATURE_WINDOW).read_to_end(&mut head).is_err() {
        return false;
    }
    head.windows(WRAPPER_SIGNATURE.len())
        .any(|window| window == WRAPPER_SIGNATURE)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
