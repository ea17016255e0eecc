//! Finding the formatter executable.
//!
//! Editors launched from a desktop session often get a minimal PATH, so a
//! plain name lookup is not enough. The search runs through the configured
//! directories, the process PATH, the PATH a login shell reports, and a few
//! well-known install locations before falling back to the bare name.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{OnceLock, mpsc};
use std::time::Duration;

pub const DEFAULT_BINARY: &str = "clang-format";

const PATH_MARKER: &str = "__FB_PATH__";
/// A login shell that waits on a prompt or a slow rc file is given up on
const LOGIN_SHELL_TIMEOUT: Duration = Duration::from_secs(3);

/// Where and how to run the formatter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinary {
    /// Absolute path when one was found, otherwise the bare name
    pub command: String,
    /// Environment overrides to pass to the child (currently only PATH)
    pub env: Vec<(String, String)>,
}

impl ResolvedBinary {
    pub fn is_absolute(&self) -> bool {
        Path::new(&self.command).is_absolute()
    }
}

#[derive(Debug, Clone)]
pub struct BinaryLocator {
    binary: String,
    path_override: Option<String>,
    fallback_dirs: Vec<PathBuf>,
    use_login_shell: bool,
}

impl BinaryLocator {
    /// Locator for `binary`; an empty name means [`DEFAULT_BINARY`]
    pub fn new(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        let binary = if binary.trim().is_empty() {
            DEFAULT_BINARY.to_string()
        } else {
            binary
        };

        Self {
            binary,
            path_override: None,
            fallback_dirs: default_fallback_dirs(),
            use_login_shell: cfg!(target_os = "macos"),
        }
    }

    /// PATH-style list searched first and handed to the child; empty means unset
    pub fn with_path_override(mut self, path: Option<String>) -> Self {
        self.path_override = path.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_fallback_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.fallback_dirs = dirs;
        self
    }

    pub fn with_login_shell(mut self, enabled: bool) -> Self {
        self.use_login_shell = enabled;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn locate(&self) -> ResolvedBinary {
        let login_path = if self.use_login_shell && self.path_override.is_none() {
            LoginShellPath::global().get().map(str::to_string)
        } else {
            None
        };

        let env = match (&self.path_override, &login_path) {
            (Some(path), _) => vec![("PATH".to_string(), path.clone())],
            (None, Some(path)) => vec![("PATH".to_string(), path.clone())],
            (None, None) => Vec::new(),
        };

        let command = self
            .find(login_path.as_deref())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| {
                log::debug!("{} not found on any search path, using bare name", self.binary);
                self.binary.clone()
            });

        ResolvedBinary { command, env }
    }

    fn find(&self, login_path: Option<&str>) -> Option<PathBuf> {
        // Explicit paths are used as given
        if self.binary.contains(std::path::MAIN_SEPARATOR) || self.binary.contains('/') {
            let path = PathBuf::from(&self.binary);
            return is_executable(&path).then_some(path);
        }

        self.search_dirs(login_path)
            .into_iter()
            .find_map(|dir| find_in_dir(&dir, &self.binary))
    }

    fn search_dirs(&self, login_path: Option<&str>) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(path) = &self.path_override {
            dirs.extend(std::env::split_paths(&OsString::from(path)));
        }
        if let Some(path) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&path));
        }
        if let Some(path) = login_path {
            dirs.extend(std::env::split_paths(&OsString::from(path)));
        }
        dirs.extend(self.fallback_dirs.iter().cloned());
        dirs.retain(|d| !d.as_os_str().is_empty());
        dirs
    }
}

impl Default for BinaryLocator {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

fn default_fallback_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/usr/local/bin")];
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join("bin"));
        dirs.push(home.join(".homebrew").join("bin"));
    }
    dirs.push(PathBuf::from("/opt/homebrew/bin"));
    dirs.push(PathBuf::from("/home/linuxbrew/.linuxbrew/bin"));
    dirs
}

fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    [name.to_string(), format!("{name}.exe")]
        .into_iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// PATH as reported by the user's login shell, captured at most once per process
pub struct LoginShellPath {
    cell: OnceLock<Option<String>>,
}

impl LoginShellPath {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn global() -> &'static LoginShellPath {
        static LOGIN_SHELL_PATH: LoginShellPath = LoginShellPath::new();
        &LOGIN_SHELL_PATH
    }

    pub fn get(&self) -> Option<&str> {
        self.get_or_init_with(capture_login_shell_path)
    }

    /// Like [`get`](Self::get) with a custom capture; it runs only on first use
    pub fn get_or_init_with(&self, capture: impl FnOnce() -> Option<String>) -> Option<&str> {
        self.cell.get_or_init(capture).as_deref()
    }
}

impl Default for LoginShellPath {
    fn default() -> Self {
        Self::new()
    }
}

fn capture_login_shell_path() -> Option<String> {
    let shell = std::env::var("SHELL").ok().filter(|s| !s.is_empty())?;
    let script = format!("printf '{PATH_MARKER}%s{PATH_MARKER}' \"$PATH\"");
    let path = capture_path(&shell, &["-l", "-i", "-c", &script], LOGIN_SHELL_TIMEOUT);
    log::debug!("login shell PATH: {path:?}");
    path
}

/// Run `shell` and read the marked PATH from its stdout, killing it after `timeout`
fn capture_path(shell: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = match Command::new(shell)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            log::warn!("could not run login shell {shell}: {e}");
            return None;
        }
    };

    let mut stdout = child.stdout.take()?;
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });

    match rx.recv_timeout(timeout) {
        Ok(bytes) => {
            let _ = child.wait();
            let path = extract_marked_path(&String::from_utf8_lossy(&bytes));
            if path.is_none() {
                log::warn!("login shell {shell} printed no PATH");
            }
            path
        }
        Err(_) => {
            log::warn!(
                "login shell {shell} did not report PATH within {}ms",
                timeout.as_millis()
            );
            let _ = child.kill();
            let _ = child.wait();
            None
        }
    }
}

/// Pull the PATH out from between the markers, ignoring shell startup noise
fn extract_marked_path(output: &str) -> Option<String> {
    let (_, rest) = output.split_once(PATH_MARKER)?;
    let (path, _) = rest.split_once(PATH_MARKER)?;
    (!path.is_empty()).then(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[cfg(unix)]
    fn make_executable(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn isolated(binary: &str, dirs: Vec<PathBuf>) -> BinaryLocator {
        BinaryLocator::new(binary)
            .with_fallback_dirs(dirs)
            .with_login_shell(false)
    }

    #[test]
    fn test_empty_binary_name_means_default() {
        assert_eq!(BinaryLocator::new("").binary(), DEFAULT_BINARY);
        assert_eq!(BinaryLocator::new("   ").binary(), DEFAULT_BINARY);
        assert_eq!(BinaryLocator::new("clang-format-18").binary(), "clang-format-18");
    }

    #[test]
    fn test_missing_binary_falls_back_to_bare_name() {
        let empty = TempDir::new().unwrap();
        let locator = isolated("no-such-formatter-3f9a", vec![empty.path().to_path_buf()]);

        let resolved = locator.locate();

        assert_eq!(resolved.command, "no-such-formatter-3f9a");
        assert!(resolved.env.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_finds_binary_in_fallback_dir() {
        let dir = TempDir::new().unwrap();
        let expected = make_executable(dir.path(), "fb-test-formatter-a1");
        let locator = isolated("fb-test-formatter-a1", vec![dir.path().to_path_buf()]);

        assert_eq!(locator.locate().command, expected.display().to_string());
    }

    #[cfg(unix)]
    #[test]
    fn test_finds_exe_suffix() {
        let dir = TempDir::new().unwrap();
        let expected = make_executable(dir.path(), "fb-test-formatter-b2.exe");
        let locator = isolated("fb-test-formatter-b2", vec![dir.path().to_path_buf()]);

        assert_eq!(locator.locate().command, expected.display().to_string());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fb-test-formatter-c3"), "").unwrap();
        let locator = isolated("fb-test-formatter-c3", vec![dir.path().to_path_buf()]);

        assert_eq!(locator.locate().command, "fb-test-formatter-c3");
    }

    #[cfg(unix)]
    #[test]
    fn test_path_override_is_searched_and_passed_to_child() {
        let dir = TempDir::new().unwrap();
        let expected = make_executable(dir.path(), "fb-test-formatter-d4");
        let override_path = dir.path().display().to_string();
        let locator = isolated("fb-test-formatter-d4", Vec::new())
            .with_path_override(Some(override_path.clone()));

        let resolved = locator.locate();

        assert_eq!(resolved.command, expected.display().to_string());
        assert_eq!(resolved.env, vec![("PATH".to_string(), override_path)]);
    }

    #[test]
    fn test_blank_path_override_is_ignored() {
        let locator = isolated("fb-test-formatter-e5", Vec::new())
            .with_path_override(Some("  ".to_string()));

        assert!(locator.locate().env.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_explicit_path_is_used_verbatim() {
        let dir = TempDir::new().unwrap();
        let expected = make_executable(dir.path(), "my-format");
        let locator = isolated(&expected.display().to_string(), Vec::new());

        let resolved = locator.locate();

        assert!(resolved.is_absolute());
        assert_eq!(resolved.command, expected.display().to_string());
    }

    #[test]
    fn test_extract_marked_path_ignores_noise() {
        let output = "Welcome!\nmotd\n__FB_PATH__/usr/bin:/opt/llvm/bin__FB_PATH__\n";

        assert_eq!(
            extract_marked_path(output),
            Some("/usr/bin:/opt/llvm/bin".to_string())
        );
        assert_eq!(extract_marked_path("no markers"), None);
        assert_eq!(extract_marked_path("__FB_PATH____FB_PATH__"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_path_reads_marked_output() {
        let script = "echo noise; printf '__FB_PATH__%s__FB_PATH__' /opt/x/bin";

        let path = capture_path("sh", &["-c", script], Duration::from_secs(10));

        assert_eq!(path, Some("/opt/x/bin".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_hanging_login_shell_is_abandoned() {
        let started = std::time::Instant::now();

        let path = capture_path("sh", &["-c", "sleep 30"], Duration::from_millis(200));

        assert_eq!(path, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_unrunnable_shell_gives_no_path() {
        assert_eq!(
            capture_path("/nonexistent/fb-shell", &[], Duration::from_secs(1)),
            None
        );
    }

    #[test]
    fn test_login_shell_path_captured_once() {
        let cache = LoginShellPath::new();
        let calls = AtomicUsize::new(0);
        let capture = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Some("/a:/b".to_string())
        };

        assert_eq!(cache.get_or_init_with(capture), Some("/a:/b"));
        assert_eq!(cache.get_or_init_with(capture), Some("/a:/b"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_login_shell_path_concurrent_first_use() {
        let cache = Arc::new(LoginShellPath::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cache
                        .get_or_init_with(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            None
                        })
                        .map(str::to_string)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), None);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
