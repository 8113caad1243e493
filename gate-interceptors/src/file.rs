//! File opening capability and its policy-checking decorator.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use gate_policy::PolicyEvaluator;
use gate_primitives::{ActionDescriptor, ActionType};
use tracing::trace;

use crate::error::{InterceptError, InterceptResult};
use crate::guard::enforce;

/// Path prefixes that never reach the evaluator.
pub const DEFAULT_SKIP_PREFIXES: [&str; 3] = ["/dev/", "/proc/", "/sys/"];

/// How a file is opened, spelled like C `fopen` modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// `r`
    #[default]
    Read,
    /// `w`: create or truncate.
    Write,
    /// `a`: create or append.
    Append,
    /// `x`: create, failing if the file exists.
    CreateNew,
    /// `r+`
    ReadWrite,
    /// `w+`
    ReadWriteTruncate,
    /// `a+`
    ReadAppend,
}

impl OpenMode {
    /// Returns the mode string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Write => "w",
            Self::Append => "a",
            Self::CreateNew => "x",
            Self::ReadWrite => "r+",
            Self::ReadWriteTruncate => "w+",
            Self::ReadAppend => "a+",
        }
    }

    /// Returns the access class reported to the evaluator.
    #[must_use]
    pub const fn access(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write | Self::Append | Self::CreateNew => "write",
            Self::ReadWrite | Self::ReadWriteTruncate | Self::ReadAppend => "readwrite",
        }
    }

    /// Builds the matching [`OpenOptions`].
    #[must_use]
    pub fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::Read => options.read(true),
            Self::Write => options.write(true).create(true).truncate(true),
            Self::Append => options.append(true).create(true),
            Self::CreateNew => options.write(true).create_new(true),
            Self::ReadWrite => options.read(true).write(true),
            Self::ReadWriteTruncate => options.read(true).write(true).create(true).truncate(true),
            Self::ReadAppend => options.read(true).append(true).create(true),
        };
        options
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenMode {
    type Err = InterceptError;

    fn from_str(s: &str) -> InterceptResult<Self> {
        // Binary and text flags do not change access.
        let mode: String = s.chars().filter(|c| !matches!(c, 'b' | 't')).collect();
        match mode.as_str() {
            "r" => Ok(Self::Read),
            "w" => Ok(Self::Write),
            "a" => Ok(Self::Append),
            "x" => Ok(Self::CreateNew),
            "r+" => Ok(Self::ReadWrite),
            "w+" => Ok(Self::ReadWriteTruncate),
            "a+" => Ok(Self::ReadAppend),
            _ => Err(InterceptError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported open mode `{s}`"),
            ))),
        }
    }
}

/// Describes opening `path` as a `file_access` action.
#[must_use]
pub fn open_action(path: &Path, mode: OpenMode) -> ActionDescriptor {
    ActionDescriptor::new(ActionType::FileAccess, "open")
        .with_argument("path", path.to_string_lossy().into_owned())
        .with_argument("mode", mode.as_str())
        .with_argument("access", mode.access())
}

/// Capability to open files.
pub trait FileOpener: Send + Sync {
    /// Opens `path` in `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`InterceptError::Io`] when the open fails, or
    /// [`InterceptError::Blocked`] from guarded openers.
    fn open(&self, path: &Path, mode: OpenMode) -> InterceptResult<File>;
}

/// Opener backed by [`std::fs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFileOpener;

impl FileOpener for SystemFileOpener {
    fn open(&self, path: &Path, mode: OpenMode) -> InterceptResult<File> {
        Ok(mode.options().open(path)?)
    }
}

/// Opener that asks the policy evaluator before delegating.
///
/// Paths under a skip prefix are opened without evaluation.
pub struct GuardedFileOpener<O> {
    inner: O,
    evaluator: Arc<dyn PolicyEvaluator>,
    skip_prefixes: Vec<PathBuf>,
}

impl<O> fmt::Debug for GuardedFileOpener<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedFileOpener")
            .field("skip_prefixes", &self.skip_prefixes)
            .finish_non_exhaustive()
    }
}

impl<O> GuardedFileOpener<O>
where
    O: FileOpener,
{
    /// Wraps `inner`, skipping [`DEFAULT_SKIP_PREFIXES`].
    #[must_use]
    pub fn new(inner: O, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self {
            inner,
            evaluator,
            skip_prefixes: DEFAULT_SKIP_PREFIXES.iter().map(PathBuf::from).collect(),
        }
    }

    /// Adds a path prefix that bypasses evaluation.
    #[must_use]
    pub fn with_skip_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.skip_prefixes.push(prefix.into());
        self
    }

    /// Returns true when `path` bypasses evaluation.
    #[must_use]
    pub fn is_skipped(&self, path: &Path) -> bool {
        self.skip_prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

impl<O> FileOpener for GuardedFileOpener<O>
where
    O: FileOpener,
{
    fn open(&self, path: &Path, mode: OpenMode) -> InterceptResult<File> {
        if self.is_skipped(path) {
            trace!(path = %path.display(), "skipping evaluation for system path");
        } else {
            let action = open_action(path, mode);
            enforce(&action, self.evaluator.decide(&action))?;
        }
        self.inner.open(path, mode)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::Mutex;

    use gate_policy::GateResult;
    use gate_primitives::{Decision, Outcome};

    use super::*;

    #[derive(Default)]
    struct WriteDenier {
        seen: Mutex<Vec<ActionDescriptor>>,
    }

    impl PolicyEvaluator for WriteDenier {
        fn decide(&self, action: &ActionDescriptor) -> GateResult<Decision> {
            self.seen.lock().unwrap().push(action.clone());
            let outcome = if action.arguments()["access"] == "read" {
                Outcome::Allow
            } else {
                Outcome::Deny
            };
            Ok(Decision::new(outcome).with_reason("read-only workspace"))
        }
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gate-interceptors-{}-{name}", std::process::id()))
    }

    #[test]
    fn parses_modes_and_access() {
        assert_eq!("rb".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("w".parse::<OpenMode>().unwrap().access(), "write");
        assert_eq!("a".parse::<OpenMode>().unwrap().access(), "write");
        assert_eq!("x".parse::<OpenMode>().unwrap().access(), "write");
        assert_eq!("r+".parse::<OpenMode>().unwrap().access(), "readwrite");
        assert_eq!("a+b".parse::<OpenMode>().unwrap(), OpenMode::ReadAppend);
        assert!("q".parse::<OpenMode>().is_err());
    }

    #[test]
    fn describes_file_access_action() {
        let action = open_action(Path::new("/etc/passwd"), OpenMode::ReadWrite);

        assert_eq!(action.action_type(), &ActionType::FileAccess);
        assert_eq!(action.action_name(), "open");
        assert_eq!(action.arguments()["path"], "/etc/passwd");
        assert_eq!(action.arguments()["mode"], "r+");
        assert_eq!(action.arguments()["access"], "readwrite");
    }

    #[test]
    fn denied_write_is_blocked_and_file_untouched() {
        let evaluator = Arc::new(WriteDenier::default());
        let opener = GuardedFileOpener::new(SystemFileOpener, evaluator.clone());
        let path = scratch("denied");

        let err = opener.open(&path, OpenMode::Write).unwrap_err();

        assert!(err.is_blocked());
        assert_eq!(err.to_string(), "action denied - read-only workspace");
        assert!(!path.exists());
        assert_eq!(evaluator.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn allowed_read_is_delegated() {
        let path = scratch("allowed");
        File::create(&path)
            .unwrap()
            .write_all(b"contents")
            .unwrap();
        let opener = GuardedFileOpener::new(SystemFileOpener, Arc::new(WriteDenier::default()));

        let mut contents = String::new();
        opener
            .open(&path, OpenMode::Read)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(contents, "contents");
    }

    #[test]
    fn system_paths_bypass_evaluation() {
        let evaluator = Arc::new(WriteDenier::default());
        let opener = GuardedFileOpener::new(SystemFileOpener, evaluator.clone())
            .with_skip_prefix("/opt/runtime");

        assert!(opener.is_skipped(Path::new("/dev/null")));
        assert!(opener.is_skipped(Path::new("/proc/self/status")));
        assert!(opener.is_skipped(Path::new("/opt/runtime/lib.so")));
        assert!(!opener.is_skipped(Path::new("/device/null")));
        assert!(!opener.is_skipped(Path::new("/home/agent/notes.txt")));

        #[cfg(unix)]
        {
            opener.open(Path::new("/dev/null"), OpenMode::Write).unwrap();
            assert!(evaluator.seen.lock().unwrap().is_empty());
        }
    }
}
