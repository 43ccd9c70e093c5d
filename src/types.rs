//! Public types consumed by the embedding editor.
//!
//! The editor constructs [`WorkspaceFolder`]s from its open project roots,
//! receives [`ClientEvent`]s through the registry, and reads
//! [`DiagnosticsSnapshot`]s and [`FolderStatus`]es for UI display.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

/// A root directory the editor treats as one project context.
///
/// Identity is the URI, not the display name; two folders with the same URI
/// are the same folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFolder {
    uri: Url,
    name: String,
}

impl WorkspaceFolder {
    #[must_use]
    pub fn new(uri: Url, name: impl Into<String>) -> Self {
        Self {
            uri,
            name: name.into(),
        }
    }

    /// Build a folder from a local directory path.
    ///
    /// Returns `None` when the path is not absolute (it cannot form a file
    /// URI).
    #[must_use]
    pub fn from_path(path: &Path, name: impl Into<String>) -> Option<Self> {
        let uri = Url::from_directory_path(path).ok()?;
        Some(Self::new(uri, name))
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry key for this folder, derived from the URI.
    ///
    /// Trailing slashes are stripped so `file:///a/b` and `file:///a/b/`
    /// name the same folder.
    #[must_use]
    pub fn key(&self) -> FolderKey {
        FolderKey(self.uri.as_str().trim_end_matches('/').to_string())
    }

    /// Local filesystem path, when the URI has one.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.uri.to_file_path().ok()
    }
}

/// Opaque per-folder identity used as the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderKey(String);

impl FolderKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server log verbosity, passed through as `--loglevel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the server process is launched.
///
/// `Debug` adds a fixed inspector flag set to the runtime invocation so the
/// server can be attached to; everything else is shared between profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchProfile {
    #[default]
    Normal,
    Debug,
}

impl LaunchProfile {
    pub(crate) fn inspector_args(self) -> &'static [&'static str] {
        match self {
            Self::Normal => &[],
            Self::Debug => &["--nolazy", "--inspect=6009"],
        }
    }
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the LSP-defined range; the boundary
    /// decides the fallback.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A single diagnostic published by a language server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    /// 0-indexed line.
    pub line: u32,
    /// 0-indexed column.
    pub col: u32,
    /// Reporting tool, e.g. "graphql-language-service".
    pub source: String,
}

impl Diagnostic {
    /// Format as `path:line:col: severity: message` (1-indexed for display).
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        format!(
            "{}:{}:{}: {}: [{}] {}",
            path.display(),
            self.line + 1,
            self.col + 1,
            self.severity.label(),
            self.source,
            self.message,
        )
    }
}

/// An event emitted by a per-folder client task.
#[derive(Debug)]
pub enum ClientEvent {
    /// Diagnostics updated for a file owned by `folder`.
    Diagnostics {
        folder: FolderKey,
        path: PathBuf,
        items: Vec<Diagnostic>,
    },
    /// The server process is gone. Terminal for the folder's client.
    Stopped {
        folder: FolderKey,
        reason: StopReason,
    },
}

/// Why a server stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Exited,
    Failed(String),
}

/// Registry-level status of one workspace folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderStatus {
    /// A language client is running for this folder.
    Active,
    /// No client; the folder stays this way until removed and re-added.
    Inert(InertReason),
}

/// Why a folder has no running client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InertReason {
    /// Config discovery failed when the folder was first seen.
    ConfigMissing(String),
    /// The server could not be spawned or failed its initialize handshake.
    InitFailed(String),
    /// The server ran and then stopped.
    Stopped(String),
}

impl InertReason {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigMissing(m) | Self::InitFailed(m) | Self::Stopped(m) => m,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "no config",
            Self::InitFailed(_) => "init failed",
            Self::Stopped(_) => "stopped",
        }
    }
}

/// Immutable snapshot of all diagnostics across folders, for UI rendering.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-file diagnostics, sorted with error-containing files first.
    files: Vec<(PathBuf, Vec<Diagnostic>)>,
}

impl DiagnosticsSnapshot {
    pub(crate) fn new(files: Vec<(PathBuf, Vec<Diagnostic>)>) -> Self {
        Self { files }
    }

    /// Per-file diagnostics, sorted with error-containing files first.
    #[must_use]
    pub fn files(&self) -> &[(PathBuf, Vec<Diagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn count_by_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.files
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| d.severity == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Warning)
    }

    /// Total diagnostic count across all files and severities.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    /// Compact status string like `E:3 W:5`; empty when there is nothing.
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
