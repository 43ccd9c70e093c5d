//! Per-folder settings and server launch parameters.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::{LaunchProfile, LogLevel};

/// Editor-provided settings for one workspace folder.
///
/// Deserialized from the editor's per-folder configuration; every field has
/// a default so an empty configuration section is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FolderSettings {
    /// Config discovery root; relative paths are joined to the folder path.
    pub root_dir: Option<PathBuf>,
    /// Interpreter override used to run the server binary.
    pub runtime: Option<PathBuf>,
    /// Path handed to the server as `--gql-path`; relative to the folder
    /// root unless absolute.
    pub node_path: Option<PathBuf>,
    /// Server log verbosity.
    pub loglevel: LogLevel,
}

impl FolderSettings {
    /// Directory in which config discovery runs.
    #[must_use]
    pub fn config_root(&self, folder_path: &Path) -> PathBuf {
        match &self.root_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => folder_path.join(dir),
            None => folder_path.to_path_buf(),
        }
    }

    /// Resolved `--gql-path` value, when configured.
    #[must_use]
    pub fn gql_path(&self, folder_path: &Path) -> Option<PathBuf> {
        self.node_path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                folder_path.join(p)
            }
        })
    }
}

/// Fully resolved launch parameters for one server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLaunch {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ServerLaunch {
    /// Build the command line for a folder from its settings.
    ///
    /// With a `runtime` override the server binary becomes the first argument
    /// of the runtime. The debug profile's inspector flags only apply to a
    /// runtime invocation; without one they are dropped.
    #[must_use]
    pub fn build(
        server_bin: &Path,
        settings: &FolderSettings,
        folder_path: &Path,
        profile: LaunchProfile,
    ) -> Self {
        let config_dir = settings.config_root(folder_path);
        let mut server_args = vec![format!("--config-dir={}", config_dir.display())];
        if let Some(gql) = settings.gql_path(folder_path) {
            server_args.push(format!("--gql-path={}", gql.display()));
        }
        server_args.push(format!("--loglevel={}", settings.loglevel));
        server_args.push("--watchman=true".to_string());
        server_args.push("--auto-download-gql=false".to_string());

        match &settings.runtime {
            Some(runtime) => {
                let mut args: Vec<String> = profile
                    .inspector_args()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                args.push(server_bin.display().to_string());
                args.extend(server_args);
                Self {
                    program: runtime.clone(),
                    args,
                }
            }
            None => {
                if profile == LaunchProfile::Debug {
                    tracing::debug!("inspector flags ignored without a runtime override");
                }
                Self {
                    program: server_bin.to_path_buf(),
                    args: server_args,
                }
            }
        }
    }
}
