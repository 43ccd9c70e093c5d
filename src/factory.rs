//! Real client factory: settings lookup, config discovery, process launch.

use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::client::LanguageClient;
use crate::discovery::discover_config;
use crate::registry::{ClientFactory, CreateError};
use crate::settings::{FolderSettings, ServerLaunch};
use crate::types::{ClientEvent, LaunchProfile, WorkspaceFolder};

/// Spawns one GraphQL language server per folder.
///
/// The settings closure is the editor's per-folder configuration lookup;
/// it runs once per creation attempt, when the folder is first seen.
pub struct ServerFactory<S> {
    server_bin: PathBuf,
    profile: LaunchProfile,
    settings: S,
    event_tx: mpsc::Sender<ClientEvent>,
}

impl<S> ServerFactory<S>
where
    S: Fn(&WorkspaceFolder) -> FolderSettings + Send + Sync,
{
    pub fn new(
        server_bin: impl Into<PathBuf>,
        profile: LaunchProfile,
        settings: S,
        event_tx: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            server_bin: server_bin.into(),
            profile,
            settings,
            event_tx,
        }
    }
}

impl<S> ClientFactory for ServerFactory<S>
where
    S: Fn(&WorkspaceFolder) -> FolderSettings + Send + Sync,
{
    type Client = LanguageClient;

    fn create(
        &self,
        folder: &WorkspaceFolder,
    ) -> impl Future<Output = Result<LanguageClient, CreateError>> + Send {
        async move {
            let Some(folder_path) = folder.path() else {
                return Err(CreateError::ConfigNotFound(format!(
                    "folder URI {} has no local path",
                    folder.uri()
                )));
            };

            let settings = (self.settings)(folder);
            let config_root = settings.config_root(&folder_path);
            let config_file =
                discover_config(&config_root).map_err(|e| CreateError::ConfigNotFound(e.to_string()))?;
            tracing::debug!(
                folder = %folder.key(),
                config = %config_file.display(),
                "GraphQL config found"
            );

            let launch = ServerLaunch::build(&self.server_bin, &settings, &folder_path, self.profile);
            LanguageClient::start(folder, &launch, self.event_tx.clone())
                .await
                .map_err(|e| CreateError::InitFailed(format!("{e:#}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::event_channel;

    fn factory(
        server_bin: &str,
    ) -> ServerFactory<impl Fn(&WorkspaceFolder) -> FolderSettings + Send + Sync> {
        let (tx, _rx) = event_channel();
        ServerFactory::new(
            server_bin,
            LaunchProfile::Normal,
            |_: &WorkspaceFolder| FolderSettings::default(),
            tx,
        )
    }

    #[tokio::test]
    async fn folder_without_config_is_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let folder = WorkspaceFolder::from_path(dir.path(), "empty").unwrap();

        let err = factory("graphql-lsp").create(&folder).await.unwrap_err();
        assert!(matches!(err, CreateError::ConfigNotFound(_)));
        assert!(err.to_string().contains("no GraphQL config"));
    }

    #[tokio::test]
    async fn missing_server_binary_is_init_failed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".graphqlrc.yml"), "schema: s.graphql\n").unwrap();
        let folder = WorkspaceFolder::from_path(dir.path(), "api").unwrap();

        let err = factory("definitely-not-a-real-binary-xyz")
            .create(&folder)
            .await
            .unwrap_err();
        assert!(matches!(err, CreateError::InitFailed(_)));
        assert!(err.to_string().contains("not found in PATH"));
    }

    #[tokio::test]
    async fn non_file_uri_folder_is_config_not_found() {
        let folder = WorkspaceFolder::new(
            url::Url::parse("https://example.com/repo").unwrap(),
            "remote",
        );
        let err = factory("graphql-lsp").create(&folder).await.unwrap_err();
        assert!(matches!(err, CreateError::ConfigNotFound(_)));
    }
}
