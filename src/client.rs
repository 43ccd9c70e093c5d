//! Language client — owns a spawned server process and its LSP session.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{MessageReader, MessageWriter};
use crate::protocol::{self, Notification, PublishDiagnosticsParams, Request};
use crate::registry::WorkspaceClient;
use crate::settings::ServerLaunch;
use crate::types::{ClientEvent, FolderKey, StopReason, WorkspaceFolder};

const REQUEST_TIMEOUT_SECS: u64 = 30;

const SHUTDOWN_GRACE_SECS: u64 = 2;

const OUTBOUND_CAPACITY: usize = 64;

/// Language id sent with every `didOpen`.
const LANGUAGE_ID: &str = "graphql";

/// Env var patterns never forwarded to a spawned server.
const ENV_DENYLIST: &[&str] = &[
    "*_TOKEN",
    "*_SECRET*",
    "*_KEY",
    "*_CREDENTIAL*",
    "*_PASSWORD*",
    "AWS_*",
    "AZURE_*",
    "GCP_*",
    "GITHUB_*",
    "NPM_*",
];

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

enum Outbound {
    Frame(serde_json::Value),
    Close,
}

enum Incoming {
    Response {
        id: u64,
        body: serde_json::Value,
    },
    ServerRequest {
        id: serde_json::Value,
        method: String,
    },
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

fn secret_denylist() -> globset::GlobSet {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in ENV_DENYLIST {
        if let Ok(glob) = globset::GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
        {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| globset::GlobSet::empty())
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

fn parse_incoming(frame: &serde_json::Value) -> Option<Incoming> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, has_result_or_error) {
        (Some(id_val), None, true) => Some(Incoming::Response {
            id: id_val.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id_val), Some(method), _) => Some(Incoming::ServerRequest {
            id: id_val.clone(),
            method,
        }),
        (None, Some(method), _) => Some(Incoming::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// A running per-folder language client.
///
/// Holding one is proof of a successful spawn and initialize handshake;
/// there is no separate "started" state. The child carries
/// `kill_on_drop(true)`, so dropping the handle is a hard stop.
#[derive(Debug)]
pub struct LanguageClient {
    folder: FolderKey,
    root: PathBuf,
    child: Child,
    writer_tx: mpsc::Sender<Outbound>,
    next_id: u64,
    pending: PendingMap,
    /// Documents we've sent `didOpen` for.
    opened_docs: HashSet<String>,
    doc_versions: HashMap<String, i32>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

impl LanguageClient {
    /// Spawn the server for `folder` and run the initialize handshake.
    ///
    /// Any failure here is terminal for the folder: the registry records it
    /// and does not retry until the folder is removed and re-added.
    pub async fn start(
        folder: &WorkspaceFolder,
        launch: &ServerLaunch,
        event_tx: mpsc::Sender<ClientEvent>,
    ) -> Result<Self> {
        let root = folder
            .path()
            .with_context(|| format!("folder URI {} has no local path", folder.uri()))?;
        let program = which::which(&launch.program)
            .with_context(|| format!("{} not found in PATH", launch.program.display()))?;

        let mut cmd = Command::new(&program);
        cmd.args(&launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // The server inherits our environment minus anything secret-bearing.
        let denylist = secret_denylist();
        for (key, _) in std::env::vars() {
            if denylist.is_match(&key) {
                cmd.env_remove(&key);
            }
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", program.display()))?;

        let stdout = child.stdout.take().context("no stdout from child")?;
        let stdin = child.stdin.take().context("no stdin from child")?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (writer_tx, mut writer_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = MessageWriter::new(stdin);
            while let Some(out) = writer_rx.recv().await {
                match out {
                    Outbound::Frame(frame) => {
                        if let Err(e) = writer.send(&frame).await {
                            tracing::warn!("LSP write error: {e:#}");
                            break;
                        }
                    }
                    Outbound::Close => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_event_tx = event_tx.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_folder = folder.key();
        let reader_root = normalize_path(&root);
        let reader_handle = tokio::spawn(async move {
            let mut reader = MessageReader::new(stdout);
            loop {
                match reader.next().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_frame(
                            &frame,
                            &reader_pending,
                            &reader_event_tx,
                            &reader_writer_tx,
                            &reader_folder,
                            &reader_root,
                        )
                        .await;
                    }
                    Ok(None) => {
                        tracing::info!(folder = %reader_folder, "language server closed stdout");
                        let _ = reader_event_tx
                            .send(ClientEvent::Stopped {
                                folder: reader_folder.clone(),
                                reason: StopReason::Exited,
                            })
                            .await;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(folder = %reader_folder, "LSP read error: {e:#}");
                        let _ = reader_event_tx
                            .send(ClientEvent::Stopped {
                                folder: reader_folder.clone(),
                                reason: StopReason::Failed(format!("{e:#}")),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        let mut client = Self {
            folder: folder.key(),
            root,
            child,
            writer_tx,
            next_id: 1,
            pending,
            opened_docs: HashSet::new(),
            doc_versions: HashMap::new(),
            reader_handle,
            writer_handle,
        };

        client.initialize(folder).await?;

        Ok(client)
    }

    async fn dispatch_frame(
        frame: &serde_json::Value,
        pending: &Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
        event_tx: &mpsc::Sender<ClientEvent>,
        writer_tx: &mpsc::Sender<Outbound>,
        folder: &FolderKey,
        root: &Path,
    ) {
        let Some(incoming) = parse_incoming(frame) else {
            tracing::trace!(folder = %folder, "ignoring malformed JSON-RPC frame");
            return;
        };

        match incoming {
            Incoming::Response { id, body } => {
                let sender = pending.lock().await.remove(&id);
                if let Some(tx) = sender {
                    let _ = tx.send(body);
                }
            }
            Incoming::ServerRequest { id, method } => {
                // Servers send client/registerCapability, workspace/configuration
                // and friends; they must get a reply or they may block.
                tracing::debug!(
                    folder = %folder,
                    "server request {method} — replying method not found"
                );
                let response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("Method not found: {method}")
                    }
                });
                let _ = writer_tx.send(Outbound::Frame(response)).await;
            }
            Incoming::Notification { method, params } => {
                Self::handle_notification(folder, &method, params, event_tx, root).await;
            }
        }
    }

    async fn handle_notification(
        folder: &FolderKey,
        method: &str,
        params: Option<serde_json::Value>,
        event_tx: &mpsc::Sender<ClientEvent>,
        root: &Path,
    ) {
        match method {
            "textDocument/publishDiagnostics" => {
                let Some(params) = params else { return };
                match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(diag_params) => {
                        let Some(path) = protocol::file_uri_to_path(&diag_params.uri) else {
                            return;
                        };
                        let normalized = normalize_path(&path);
                        if !normalized.starts_with(root) {
                            tracing::warn!(
                                folder = %folder,
                                "diagnostics for path outside the folder: {}",
                                path.display()
                            );
                            return;
                        }
                        let items = diag_params
                            .diagnostics
                            .iter()
                            .map(protocol::WireDiagnostic::to_diagnostic)
                            .collect();
                        let _ = event_tx
                            .send(ClientEvent::Diagnostics {
                                folder: folder.clone(),
                                path,
                                items,
                            })
                            .await;
                    }
                    Err(e) => {
                        tracing::debug!(
                            folder = %folder,
                            "failed to parse publishDiagnostics: {e}"
                        );
                    }
                }
            }
            _ => {
                tracing::trace!(folder = %folder, "ignoring notification: {method}");
            }
        }
    }

    async fn initialize(&mut self, folder: &WorkspaceFolder) -> Result<()> {
        let root_uri =
            protocol::path_to_file_uri(&self.root).context("converting folder root to URI")?;

        let params = protocol::initialize_params(root_uri.as_str(), folder.name());
        let response = self.send_request("initialize", Some(params)).await?;

        if let Some(error) = response.get("error") {
            bail!(
                "initialize failed: {}",
                error["message"].as_str().unwrap_or("unknown error")
            );
        }

        self.send_notification("initialized", Some(serde_json::json!({})))
            .await?;

        Ok(())
    }

    async fn send_request(
        &mut self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request::new(id, method, params);
        let frame = serde_json::to_value(&request).context("serializing request")?;
        if self.writer_tx.send(Outbound::Frame(frame)).await.is_err() {
            self.pending.lock().await.remove(&id);
            bail!("writer channel closed");
        }

        match tokio::time::timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS), rx).await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Reader task is gone; drop the pending entry rather than leak it.
                self.pending.lock().await.remove(&id);
                bail!("response channel dropped");
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                bail!("request timed out");
            }
        }
    }

    async fn send_notification(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let notification = Notification::new(method, params);
        let frame = serde_json::to_value(&notification).context("serializing notification")?;
        self.writer_tx
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| anyhow::anyhow!("writer channel closed"))?;
        Ok(())
    }

    /// Forward a file create/modify as `didOpen` on first touch, `didChange`
    /// with a bumped version after.
    async fn notify_change(&mut self, path: &Path, text: &str) -> Result<()> {
        let uri = protocol::path_to_file_uri(path)
            .context("converting changed file to URI")?
            .to_string();

        if self.opened_docs.contains(&uri) {
            let version = self.doc_versions.entry(uri.clone()).or_insert(0);
            *version += 1;
            let params = protocol::did_change_params(&uri, *version, text);
            self.send_notification("textDocument/didChange", Some(params))
                .await
        } else {
            let version = 1;
            self.doc_versions.insert(uri.clone(), version);
            self.opened_docs.insert(uri.clone());
            let params = protocol::did_open_params(&uri, LANGUAGE_ID, version, text);
            self.send_notification("textDocument/didOpen", Some(params))
                .await
        }
    }

    /// Graceful shutdown: `shutdown` request, `exit` notification, bounded
    /// wait, then kill. Consumes self.
    async fn shutdown(mut self) {
        if let Ok(response) = self.send_request("shutdown", None).await
            && response.get("error").is_none()
        {
            let _ = self.send_notification("exit", None).await;
        }

        let _ = self.writer_tx.send(Outbound::Close).await;

        let waited = tokio::time::timeout(
            std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS),
            self.child.wait(),
        )
        .await;

        if waited.is_err() {
            tracing::debug!(folder = %self.folder, "server didn't exit in time, killing");
            let _ = self.child.kill().await;
        }
    }
}

impl WorkspaceClient for LanguageClient {
    fn notify_file_changed(
        &mut self,
        path: &Path,
        text: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        self.notify_change(path, text)
    }

    fn dispose(self) -> impl Future<Output = ()> + Send {
        self.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Diagnostic, DiagnosticSeverity};
    use url::Url;

    fn test_folder_key() -> FolderKey {
        WorkspaceFolder::new(Url::parse("file:///projects/api").unwrap(), "api").key()
    }

    #[cfg(windows)]
    fn test_root() -> PathBuf {
        PathBuf::from(r"C:\projects\api")
    }

    #[cfg(not(windows))]
    fn test_root() -> PathBuf {
        PathBuf::from("/projects/api")
    }

    fn test_channels() -> (
        PendingMap,
        mpsc::Sender<ClientEvent>,
        mpsc::Receiver<ClientEvent>,
        mpsc::Sender<Outbound>,
        mpsc::Receiver<Outbound>,
    ) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(32);
        let (writer_tx, writer_rx) = mpsc::channel(32);
        (pending, event_tx, event_rx, writer_tx, writer_rx)
    }

    #[tokio::test]
    async fn response_routes_to_pending() {
        let (pending, event_tx, _event_rx, writer_tx, _writer_rx) = test_channels();
        let folder = test_folder_key();
        let root = test_root();

        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(1, tx);

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "capabilities": {} }
        });

        LanguageClient::dispatch_frame(&frame, &pending, &event_tx, &writer_tx, &folder, &root)
            .await;

        let response = rx.await.unwrap();
        assert!(response["result"]["capabilities"].is_object());
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn error_response_routes_to_pending() {
        let (pending, event_tx, _event_rx, writer_tx, _writer_rx) = test_channels();
        let folder = test_folder_key();
        let root = test_root();

        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(2, tx);

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": { "code": -32600, "message": "invalid request" }
        });

        LanguageClient::dispatch_frame(&frame, &pending, &event_tx, &writer_tx, &folder, &root)
            .await;

        assert!(rx.await.unwrap()["error"].is_object());
    }

    #[tokio::test]
    async fn diagnostics_notification_becomes_folder_event() {
        let (pending, event_tx, mut event_rx, writer_tx, _writer_rx) = test_channels();
        let folder = test_folder_key();
        let root = test_root();

        #[cfg(windows)]
        let uri = "file:///C:/projects/api/schema.graphql";
        #[cfg(not(windows))]
        let uri = "file:///projects/api/schema.graphql";

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": uri,
                "diagnostics": [{
                    "range": { "start": { "line": 2, "character": 4 }, "end": { "line": 2, "character": 9 } },
                    "severity": 1,
                    "source": "graphql-language-service",
                    "message": "Unknown type \"Usr\"."
                }]
            }
        });

        LanguageClient::dispatch_frame(&frame, &pending, &event_tx, &writer_tx, &folder, &root)
            .await;

        match event_rx.try_recv().unwrap() {
            ClientEvent::Diagnostics {
                folder: event_folder,
                path,
                items,
            } => {
                assert_eq!(event_folder, folder);
                assert_eq!(path, test_root().join("schema.graphql"));
                assert_eq!(
                    items,
                    vec![Diagnostic {
                        severity: DiagnosticSeverity::Error,
                        message: "Unknown type \"Usr\".".to_string(),
                        line: 2,
                        col: 4,
                        source: "graphql-language-service".to_string(),
                    }]
                );
            }
            other @ ClientEvent::Stopped { .. } => {
                panic!("expected Diagnostics event, got {other:?}")
            }
        }
    }

    #[tokio::test]
    async fn diagnostics_outside_folder_rejected() {
        let (pending, event_tx, mut event_rx, writer_tx, _writer_rx) = test_channels();
        let folder = test_folder_key();
        let root = test_root();

        #[cfg(windows)]
        let uri = "file:///C:/other/schema.graphql";
        #[cfg(not(windows))]
        let uri = "file:///other/schema.graphql";

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": uri,
                "diagnostics": [{
                    "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } },
                    "severity": 1,
                    "message": "out of scope"
                }]
            }
        });

        LanguageClient::dispatch_frame(&frame, &pending, &event_tx, &writer_tx, &folder, &root)
            .await;

        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn path_traversal_diagnostics_rejected() {
        let (pending, event_tx, mut event_rx, writer_tx, _writer_rx) = test_channels();
        let folder = test_folder_key();
        let root = test_root();

        #[cfg(windows)]
        let uri = "file:///C:/projects/api/../../etc/hosts";
        #[cfg(not(windows))]
        let uri = "file:///projects/api/../../etc/hosts";

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": uri,
                "diagnostics": [{
                    "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } },
                    "severity": 1,
                    "message": "traversal"
                }]
            }
        });

        LanguageClient::dispatch_frame(&frame, &pending, &event_tx, &writer_tx, &folder, &root)
            .await;

        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn server_request_gets_method_not_found() {
        let (pending, event_tx, _event_rx, writer_tx, mut writer_rx) = test_channels();
        let folder = test_folder_key();
        let root = test_root();

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "workspace/configuration",
            "params": {}
        });

        LanguageClient::dispatch_frame(&frame, &pending, &event_tx, &writer_tx, &folder, &root)
            .await;

        match writer_rx.try_recv().unwrap() {
            Outbound::Frame(response) => {
                assert_eq!(response["id"], 5);
                assert_eq!(response["error"]["code"], -32601);
                assert!(
                    response["error"]["message"]
                        .as_str()
                        .unwrap()
                        .contains("workspace/configuration")
                );
            }
            Outbound::Close => panic!("expected Frame, got Close"),
        }
    }

    #[tokio::test]
    async fn unknown_notification_ignored() {
        let (pending, event_tx, mut event_rx, writer_tx, mut writer_rx) = test_channels();
        let folder = test_folder_key();
        let root = test_root();

        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "window/logMessage",
            "params": { "type": 3, "message": "hello" }
        });

        LanguageClient::dispatch_frame(&frame, &pending, &event_tx, &writer_tx, &folder, &root)
            .await;

        assert!(event_rx.try_recv().is_err());
        assert!(writer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn response_for_unknown_id_ignored() {
        let (pending, event_tx, _event_rx, writer_tx, _writer_rx) = test_channels();
        let folder = test_folder_key();
        let root = test_root();

        let frame = serde_json::json!({ "jsonrpc": "2.0", "id": 999, "result": {} });
        LanguageClient::dispatch_frame(&frame, &pending, &event_tx, &writer_tx, &folder, &root)
            .await;
    }

    #[test]
    fn denylist_blocks_secret_vars() {
        let denylist = secret_denylist();
        assert!(denylist.is_match("GITHUB_TOKEN"));
        assert!(denylist.is_match("aws_secret_access_key"));
        assert!(denylist.is_match("MY_API_KEY"));
        assert!(denylist.is_match("DB_PASSWORD"));
        assert!(!denylist.is_match("PATH"));
        assert!(!denylist.is_match("HOME"));
    }

    #[test]
    fn normalize_collapses_dot_segments() {
        #[cfg(not(windows))]
        {
            assert_eq!(
                normalize_path(Path::new("/a/b/../c/./d")),
                PathBuf::from("/a/c/d")
            );
        }
        #[cfg(windows)]
        {
            assert_eq!(
                normalize_path(Path::new(r"C:\a\b\..\c\.\d")),
                PathBuf::from(r"C:\a\c\d")
            );
        }
    }
}
