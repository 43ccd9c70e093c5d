//! Workspace-folder client registry.
//!
//! One slot per folder key, kept synchronized with the editor's current
//! folder set by [`WorkspaceRegistry::reconcile`]. A folder whose config
//! discovery fails is recorded as inert and is not re-checked until it
//! leaves and re-enters the workspace; a client that fails or stops is
//! likewise terminal for the session.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::diagnostics::DiagnosticsStore;
use crate::types::{
    ClientEvent, DiagnosticsSnapshot, FolderKey, FolderStatus, InertReason, StopReason,
    WorkspaceFolder,
};

/// Channel capacity for events flowing from client tasks to the registry.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Build the event channel shared by the registry and its client factory.
#[must_use]
pub fn event_channel() -> (mpsc::Sender<ClientEvent>, mpsc::Receiver<ClientEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Why creating a client for a folder did not produce one.
///
/// Both kinds are recoverable by design: the folder is recorded as inert and
/// the rest of the workspace is unaffected.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    /// Config discovery failed; logged per folder, no user-facing prompt.
    #[error("no GraphQL config: {0}")]
    ConfigNotFound(String),
    /// The server could not be spawned or failed its initialize handshake;
    /// surfaced to the user once via the reconcile summary.
    #[error("language server failed to initialize: {0}")]
    InitFailed(String),
}

/// Disposable handle to one folder's running client.
pub trait WorkspaceClient: Send {
    /// Forward a file create/modify to the server.
    fn notify_file_changed(
        &mut self,
        path: &Path,
        text: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Shut the client down. Consumes the handle.
    fn dispose(self) -> impl Future<Output = ()> + Send;
}

/// Creates clients for folders — the seam that keeps reconciliation
/// testable without processes.
pub trait ClientFactory {
    type Client: WorkspaceClient;

    fn create(
        &self,
        folder: &WorkspaceFolder,
    ) -> impl Future<Output = Result<Self::Client, CreateError>> + Send;
}

enum Slot<C> {
    Active(C),
    Inert(InertReason),
}

struct FolderSlot<C> {
    folder: WorkspaceFolder,
    /// Local path cached for file routing; `None` for non-file URIs.
    path: Option<PathBuf>,
    slot: Slot<C>,
}

/// What one reconcile pass decided to do, computed before any I/O.
#[derive(Debug, Default)]
pub struct ReconcilePlan<'a> {
    /// Folders to attempt creation for, in input order.
    pub added: Vec<&'a WorkspaceFolder>,
    /// Registry keys to remove (and dispose when live).
    pub removed: Vec<FolderKey>,
}

impl ReconcilePlan<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Outcome of one reconcile pass.
///
/// `init_failures` only carries failures from this pass, so surfacing each
/// entry to the user happens exactly once per failed folder.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub created: usize,
    pub inert: usize,
    pub disposed: usize,
    pub init_failures: Vec<(FolderKey, String)>,
}

/// Per-folder client lifecycle, owned by the embedding editor.
///
/// Created at activation, `dispose_all` at deactivation. Never mutated
/// concurrently: the editor drives it from a single task.
pub struct WorkspaceRegistry<F: ClientFactory> {
    factory: F,
    slots: HashMap<FolderKey, FolderSlot<F::Client>>,
    diagnostics: DiagnosticsStore,
    event_rx: mpsc::Receiver<ClientEvent>,
}

impl<F: ClientFactory> WorkspaceRegistry<F> {
    pub fn new(factory: F, events: mpsc::Receiver<ClientEvent>) -> Self {
        Self {
            factory,
            slots: HashMap::new(),
            diagnostics: DiagnosticsStore::new(),
            event_rx: events,
        }
    }

    /// Diff the registry against `current` without performing any I/O.
    #[must_use]
    pub fn plan<'a>(&self, current: &'a [WorkspaceFolder]) -> ReconcilePlan<'a> {
        let current_keys: HashSet<FolderKey> = current.iter().map(WorkspaceFolder::key).collect();

        let mut seen = HashSet::new();
        let added = current
            .iter()
            .filter(|f| {
                let key = f.key();
                !self.slots.contains_key(&key) && seen.insert(key)
            })
            .collect();

        let removed = self
            .slots
            .keys()
            .filter(|k| !current_keys.contains(k))
            .cloned()
            .collect();

        ReconcilePlan { added, removed }
    }

    /// Synchronize the registry with the editor's current folder set.
    ///
    /// Idempotent: reconciling the same set twice performs no creations or
    /// disposals on the second pass. A folder already recorded — active or
    /// inert — is never re-checked while it stays in the workspace.
    pub async fn reconcile(&mut self, current: &[WorkspaceFolder]) -> ReconcileSummary {
        let ReconcilePlan { added, removed } = self.plan(current);
        let mut summary = ReconcileSummary::default();

        for key in removed {
            if let Some(slot) = self.slots.remove(&key) {
                self.diagnostics.drop_folder(&key);
                if let Slot::Active(client) = slot.slot {
                    tracing::info!(folder = %key, "folder removed, disposing language client");
                    client.dispose().await;
                    summary.disposed += 1;
                } else {
                    tracing::debug!(folder = %key, "folder removed");
                }
            }
        }

        for folder in added {
            let key = folder.key();
            let slot = match self.factory.create(folder).await {
                Ok(client) => {
                    tracing::info!(folder = %key, "language client started");
                    summary.created += 1;
                    Slot::Active(client)
                }
                Err(CreateError::ConfigNotFound(reason)) => {
                    tracing::info!(folder = %key, %reason, "folder inert for this session");
                    summary.inert += 1;
                    Slot::Inert(InertReason::ConfigMissing(reason))
                }
                Err(CreateError::InitFailed(reason)) => {
                    tracing::error!(folder = %key, %reason, "language server failed to initialize");
                    summary.inert += 1;
                    summary.init_failures.push((key.clone(), reason.clone()));
                    Slot::Inert(InertReason::InitFailed(reason))
                }
            };
            self.slots.insert(
                key,
                FolderSlot {
                    path: folder.path(),
                    folder: folder.clone(),
                    slot,
                },
            );
        }

        summary
    }

    /// Dispose every live client; used at editor shutdown.
    ///
    /// Disposals run concurrently and this returns only once all of them
    /// have finished.
    pub async fn dispose_all(&mut self) {
        let slots = std::mem::take(&mut self.slots);
        self.diagnostics = DiagnosticsStore::new();

        let disposals = slots.into_values().filter_map(|s| match s.slot {
            Slot::Active(client) => Some(client.dispose()),
            Slot::Inert(_) => None,
        });
        join_all(disposals).await;
    }

    /// Route a file create/modify to the active client of the folder that
    /// contains `path`. Deepest matching folder wins; a containing folder
    /// without a client swallows the event.
    pub async fn on_file_changed(&mut self, path: &Path, text: &str) {
        let Some(key) = self.owning_folder(path) else {
            return;
        };
        if let Some(FolderSlot {
            slot: Slot::Active(client),
            ..
        }) = self.slots.get_mut(&key)
        {
            if let Err(e) = client.notify_file_changed(path, text).await {
                tracing::warn!(
                    folder = %key,
                    path = %path.display(),
                    "failed to notify language server: {e:#}"
                );
            }
        }
    }

    fn owning_folder(&self, path: &Path) -> Option<FolderKey> {
        self.slots
            .iter()
            .filter(|(_, s)| s.path.as_deref().is_some_and(|root| path.starts_with(root)))
            .max_by_key(|(_, s)| s.path.as_ref().map_or(0, |root| root.components().count()))
            .map(|(key, _)| key.clone())
    }

    /// Drain pending client events, up to `budget`. Non-blocking.
    ///
    /// Diagnostics accumulate in the store; a stop event downgrades the
    /// folder to inert (no auto-restart).
    pub fn poll_events(&mut self, budget: usize) -> usize {
        let mut handled = 0;
        while handled < budget {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Diagnostics {
                folder,
                path,
                items,
            } => {
                // A late event from a client disposed mid-flight is dropped.
                if !self.slots.contains_key(&folder) {
                    return;
                }
                self.diagnostics.update(folder, path, items);
            }
            ClientEvent::Stopped { folder, reason } => {
                let Some(slot) = self.slots.get_mut(&folder) else {
                    return;
                };
                if matches!(slot.slot, Slot::Active(_)) {
                    let message = match reason {
                        StopReason::Exited => "server exited".to_string(),
                        StopReason::Failed(msg) => msg,
                    };
                    tracing::warn!(
                        folder = %folder,
                        %message,
                        "language client stopped; folder inert until re-added"
                    );
                    // Dropping the old client kills the child (kill_on_drop).
                    slot.slot = Slot::Inert(InertReason::Stopped(message));
                }
            }
        }
    }

    /// Immutable snapshot of all diagnostics, for UI rendering.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Status of a single folder, or `None` when it isn't registered.
    #[must_use]
    pub fn status_of(&self, key: &FolderKey) -> Option<FolderStatus> {
        self.slots.get(key).map(|s| match &s.slot {
            Slot::Active(_) => FolderStatus::Active,
            Slot::Inert(reason) => FolderStatus::Inert(reason.clone()),
        })
    }

    /// Per-folder statuses sorted by key — the status-bar source.
    #[must_use]
    pub fn statuses(&self) -> Vec<(FolderKey, FolderStatus)> {
        let mut out: Vec<_> = self
            .slots
            .iter()
            .map(|(key, s)| {
                let status = match &s.slot {
                    Slot::Active(_) => FolderStatus::Active,
                    Slot::Inert(reason) => FolderStatus::Inert(reason.clone()),
                };
                (key.clone(), status)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of folders with a running client.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots
            .values()
            .filter(|s| matches!(s.slot, Slot::Active(_)))
            .count()
    }

    /// Display name of a registered folder, for status rendering.
    #[must_use]
    pub fn folder_name(&self, key: &FolderKey) -> Option<&str> {
        self.slots.get(key).map(|s| s.folder.name())
    }
}
