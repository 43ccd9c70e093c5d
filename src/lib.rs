//! Per-workspace-folder lifecycle management for GraphQL language servers.
//!
//! The embedding editor feeds folder-set changes into a [`WorkspaceRegistry`]
//! and consumes diagnostics snapshots and per-folder statuses for its UI.
//! Each folder with a discoverable GraphQL config gets its own spawned
//! server process, spoken to over `Content-Length` framed JSON-RPC; a folder
//! without one stays inert until it is removed and re-added.
//!
//! ```no_run
//! use gql_lsp::{
//!     FolderSettings, LaunchProfile, ServerFactory, WorkspaceFolder, WorkspaceRegistry,
//!     event_channel,
//! };
//!
//! # async fn demo() {
//! let (event_tx, event_rx) = event_channel();
//! let factory = ServerFactory::new(
//!     "graphql-lsp",
//!     LaunchProfile::Normal,
//!     |_folder: &WorkspaceFolder| FolderSettings::default(),
//!     event_tx,
//! );
//! let mut registry = WorkspaceRegistry::new(factory, event_rx);
//!
//! let folders = vec![WorkspaceFolder::from_path("/projects/api".as_ref(), "api").unwrap()];
//! registry.reconcile(&folders).await;
//! registry.poll_events(64);
//! let _status = registry.snapshot().status_string();
//! registry.dispose_all().await;
//! # }
//! ```

pub mod discovery;
pub mod settings;
pub mod types;

pub(crate) mod codec;
pub(crate) mod diagnostics;
pub(crate) mod protocol;

mod client;
mod factory;
mod registry;

pub use client::LanguageClient;
pub use factory::ServerFactory;
pub use registry::{
    ClientFactory, CreateError, EVENT_CHANNEL_CAPACITY, ReconcilePlan, ReconcileSummary,
    WorkspaceClient, WorkspaceRegistry, event_channel,
};
pub use settings::{FolderSettings, ServerLaunch};
pub use types::{
    ClientEvent, Diagnostic, DiagnosticSeverity, DiagnosticsSnapshot, FolderKey, FolderStatus,
    InertReason, LaunchProfile, LogLevel, StopReason, WorkspaceFolder,
};
