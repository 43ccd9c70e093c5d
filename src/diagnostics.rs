//! Diagnostics store — accumulates per-folder, per-file diagnostics.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::{Diagnostic, DiagnosticsSnapshot, FolderKey};

/// Diagnostics keyed by owning folder, then file.
///
/// Folder ownership matters for lifecycle: when a folder leaves the
/// workspace its diagnostics leave with it.
#[derive(Default)]
pub(crate) struct DiagnosticsStore {
    data: HashMap<FolderKey, HashMap<PathBuf, Vec<Diagnostic>>>,
}

impl DiagnosticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the diagnostics for one file. An empty publish clears it.
    pub fn update(&mut self, folder: FolderKey, path: PathBuf, items: Vec<Diagnostic>) {
        if items.is_empty() {
            if let Some(files) = self.data.get_mut(&folder) {
                files.remove(&path);
                if files.is_empty() {
                    self.data.remove(&folder);
                }
            }
        } else {
            self.data.entry(folder).or_default().insert(path, items);
        }
    }

    /// Drop everything a folder ever reported.
    pub fn drop_folder(&mut self, folder: &FolderKey) {
        self.data.remove(folder);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut files: Vec<(PathBuf, Vec<Diagnostic>)> = self
            .data
            .values()
            .flat_map(|files| files.iter().map(|(p, d)| (p.clone(), d.clone())))
            .collect();

        // Files with errors first, then alphabetical.
        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity.is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity.is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
        });

        DiagnosticsSnapshot::new(files)
    }
}
