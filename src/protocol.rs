//! JSON-RPC message construction and LSP parameter types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Diagnostic, DiagnosticSeverity};

/// Diagnostic source used when the server omits one.
const DEFAULT_SOURCE: &str = "graphql";

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub(crate) struct PathToUriError {
    path: PathBuf,
}

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// `initialize` params scoped to a single workspace folder.
///
/// The capability set is deliberately small: document sync plus published
/// diagnostics is all this client consumes.
pub(crate) fn initialize_params(root_uri: &str, folder_name: &str) -> serde_json::Value {
    serde_json::json!({
        "processId": std::process::id(),
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "dynamicRegistration": false,
                    "willSave": false,
                    "willSaveWaitUntil": false,
                    "didSave": false
                },
                "publishDiagnostics": {
                    "relatedInformation": false
                }
            },
            "workspace": {
                "workspaceFolders": true
            }
        },
        "workspaceFolders": [{
            "uri": root_uri,
            "name": folder_name
        }]
    })
}

pub(crate) fn did_open_params(
    uri: &str,
    language_id: &str,
    version: i32,
    text: &str,
) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_change_params(uri: &str, version: i32, text: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "version": version
        },
        "contentChanges": [{
            "text": text
        }]
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<WireDiagnostic>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDiagnostic {
    pub range: WireRange,
    pub severity: Option<u64>,
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRange {
    pub start: WirePosition,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePosition {
    pub line: u32,
    pub character: u32,
}

impl WireDiagnostic {
    /// Missing severity falls back to `Warning`, missing source to "graphql".
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            severity: self
                .severity
                .and_then(DiagnosticSeverity::from_lsp)
                .unwrap_or(DiagnosticSeverity::Warning),
            message: self.message.clone(),
            line: self.range.start.line,
            col: self.range.start.character,
            source: self
                .source
                .clone()
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        }
    }
}

pub(crate) fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

pub(crate) fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri).ok().and_then(|u| u.to_file_path().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_params_carry_folder_identity() {
        let params = initialize_params("file:///projects/api", "api");
        assert!(params["processId"].is_number());
        assert_eq!(params["rootUri"], "file:///projects/api");
        assert_eq!(params["workspaceFolders"][0]["uri"], "file:///projects/api");
        assert_eq!(params["workspaceFolders"][0]["name"], "api");
        assert!(params["capabilities"]["textDocument"]["publishDiagnostics"].is_object());
    }

    #[test]
    fn did_open_and_did_change_params() {
        let open = did_open_params("file:///q.graphql", "graphql", 1, "query { me }");
        assert_eq!(open["textDocument"]["languageId"], "graphql");
        assert_eq!(open["textDocument"]["version"], 1);

        let change = did_change_params("file:///q.graphql", 2, "query { you }");
        assert_eq!(change["textDocument"]["version"], 2);
        assert_eq!(change["contentChanges"][0]["text"], "query { you }");
    }

    #[test]
    fn wire_diagnostic_conversion() {
        let params: PublishDiagnosticsParams = serde_json::from_value(serde_json::json!({
            "uri": "file:///schema.graphql",
            "diagnostics": [{
                "range": { "start": { "line": 3, "character": 8 }, "end": { "line": 3, "character": 12 } },
                "severity": 1,
                "source": "graphql-language-service",
                "message": "Unknown type \"Usr\"."
            }]
        }))
        .unwrap();

        let diag = params.diagnostics[0].to_diagnostic();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.line, 3);
        assert_eq!(diag.col, 8);
        assert_eq!(diag.source, "graphql-language-service");
    }

    #[test]
    fn wire_diagnostic_defaults() {
        // Severity and source are optional per the LSP spec.
        let params: PublishDiagnosticsParams = serde_json::from_value(serde_json::json!({
            "uri": "file:///q.graphql",
            "diagnostics": [{
                "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } },
                "message": "deprecated field"
            }]
        }))
        .unwrap();

        let diag = params.diagnostics[0].to_diagnostic();
        assert_eq!(diag.severity, DiagnosticSeverity::Warning);
        assert_eq!(diag.source, "graphql");
    }

    #[test]
    fn uri_path_round_trip() {
        #[cfg(windows)]
        let path = PathBuf::from(r"C:\projects\api\schema.graphql");
        #[cfg(not(windows))]
        let path = PathBuf::from("/projects/api/schema.graphql");

        let uri = path_to_file_uri(&path).unwrap();
        assert_eq!(file_uri_to_path(uri.as_str()).unwrap(), path);
    }

    #[test]
    fn non_file_uris_have_no_path() {
        assert!(file_uri_to_path("not-a-uri").is_none());
        assert!(file_uri_to_path("https://example.com/q.graphql").is_none());
    }

    #[test]
    fn request_omits_absent_params() {
        let json = serde_json::to_value(Request::new(1, "shutdown", None)).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "shutdown");
        assert!(json.get("params").is_none(), "params must be omitted, not null");
    }

    #[test]
    fn notification_has_no_id() {
        let json = serde_json::to_value(Notification::new("exit", None)).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("params").is_none());
    }
}
