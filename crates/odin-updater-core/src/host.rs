//! The editor host as seen by an update run.
//!
//! Settings storage, dialogs and package management belong to the host. The
//! run only asks it yes/no questions, hands it text to display, and sends it
//! one-way notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Editor package holding the Odin syntax and build integration.
pub const ODIN_PACKAGE: &str = "Odin";

/// Editor package providing the language-server client.
pub const LSP_PACKAGE: &str = "LSP";

/// Fire-and-forget commands sent to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCommand {
    /// Stop language servers so the old binary is not locked during a build.
    DisableLanguageServer,
    EnableLanguageServer,
}

impl HostCommand {
    /// Command name understood by the editor's LSP package.
    pub fn name(&self) -> &'static str {
        match self {
            HostCommand::DisableLanguageServer => "lsp_disable_language_server_globally",
            HostCommand::EnableLanguageServer => "lsp_enable_language_server_globally",
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Editor-side collaborator of an update run.
#[async_trait]
pub trait Host: Send + Sync {
    /// Whether the named editor package is installed.
    async fn is_package_installed(&self, name: &str) -> bool;

    /// Send a one-way command. Must not block; the run never checks whether
    /// it took effect.
    fn notify(&self, command: HostCommand);

    /// Show an informational message.
    async fn show_message(&self, text: &str);

    /// Show an error message.
    async fn show_error(&self, text: &str);
}
