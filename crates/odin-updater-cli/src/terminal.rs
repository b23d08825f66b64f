//! Terminal stand-in for the editor host.

use async_trait::async_trait;
use odin_updater_core::{Host, HostCommand};
use std::collections::HashSet;
use tracing::{debug, info};

/// Prints messages to the terminal and answers package checks from the
/// configured `installed_packages` list.
pub struct TerminalHost {
    installed: Option<HashSet<String>>,
}

impl TerminalHost {
    /// `None` means no package list was configured: every package counts as
    /// installed.
    pub fn new(installed: Option<Vec<String>>) -> Self {
        Self {
            installed: installed.map(|packages| packages.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Host for TerminalHost {
    async fn is_package_installed(&self, name: &str) -> bool {
        match &self.installed {
            Some(packages) => packages.contains(name),
            None => {
                debug!("No package list configured, assuming '{}' is installed", name);
                true
            }
        }
    }

    fn notify(&self, command: HostCommand) {
        info!(command = %command, "Host notification");
    }

    async fn show_message(&self, text: &str) {
        println!("{text}\n");
    }

    async fn show_error(&self, text: &str) {
        eprintln!("{text}\n");
    }
}
