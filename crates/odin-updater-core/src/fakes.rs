//! In-memory [`Host`] for tests.

use crate::host::{Host, HostCommand};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Something the host was asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Notified(HostCommand),
    Message(String),
    Error(String),
}

/// Records every interaction and answers package checks from a fixed set.
#[derive(Debug, Default)]
pub struct RecordingHost {
    packages: Option<HashSet<String>>,
    events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
    /// Every package counts as installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only `packages` count as installed.
    pub fn with_packages<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: Some(packages.into_iter().map(Into::into).collect()),
            events: Mutex::default(),
        }
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Message(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Error(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<HostCommand> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Notified(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn is_package_installed(&self, name: &str) -> bool {
        self.packages
            .as_ref()
            .map_or(true, |packages| packages.contains(name))
    }

    fn notify(&self, command: HostCommand) {
        self.push(HostEvent::Notified(command));
    }

    async fn show_message(&self, text: &str) {
        self.push(HostEvent::Message(text.to_string()));
    }

    async fn show_error(&self, text: &str) {
        self.push(HostEvent::Error(text.to_string()));
    }
}
