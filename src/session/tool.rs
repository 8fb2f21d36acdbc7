//! Discovery and invocation of the AUX tool's commands.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use crate::protocol::catalog::{DEFAULT_TOOL_NAME, VALUE_PLACEHOLDER};
use crate::protocol::{Message, ToolCommand, ToolDescriptor};

use super::{PendingDiscovery, Session, SessionError, SessionEvent};

/// A template's name: its text up to the value placeholder.
fn command_name(template: &str) -> &str {
    template.split(VALUE_PLACEHOLDER).next().unwrap_or(template)
}

/// What the session currently knows about the tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub commands: Vec<ToolCommand>,
    pub is_available: bool,
}

impl Session {
    /// Ask the tool for its catalog and wait for the answer.
    ///
    /// Only one query may be pending; a second caller gets
    /// `DiscoveryInProgress` and the first keeps waiting. The slot of a query
    /// whose future was dropped is reclaimed by the next caller.
    pub async fn query_tool_commands(&self) -> Result<ToolDescriptor, SessionError> {
        let id = self.shared.discovery_ids.fetch_add(1, Ordering::SeqCst) + 1;
        let (responder, mut rx) = oneshot::channel();
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.link.is_none() {
                return Err(SessionError::NotConnected);
            }
            if inner.discovery.as_ref().is_some_and(|pending| !pending.responder.is_closed()) {
                return Err(SessionError::DiscoveryInProgress);
            }
            // A query dropped mid-wait leaves its slot behind with no receiver.
            if let Some(stale) = inner.discovery.take() {
                tracing::debug!("Reclaiming abandoned tool discovery {}", stale.id);
            }
            inner.discovery = Some(PendingDiscovery { id, responder });
        }

        if let Err(e) = self.send_immediate("m?").await {
            self.clear_discovery(id).await;
            return Err(e);
        }

        let limit = self.settings().discovery_timeout();
        match tokio::time::timeout(limit, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                if self.clear_discovery(id).await {
                    tracing::warn!("Tool discovery timed out after {:?}", limit);
                    return Err(SessionError::Timeout);
                }
                // Answered while the timer fired.
                rx.try_recv().unwrap_or(Err(SessionError::Timeout))
            }
        }
    }

    /// Empty the discovery slot if it still belongs to query `id`.
    async fn clear_discovery(&self, id: u64) -> bool {
        let mut inner = self.shared.inner.lock().await;
        if inner.discovery.as_ref().is_some_and(|pending| pending.id == id) {
            inner.discovery = None;
            true
        } else {
            false
        }
    }

    /// Re-query the catalog and store it. Returns whether it changed.
    /// Failures are logged and leave the known catalog in place.
    pub async fn refresh_tools(&self) -> bool {
        let descriptor = match self.query_tool_commands().await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!("Tool refresh failed: {}", e);
                return false;
            }
        };
        let changed = self
            .shared
            .inner
            .lock()
            .await
            .store
            .apply_tool_catalog(descriptor.clone());
        if changed {
            tracing::info!(
                "Tool updated: {} ({} commands)",
                descriptor.name,
                descriptor.commands.len()
            );
            self.shared.emit(SessionEvent::ToolUpdated(descriptor));
        }
        changed
    }

    /// Refresh the catalog periodically. Calling it again while running does
    /// nothing.
    pub async fn start_tool_refresh(&self) {
        let mut slot = self.shared.refresh.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let shared = Arc::downgrade(&self.shared);
        let period = self.settings().tool_refresh_interval();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let session = Session { shared };
                if session.is_connected().await {
                    session.refresh_tools().await;
                }
            }
        }));
        tracing::debug!("Tool refresh every {:?}", period);
    }

    pub async fn stop_tool_refresh(&self) {
        if let Some(handle) = self.shared.refresh.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn tool_info(&self) -> ToolInfo {
        let inner = self.shared.inner.lock().await;
        match inner.store.tool() {
            Some(tool) => ToolInfo {
                name: tool.name.clone(),
                commands: tool.commands.clone(),
                is_available: tool.is_available(),
            },
            None => ToolInfo {
                name: DEFAULT_TOOL_NAME.to_string(),
                commands: Vec::new(),
                is_available: false,
            },
        }
    }

    /// Invoke a catalog command. Queued commands return the tool's reply;
    /// the rest are written immediately and return `None`.
    pub async fn execute_tool_command(
        &self,
        command: &ToolCommand,
        value: Option<&str>,
    ) -> Result<Option<Message>, SessionError> {
        if command.cmd.is_empty() {
            return Err(SessionError::UnknownToolCommand(String::new()));
        }
        if command.requires_value() && value.is_none() {
            return Err(SessionError::MissingValue(command.cmd.clone()));
        }
        let text = command.render(value);
        tracing::info!("Tool execute: {} (queued: {})", text, command.is_queue);
        if command.is_queue {
            self.send(&text).await.map(Some)
        } else {
            self.send_immediate(&text).await.map(|_| None)
        }
    }

    /// Look `name` up in the known catalog and invoke it.
    pub async fn run_tool_command(
        &self,
        name: &str,
        value: Option<&str>,
    ) -> Result<Option<Message>, SessionError> {
        let command = self
            .tool_info()
            .await
            .commands
            .into_iter()
            .find(|command| command_name(&command.cmd) == name)
            .ok_or_else(|| SessionError::UnknownToolCommand(name.to_string()))?;
        self.execute_tool_command(&command, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_strips_placeholder() {
        assert_eq!(command_name("open"), "open");
        assert_eq!(command_name("w<val>"), "w");
        assert_eq!(command_name("<val>"), "");
    }
}
