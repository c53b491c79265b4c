//! Command events and the switchboard that reacts to them.
//!
//! Every mutating resource command is emitted once, inside the transaction
//! that performed it. The [`EventBus`] runs its listeners in registration
//! order against that same transaction, so a failing listener aborts the
//! command along with everything it wrote.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::database::store::{CommandRecord, Store};
use crate::database::DatabaseError;
use crate::resource::types::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub channel: String,
    pub installation: TenantId,
    pub query: Value,
    pub result: Value,
}

impl Event {
    pub fn command(
        channel: impl Into<String>,
        installation: TenantId,
        query: Value,
        result: Value,
    ) -> Self {
        Self {
            event_type: EventType::Command,
            channel: channel.into(),
            installation,
            query,
            result,
        }
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("handler for '{channel}' failed: {message}")]
    Handler { channel: String, message: String },

    #[error("command log write failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("event payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receives every command the resource layer performs
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, store: &mut dyn Store, event: &Event) -> Result<(), EventError>;
}

#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_event(&self, store: &mut dyn Store, event: &Event) -> Result<(), EventError>;
}

/// Side effect triggered by a command on a given channel
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, store: &mut dyn Store, event: &Event) -> Result<(), EventError>;
}

/// Logs every event
pub struct EventLogger;

#[async_trait]
impl EventListener for EventLogger {
    fn name(&self) -> &'static str {
        "event_logger"
    }

    async fn on_event(&self, _store: &mut dyn Store, event: &Event) -> Result<(), EventError> {
        debug!(
            channel = %event.channel,
            installation = event.installation,
            "event {:?}",
            event.event_type
        );
        Ok(())
    }
}

/// Writes one command-log row per command
pub struct CommandLog;

#[async_trait]
impl EventListener for CommandLog {
    fn name(&self) -> &'static str {
        "command_log"
    }

    async fn on_event(&self, store: &mut dyn Store, event: &Event) -> Result<(), EventError> {
        if event.event_type != EventType::Command {
            return Ok(());
        }
        let data = serde_json::to_value(event)?;
        store
            .insert_command(&CommandRecord {
                installation: event.installation,
                channel: event.channel.clone(),
                data,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

/// Runs the handlers registered for a command's channel, in series
#[derive(Default)]
pub struct CommandReactor {
    handlers: HashMap<String, Vec<Box<dyn CommandHandler>>>,
}

impl CommandReactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, channel: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        let channel = channel.into();
        debug!("Registered command handler for '{}'", channel);
        self.handlers.entry(channel).or_default().push(Box::new(handler));
        self
    }
}

#[async_trait]
impl EventListener for CommandReactor {
    fn name(&self) -> &'static str {
        "command_reactor"
    }

    async fn on_event(&self, store: &mut dyn Store, event: &Event) -> Result<(), EventError> {
        if event.event_type != EventType::Command {
            return Ok(());
        }
        if let Some(handlers) = self.handlers.get(&event.channel) {
            for handler in handlers {
                handler.handle(&mut *store, event).await?;
            }
        }
        Ok(())
    }
}

/// The switchboard: an explicit sink value, passed to whoever emits
pub struct EventBus {
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { listeners: Vec::new() }
    }

    /// Logger, command log, then the reactor
    pub fn standard(reactor: CommandReactor) -> Self {
        Self::new().listen(EventLogger).listen(CommandLog).listen(reactor)
    }

    pub fn listen(mut self, listener: impl EventListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::standard(CommandReactor::new())
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, store: &mut dyn Store, event: &Event) -> Result<(), EventError> {
        for listener in &self.listeners {
            if let Err(e) = listener.on_event(&mut *store, event).await {
                warn!(listener = listener.name(), channel = %event.channel, "event listener failed: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }
}
