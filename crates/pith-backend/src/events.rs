use std::sync::Mutex;

use pith_quota::UsageDelta;
use pith_types::{ObjectPath, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// What kind of committed change produced a usage event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageEventKind {
    Write,
    Delete,
    Purge,
}

/// Usage change emitted after a successful commit, for billing and
/// notification consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub kind: UsageEventKind,
    pub path: ObjectPath,
    /// Serial of the committed version; `None` for purges.
    pub serial: Option<u64>,
    pub delta: UsageDelta,
    pub at: Timestamp,
}

/// Consumer of usage events.
///
/// Delivery is best-effort and happens outside commit atomicity: a sink
/// failure never rolls back a commit.
pub trait UsageSink: Send + Sync {
    fn emit(&self, event: UsageEvent);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl UsageSink for NullSink {
    fn emit(&self, _event: UsageEvent) {}
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<UsageEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of events received so far.
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl UsageSink for MemorySink {
    fn emit(&self, event: UsageEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(_) => warn!("memory sink lock poisoned; dropping usage event"),
        }
    }
}

/// Forwards events to an async consumer over an unbounded channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UsageEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UsageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UsageSink for ChannelSink {
    fn emit(&self, event: UsageEvent) {
        if self.tx.send(event).is_err() {
            warn!("usage event receiver dropped; event lost");
        }
    }
}
