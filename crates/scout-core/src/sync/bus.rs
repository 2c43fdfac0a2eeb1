//! Cross-view broadcast of candidate flag changes.
//!
//! Every tab of an origin opens the same named channel on a [`SyncHub`]. The
//! channel sits behind [`SyncChannel`] so an IPC transport can stand in for
//! the in-process one without touching callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::models::{
    CandidateRecord, EngineError, EngineErrorKind, EngineResult, FlagField, SyncMessage,
    SyncMessageKind, TabId,
};
use crate::sync::identity::alias_ids;

pub trait SyncChannel: Send + Sync {
    /// Fire and forget. A message posted while nobody listens is lost.
    fn post(&self, message: SyncMessage);

    fn listen(&self) -> broadcast::Receiver<SyncMessage>;
}

/// Registry of named in-process channels.
#[derive(Clone)]
pub struct SyncHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<SyncMessage>>>>,
    capacity: usize,
    channel_name: String,
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncHub {
    pub fn new() -> Self {
        Self::from_config(&SyncConfig::default())
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: config.capacity.max(1),
            channel_name: config.channel_name.clone(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_config(&SyncConfig {
            capacity,
            ..SyncConfig::default()
        })
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Open the channel named by the hub's configuration.
    pub fn open_configured(&self) -> EngineResult<Arc<dyn SyncChannel>> {
        self.open(&self.channel_name)
    }

    /// Open (creating on first use) the channel called `name`.
    pub fn open(&self, name: &str) -> EngineResult<Arc<dyn SyncChannel>> {
        let mut channels = self.channels.lock().map_err(|_| {
            EngineError::new(EngineErrorKind::Internal, "sync hub mutex poisoned")
        })?;
        let sender = channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        Ok(Arc::new(InProcessChannel { sender }))
    }

    /// Drop channels nobody listens to any more.
    pub fn cleanup(&self) -> EngineResult<()> {
        let mut channels = self.channels.lock().map_err(|_| {
            EngineError::new(EngineErrorKind::Internal, "sync hub mutex poisoned")
        })?;
        channels.retain(|_, sender| sender.receiver_count() > 0);
        Ok(())
    }
}

struct InProcessChannel {
    sender: broadcast::Sender<SyncMessage>,
}

impl SyncChannel for InProcessChannel {
    fn post(&self, message: SyncMessage) {
        // Err only means no receiver is alive.
        let _ = self.sender.send(message);
    }

    fn listen(&self) -> broadcast::Receiver<SyncMessage> {
        self.sender.subscribe()
    }
}

/// One tab's endpoint on the shared channel.
#[derive(Clone)]
pub struct SyncBus {
    tab_id: TabId,
    channel: Arc<dyn SyncChannel>,
}

impl SyncBus {
    pub fn new(channel: Arc<dyn SyncChannel>) -> Self {
        Self::with_tab_id(channel, TabId::generate())
    }

    pub fn with_tab_id(channel: Arc<dyn SyncChannel>, tab_id: TabId) -> Self {
        Self { tab_id, channel }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn publish(&self, message: SyncMessage) {
        tracing::trace!(
            candidate_id = %message.candidate_id,
            kind = ?message.kind,
            value = message.value,
            "publishing sync message"
        );
        self.channel.post(message);
    }

    /// Publish `value` for `field` once per alias of `candidate`.
    ///
    /// Receivers may index their lists by a different identifier than the
    /// sender, so each alias gets its own message. Returns the message count.
    pub fn publish_flag(&self, candidate: &CandidateRecord, field: FlagField, value: bool) -> usize {
        let kind = SyncMessageKind::for_field(field);
        let aliases = alias_ids(candidate);
        let count = aliases.len();
        for candidate_id in aliases {
            self.publish(SyncMessage {
                kind,
                candidate_id,
                value,
                source_tab_id: self.tab_id,
            });
        }
        count
    }

    pub fn listener(&self) -> SyncListener {
        SyncListener {
            tab_id: self.tab_id,
            receiver: self.channel.listen(),
        }
    }

    /// Run `handler` for every foreign message until the subscription drops.
    ///
    /// Requires a tokio runtime.
    pub fn subscribe<F>(&self, handler: F) -> SyncSubscription
    where
        F: Fn(SyncMessage) + Send + 'static,
    {
        let mut listener = self.listener();
        let task = tokio::spawn(async move {
            while let Some(message) = listener.recv().await {
                handler(message);
            }
        });
        SyncSubscription { task }
    }
}

pub struct SyncListener {
    tab_id: TabId,
    receiver: broadcast::Receiver<SyncMessage>,
}

impl SyncListener {
    /// Next message from another tab; `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.source_tab_id == self.tab_id => continue,
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        tab_id = %self.tab_id,
                        skipped,
                        "sync listener lagged; relying on focus re-sync"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<SyncMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) if message.source_tab_id == self.tab_id => continue,
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        tab_id = %self.tab_id,
                        skipped,
                        "sync listener lagged; relying on focus re-sync"
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Live handler registration; dropping it unsubscribes.
pub struct SyncSubscription {
    task: JoinHandle<()>,
}

impl SyncSubscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
