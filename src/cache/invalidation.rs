//! Invalidation Bus Module
//!
//! Cross-instance "this changed" notifications. Messages carry only a
//! namespace, a key or "all", and the sender's instance id; never a value.
//! Receivers evict their local tier only; the distributed tier is already
//! up to date when a message is sent.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::key::{CacheKey, CacheNamespace};
use crate::error::{CacheError, Result};

/// Capacity of the in-process broadcast channel
pub const BROADCAST_CAPACITY: usize = 1024;

/// Channel name stem; one channel per namespace below it
pub const CHANNEL_STEM: &str = "cache:invalidate";

// == Invalidation Message ==
/// What to evict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum InvalidationScope {
    /// One derived key within the namespace
    Key { key: String },
    /// Every entry of the namespace
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub namespace: CacheNamespace,
    #[serde(flatten)]
    pub scope: InvalidationScope,
    /// Instance id of the sender
    pub origin: String,
}

impl InvalidationMessage {
    pub fn key(key: &CacheKey, origin: impl Into<String>) -> Self {
        Self {
            namespace: key.namespace().clone(),
            scope: InvalidationScope::Key {
                key: key.derived().to_string(),
            },
            origin: origin.into(),
        }
    }

    pub fn all(namespace: &CacheNamespace, origin: impl Into<String>) -> Self {
        Self {
            namespace: namespace.clone(),
            scope: InvalidationScope::All,
            origin: origin.into(),
        }
    }

    pub fn is_from(&self, instance_id: &str) -> bool {
        self.origin == instance_id
    }

    /// The single key this message targets, if any.
    pub fn target_key(&self) -> Option<CacheKey> {
        match &self.scope {
            InvalidationScope::Key { key } => Some(CacheKey::new(self.namespace.clone(), key.clone())),
            InvalidationScope::All => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Stream of messages delivered to one subscriber.
pub type InvalidationStream = BoxStream<'static, InvalidationMessage>;

// == Invalidation Bus ==
/// Publish/subscribe transport for invalidation messages.
///
/// Delivery is at-least-once and unordered across instances. A stream
/// ending means the subscription was lost and should be re-established.
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    async fn publish(&self, message: &InvalidationMessage) -> Result<()>;

    async fn subscribe(&self) -> Result<InvalidationStream>;

    fn backend_name(&self) -> &'static str;
}

// == Broadcast Bus ==
/// In-process bus over a tokio broadcast channel. Every coordinator
/// sharing a clone of the bus sees every message.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<InvalidationMessage>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(BROADCAST_CAPACITY)
    }
}

#[async_trait]
impl InvalidationBus for BroadcastBus {
    async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
        // No receivers means no local tiers to notify.
        if self.sender.send(message.clone()).is_err() {
            debug!(namespace = %message.namespace, "No invalidation subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<InvalidationStream> {
        let receiver = self.sender.subscribe();
        // A lagged receiver has lost messages; ending the stream hands the
        // gap to the listener, which resubscribes and flushes.
        let messages = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(message) => Some((message, receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Invalidation subscriber lagged, ending stream");
                    None
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        Ok(messages.boxed())
    }

    fn backend_name(&self) -> &'static str {
        "broadcast"
    }
}

// == Redis Bus ==
/// Redis pub/sub bus with one channel per namespace
/// (`<prefix>cache:invalidate:<namespace>`). Subscribers pattern-match
/// every namespace channel.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
    channel_prefix: String,
}

impl RedisBus {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            channel_prefix: key_prefix.to_string(),
        })
    }

    fn channel_for(&self, namespace: &CacheNamespace) -> String {
        channel_name(&self.channel_prefix, namespace)
    }
}

#[async_trait]
impl InvalidationBus for RedisBus {
    async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = message.to_json()?;
        let receivers: i64 = conn
            .publish(self.channel_for(&message.namespace), payload)
            .await
            .map_err(|e| CacheError::Bus(e.to_string()))?;
        debug!(namespace = %message.namespace, receivers, "Published invalidation");
        Ok(())
    }

    async fn subscribe(&self) -> Result<InvalidationStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CacheError::Bus(format!("failed to open pub/sub connection: {e}")))?;

        let pattern = format!("{}{}:*", self.channel_prefix, CHANNEL_STEM);
        pubsub
            .psubscribe(&pattern)
            .await
            .map_err(|e| CacheError::Bus(format!("failed to subscribe to {pattern}: {e}")))?;
        debug!(pattern = %pattern, "Subscribed to invalidation channels");

        let messages = pubsub.into_on_message().filter_map(|msg| async move {
            let payload = match msg.get_payload::<String>() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Unreadable invalidation payload");
                    return None;
                }
            };
            match InvalidationMessage::from_json(&payload) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(error = %e, "Malformed invalidation message");
                    None
                }
            }
        });
        Ok(messages.boxed())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

fn channel_name(prefix: &str, namespace: &CacheNamespace) -> String {
    format!("{prefix}{CHANNEL_STEM}:{namespace}")
}
