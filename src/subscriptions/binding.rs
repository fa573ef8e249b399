//! Binds channel names to transport topics.

use crate::error::Result;
use crate::transport::{NoopCallbacks, SubscriptionCallbacks, Transport};
use std::sync::Arc;
use tracing::info;

/// Builds the callbacks attached to one opening of a channel's subscription,
/// given the channel and the generation of that opening.
pub type CallbackFactory = Box<dyn Fn(&str, u64) -> Arc<dyn SubscriptionCallbacks> + Send>;

/// A transport plus the rules for turning a channel into a topic.
///
/// A manager without a live connection uses [`TransportBinding::detached`];
/// a remote one is the same manager built with a real transport.
pub struct TransportBinding {
    transport: Box<dyn Transport>,
    topic_prefix: String,
    callbacks: CallbackFactory,
}

impl TransportBinding {
    pub fn new(
        transport: Box<dyn Transport>,
        topic_prefix: impl Into<String>,
        callbacks: CallbackFactory,
    ) -> Self {
        Self {
            transport,
            topic_prefix: topic_prefix.into(),
            callbacks,
        }
    }

    /// A binding that ignores whatever the transport reports back.
    pub fn without_callbacks(
        transport: Box<dyn Transport>,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self::new(
            transport,
            topic_prefix,
            Box::new(|_: &str, _: u64| -> Arc<dyn SubscriptionCallbacks> { Arc::new(NoopCallbacks) }),
        )
    }

    /// A binding whose transport accepts every call and never pushes data.
    pub fn detached() -> Self {
        Self::without_callbacks(Box::new(DetachedTransport), "")
    }

    pub fn topic(&self, channel: &str) -> String {
        format!("{}{}", self.topic_prefix, channel)
    }

    /// Open the network subscription for a channel.
    pub fn open(&self, channel: &str, generation: u64) -> Result<()> {
        let topic = self.topic(channel);
        info!(channel, topic = %topic, generation, "subscribing");
        self.transport
            .subscribe(&topic, (self.callbacks)(channel, generation))
    }

    /// Close the network subscription for a channel.
    pub fn close(&self, channel: &str) -> Result<()> {
        let topic = self.topic(channel);
        info!(channel, topic = %topic, "unsubscribing");
        self.transport.unsubscribe(&topic)
    }
}

struct DetachedTransport;

impl Transport for DetachedTransport {
    fn subscribe(&self, _topic: &str, _callbacks: Arc<dyn SubscriptionCallbacks>) -> Result<()> {
        Ok(())
    }

    fn unsubscribe(&self, _topic: &str) -> Result<()> {
        Ok(())
    }
}
