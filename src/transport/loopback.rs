//! In-process transport.
//!
//! Topics are held in a table and samples are delivered by calling the
//! registered callbacks directly, with no serialization or network hop.
//! Useful for embedding a producer in the same process and for tests.

use super::{SubscriptionCallbacks, Transport};
use crate::error::{CacheError, Result};
use crate::types::Sample;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A call made on the transport, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    Subscribe(String),
    Unsubscribe(String),
}

#[derive(Default)]
struct LoopbackState {
    topics: HashMap<String, Arc<dyn SubscriptionCallbacks>>,
    /// Callbacks of every successful subscribe, in order.
    opened: Vec<(String, Arc<dyn SubscriptionCallbacks>)>,
    calls: Vec<TransportCall>,
    fail_next: Option<String>,
}

/// Cloneable handle to an in-process pub/sub table.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver samples to the topic's subscriber. Returns false if nobody is
    /// subscribed.
    pub fn publish(&self, topic: &str, samples: Vec<Sample>) -> bool {
        let callbacks = self.state.lock().topics.get(topic).cloned();
        match callbacks {
            Some(cb) => {
                cb.on_event(samples);
                true
            }
            None => false,
        }
    }

    /// Make the next `subscribe` call fail synchronously.
    pub fn fail_next_subscribe(&self, message: impl Into<String>) {
        self.state.lock().fail_next = Some(message.into());
    }

    /// Report an asynchronous rejection on a subscribed topic and drop it.
    pub fn reject(&self, topic: &str, message: impl Into<String>) -> bool {
        let callbacks = self.state.lock().topics.remove(topic);
        match callbacks {
            Some(cb) => {
                cb.on_error(message.into());
                true
            }
            None => false,
        }
    }

    /// Deliver a late rejection to the `nth` (0-based) successful subscribe
    /// on `topic`, as a slow server answering an old request would. The topic
    /// is only dropped if that subscribe is still the live one.
    pub fn reject_opening(&self, topic: &str, nth: usize, message: impl Into<String>) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            let Some(cb) = state
                .opened
                .iter()
                .filter(|(t, _)| t == topic)
                .nth(nth)
                .map(|(_, cb)| Arc::clone(cb))
            else {
                return false;
            };
            if state
                .topics
                .get(topic)
                .is_some_and(|live| Arc::ptr_eq(live, &cb))
            {
                state.topics.remove(topic);
            }
            cb
        };
        callbacks.on_error(message.into());
        true
    }

    /// Forget every subscription, as a dropped connection would.
    pub fn disconnect(&self) {
        self.state.lock().topics.clear();
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state.lock().topics.contains_key(topic)
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// Number of `subscribe` calls for a topic.
    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Subscribe(t) if t == topic))
            .count()
    }

    /// Number of `unsubscribe` calls for a topic.
    pub fn unsubscribe_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Unsubscribe(t) if t == topic))
            .count()
    }
}

impl Transport for LoopbackTransport {
    fn subscribe(&self, topic: &str, callbacks: Arc<dyn SubscriptionCallbacks>) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.calls.push(TransportCall::Subscribe(topic.to_string()));
            if let Some(message) = state.fail_next.take() {
                return Err(CacheError::Transport(message));
            }
            state.topics.insert(topic.to_string(), Arc::clone(&callbacks));
            state
                .opened
                .push((topic.to_string(), Arc::clone(&callbacks)));
        }

        debug!(topic, "loopback subscribed");
        callbacks.on_success();
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Unsubscribe(topic.to_string()));
        state.topics.remove(topic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NoopCallbacks;
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct Collect {
        samples: PlMutex<Vec<Sample>>,
        acks: PlMutex<usize>,
        errors: PlMutex<Vec<String>>,
    }

    impl SubscriptionCallbacks for Collect {
        fn on_event(&self, samples: Vec<Sample>) {
            self.samples.lock().extend(samples);
        }
        fn on_success(&self) {
            *self.acks.lock() += 1;
        }
        fn on_error(&self, error: String) {
            self.errors.lock().push(error);
        }
    }

    #[test]
    fn test_publish_reaches_subscriber() {
        let transport = LoopbackTransport::new();
        let collect = Arc::new(Collect::default());

        transport.subscribe("t", collect.clone()).unwrap();
        assert_eq!(*collect.acks.lock(), 1);

        assert!(transport.publish("t", vec![Sample::new(1.0, 2.0)]));
        assert!(!transport.publish("other", vec![Sample::new(1.0, 2.0)]));
        assert_eq!(collect.samples.lock().len(), 1);
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let transport = LoopbackTransport::new();
        transport.fail_next_subscribe("no broker");

        let first = transport.subscribe("t", Arc::new(NoopCallbacks));
        assert!(matches!(first, Err(CacheError::Transport(_))));
        assert!(!transport.is_subscribed("t"));

        transport
            .subscribe("t", Arc::new(NoopCallbacks))
            .unwrap();
        assert!(transport.is_subscribed("t"));
        assert_eq!(transport.subscribe_count("t"), 2);
    }

    #[test]
    fn test_reject_fires_on_error() {
        let transport = LoopbackTransport::new();
        let collect = Arc::new(Collect::default());
        transport.subscribe("t", collect.clone()).unwrap();

        assert!(transport.reject("t", "not authorized"));
        assert_eq!(*collect.errors.lock(), vec!["not authorized".to_string()]);
        assert!(!transport.is_subscribed("t"));
    }

    #[test]
    fn test_unsubscribe_recorded() {
        let transport = LoopbackTransport::new();
        transport
            .subscribe("t", Arc::new(NoopCallbacks))
            .unwrap();
        transport.unsubscribe("t").unwrap();

        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::Subscribe("t".into()),
                TransportCall::Unsubscribe("t".into())
            ]
        );
        assert_eq!(transport.unsubscribe_count("t"), 1);
    }

    #[test]
    fn test_reject_opening_targets_one_subscribe() {
        let transport = LoopbackTransport::new();
        let old = Arc::new(Collect::default());
        let live = Arc::new(Collect::default());

        transport.subscribe("t", old.clone()).unwrap();
        transport.unsubscribe("t").unwrap();
        transport.subscribe("t", live.clone()).unwrap();

        assert!(transport.reject_opening("t", 0, "late"));
        assert_eq!(*old.errors.lock(), vec!["late".to_string()]);
        assert!(live.errors.lock().is_empty());
        assert!(transport.is_subscribed("t"));

        assert!(transport.reject_opening("t", 1, "now"));
        assert!(!transport.is_subscribed("t"));
        assert!(!transport.reject_opening("t", 2, "none"));
    }
}
