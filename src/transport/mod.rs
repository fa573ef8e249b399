//! Pub/sub transport seam.
//!
//! The cache never speaks a wire protocol itself. It asks a [`Transport`] to
//! open or close a topic and hands it a [`SubscriptionCallbacks`] object; the
//! transport reports pushed samples, acknowledgements and failures back
//! through that object from whatever thread it runs on.
//!
//! Reconnection and authentication belong to the transport. After a
//! reconnect it must tell the engine (see `EngineHandle::reconnected`) so
//! every channel still referenced gets subscribed again.

mod loopback;

pub use loopback::{LoopbackTransport, TransportCall};

use crate::error::{CacheError, Result};
use crate::types::Sample;
use std::sync::Arc;

/// Callbacks attached to one topic subscription.
///
/// Every method defaults to a no-op so implementors only override what they
/// care about.
pub trait SubscriptionCallbacks: Send + Sync {
    /// Samples pushed on the topic, in arrival order.
    fn on_event(&self, samples: Vec<Sample>) {
        let _ = samples;
    }

    /// The remote side accepted the subscription.
    fn on_success(&self) {}

    /// The remote side rejected or dropped the subscription.
    fn on_error(&self, error: String) {
        let _ = error;
    }
}

/// Callbacks that ignore everything.
pub struct NoopCallbacks;

impl SubscriptionCallbacks for NoopCallbacks {}

/// A pub/sub connection.
///
/// `subscribe` returning `Err` means the request never left; the caller
/// treats the topic as not subscribed. Rejections that arrive later come
/// through `SubscriptionCallbacks::on_error`.
pub trait Transport: Send {
    fn subscribe(&self, topic: &str, callbacks: Arc<dyn SubscriptionCallbacks>) -> Result<()>;

    fn unsubscribe(&self, topic: &str) -> Result<()>;
}

/// Decode event arguments of the form `[[timestamp, value], ...]`.
pub fn parse_event_args(args: &serde_json::Value) -> Result<Vec<Sample>> {
    let pairs = args
        .as_array()
        .ok_or_else(|| CacheError::InvalidMessage("event args must be an array".into()))?;

    pairs
        .iter()
        .map(|pair| {
            let point = pair.as_array().filter(|p| p.len() >= 2).ok_or_else(|| {
                CacheError::InvalidMessage(format!("expected [timestamp, value], got {}", pair))
            })?;
            let number = |v: &serde_json::Value| {
                v.as_f64().ok_or_else(|| {
                    CacheError::InvalidMessage(format!("expected a number, got {}", v))
                })
            };
            Ok(Sample::new(number(&point[0])?, number(&point[1])?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_single_pair() {
        let samples = parse_event_args(&json!([[1500000000.5, 42.0]])).unwrap();
        assert_eq!(samples, vec![Sample::new(1500000000.5, 42.0)]);
    }

    #[test]
    fn test_parse_many_pairs() {
        let samples = parse_event_args(&json!([[1, 2], [3, 4.5]])).unwrap();
        assert_eq!(samples, vec![Sample::new(1.0, 2.0), Sample::new(3.0, 4.5)]);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(parse_event_args(&json!({"ts": 1})).is_err());
        assert!(parse_event_args(&json!([[1]])).is_err());
        assert!(parse_event_args(&json!([["a", 1]])).is_err());
    }

    #[test]
    fn test_noop_callbacks_accept_everything() {
        let cb = NoopCallbacks;
        cb.on_event(vec![Sample::new(1.0, 1.0)]);
        cb.on_success();
        cb.on_error("ignored".into());
    }
}
