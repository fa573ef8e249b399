//! Bounded queue of messages for the host.

use crate::protocol::HostMessage;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Sending half of the host message queue.
///
/// Sends never block. When the host falls behind and the queue is full the
/// message is dropped and counted; a disconnected host drops everything.
#[derive(Clone)]
pub struct Outbox {
    sender: Sender<HostMessage>,
    dropped: Arc<AtomicU64>,
}

impl Outbox {
    /// Create an outbox holding at most `capacity` undelivered messages.
    pub fn new(capacity: usize) -> (Self, Receiver<HostMessage>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Queue a message. Returns false if it was dropped.
    pub fn send(&self, message: HostMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    monitor = message.monitor(),
                    channel = message.channel(),
                    dropped = total,
                    "host outbox full, dropping message"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Messages dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shared drop counter. Holding it does not keep the queue open.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    /// Messages waiting for the host.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sample, SeriesBatch};

    fn message(n: f64) -> HostMessage {
        HostMessage::RealtimeData {
            monitor: "m1".into(),
            channel: "c1".into(),
            data: SeriesBatch::single(Sample::new(n, n)),
        }
    }

    #[test]
    fn test_full_outbox_drops_new_messages() {
        let (outbox, rx) = Outbox::new(2);
        assert!(outbox.send(message(1.0)));
        assert!(outbox.send(message(2.0)));
        assert!(!outbox.send(message(3.0)));
        assert_eq!(outbox.dropped(), 1);
        assert_eq!(outbox.len(), 2);

        assert_eq!(rx.try_recv().unwrap(), message(1.0));
        assert!(outbox.send(message(4.0)));
        assert_eq!(rx.try_recv().unwrap(), message(2.0));
        assert_eq!(rx.try_recv().unwrap(), message(4.0));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_disconnected_host_counts_drops() {
        let (outbox, rx) = Outbox::new(4);
        drop(rx);
        assert!(!outbox.send(message(1.0)));
        assert_eq!(outbox.dropped(), 1);
    }

    #[test]
    fn test_counter_outlives_sender() {
        let (outbox, rx) = Outbox::new(1);
        let counter = outbox.counter();
        outbox.send(message(1.0));
        outbox.send(message(2.0));
        drop(outbox);

        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert_eq!(rx.recv().unwrap(), message(1.0));
        assert!(rx.recv().is_err());
    }
}
