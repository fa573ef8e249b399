//! Live sample fan-out.

use crate::manager::DataManager;
use crate::outbox::Outbox;
use crate::protocol::HostMessage;
use crate::types::{Sample, SeriesBatch};
use tracing::{trace, warn};

/// What one routed event did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Samples appended to the channel store.
    pub stored: usize,
    /// Samples dropped because they were invalid or could not be stored.
    pub rejected: usize,
    /// Realtime messages queued for the host.
    pub forwarded: usize,
}

/// Appends pushed samples to their channel and forwards each one to every
/// monitor watching that channel.
///
/// Samples are handled in arrival order. A sample that fails to store is
/// logged and skipped; the rest of the event still goes through. Coverage is
/// never extended here.
#[derive(Debug, Default)]
pub struct RealtimeRouter;

impl RealtimeRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(
        &self,
        manager: &mut DataManager,
        outbox: &Outbox,
        channel: &str,
        samples: &[Sample],
    ) -> RouteReport {
        let mut report = RouteReport::default();

        for &sample in samples {
            if let Err(e) = manager.append_sample(channel, sample) {
                warn!(channel, error = %e, "dropping realtime sample");
                report.rejected += 1;
                continue;
            }
            report.stored += 1;

            for monitor in manager.subscribers_of(channel) {
                let sent = outbox.send(HostMessage::RealtimeData {
                    monitor: monitor.to_string(),
                    channel: channel.to_string(),
                    data: SeriesBatch::single(sample),
                });
                if sent {
                    report.forwarded += 1;
                }
            }
        }

        trace!(channel, ?report, "routed realtime event");
        report
    }
}
