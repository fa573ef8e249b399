//! Periodic historical delivery.

use crate::manager::DataManager;
use crate::outbox::Outbox;
use crate::protocol::HostMessage;
use tracing::{debug, warn};

/// Outcome of one delivery tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// (monitor, channel) pairs visited.
    pub pairs: usize,
    /// Historical messages queued for the host.
    pub delivered: usize,
    /// Pairs whose query failed.
    pub failed: usize,
    /// Samples carried by the queued messages.
    pub samples: usize,
}

/// Re-sends each monitor's window on every tick.
///
/// Every tick is a full re-query: for each monitor with a range, in name
/// order, and each of its channels, in name order, the cached samples in
/// `[start, end)` are sent as one historical message. Empty results are sent
/// too. A failed query is logged and skipped.
#[derive(Debug, Default)]
pub struct DeliveryScheduler {
    ticks: u64,
}

impl DeliveryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick(&mut self, manager: &mut DataManager, outbox: &Outbox) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport::default();

        let pairs: Vec<(String, String, f64, f64)> = manager
            .monitors()
            .filter_map(|m| m.range().map(|r| (m, r.start, r.end)))
            .flat_map(|(m, start, end)| {
                m.channels()
                    .map(move |c| (m.name().to_string(), c.to_string(), start, end))
            })
            .collect();

        for (monitor, channel, start, end) in pairs {
            report.pairs += 1;
            let data = match manager.query_range(&channel, start, end) {
                Ok(data) => data,
                Err(e) => {
                    warn!(monitor = %monitor, channel = %channel, error = %e, "delivery query failed");
                    report.failed += 1;
                    continue;
                }
            };

            let count = data.len();
            if outbox.send(HostMessage::HistoricalData {
                monitor,
                channel,
                data,
            }) {
                report.delivered += 1;
                report.samples += count;
            }
        }

        debug!(tick = self.ticks, ?report, "delivery tick");
        report
    }
}
