//! The serial event loop that owns a `DataManager`.
//!
//! Host requests, transport callbacks and the delivery ticker all feed one
//! worker thread. Each event runs to completion before the next is taken, so
//! monitors, refcounts and coverage never need a lock.

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::manager::DataManager;
use crate::outbox::Outbox;
use crate::protocol::{HostMessage, HostRequest};
use crate::router::RealtimeRouter;
use crate::scheduler::{DeliveryScheduler, TickReport};
use crate::store::CacheStore;
use crate::subscriptions::{CallbackFactory, TransportBinding};
use crate::transport::{SubscriptionCallbacks, Transport};
use crate::types::{check_range, Sample};
use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

type Reply<T> = Sender<T>;
type ManagerFn = Box<dyn FnOnce(&mut DataManager) + Send>;

/// What a transport reported for one channel.
///
/// `generation` identifies which opening of the channel's subscription the
/// report belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Samples(Vec<Sample>),
    Subscribed { generation: u64 },
    SubscribeFailed { generation: u64, error: String },
}

enum Event {
    Host {
        request: HostRequest,
        reply: Option<Reply<Result<()>>>,
    },
    Transport {
        channel: String,
        event: TransportEvent,
    },
    Ingest {
        channel: String,
        start: f64,
        end: f64,
        samples: Vec<Sample>,
        reply: Reply<Result<()>>,
    },
    Tick(Reply<TickReport>),
    Reconnected,
    Inspect(ManagerFn),
    Shutdown(Option<Reply<Result<()>>>),
}

/// Transport callbacks that push onto the engine queue.
///
/// Sends never block: the transport may call back from the worker thread
/// itself while it is inside `subscribe`.
struct QueueCallbacks {
    channel: String,
    generation: u64,
    queue: Sender<Event>,
}

impl QueueCallbacks {
    fn push(&self, event: TransportEvent) {
        let event = Event::Transport {
            channel: self.channel.clone(),
            event,
        };
        match self.queue.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(channel = %self.channel, "engine queue full, dropping transport event")
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(channel = %self.channel, "engine stopped, ignoring transport event")
            }
        }
    }
}

impl SubscriptionCallbacks for QueueCallbacks {
    fn on_event(&self, samples: Vec<Sample>) {
        self.push(TransportEvent::Samples(samples));
    }

    fn on_success(&self) {
        self.push(TransportEvent::Subscribed {
            generation: self.generation,
        });
    }

    fn on_error(&self, error: String) {
        self.push(TransportEvent::SubscribeFailed {
            generation: self.generation,
            error,
        });
    }
}

/// Entry point for running a cache.
pub struct Engine {
    manager: DataManager,
    events: Receiver<Event>,
    outbox: Outbox,
    router: RealtimeRouter,
    scheduler: DeliveryScheduler,
    tick_interval: Duration,
}

impl Engine {
    /// Open the store, bind the transport and spawn the worker.
    ///
    /// Store errors (a locked directory, a bad manifest) are returned here,
    /// before any thread is started.
    pub fn start(config: CacheConfig, transport: Box<dyn Transport>) -> Result<EngineHandle> {
        let store = CacheStore::open(&config)?;
        let (events_tx, events_rx) = bounded(config.queue_capacity.max(1));
        let (outbox, outbox_rx) = Outbox::new(config.outbox_capacity);

        let queue = events_tx.clone();
        let callbacks: CallbackFactory = Box::new(
            move |channel: &str, generation: u64| -> Arc<dyn SubscriptionCallbacks> {
                Arc::new(QueueCallbacks {
                    channel: channel.to_string(),
                    generation,
                    queue: queue.clone(),
                })
            },
        );
        let binding = TransportBinding::new(transport, config.topic_prefix.clone(), callbacks);

        let engine = Engine {
            manager: DataManager::new(store, binding),
            events: events_rx,
            outbox: outbox.clone(),
            router: RealtimeRouter::new(),
            scheduler: DeliveryScheduler::new(),
            tick_interval: config.tick_interval,
        };

        let worker = thread::Builder::new()
            .name("chanmux-engine".into())
            .spawn(move || engine.run())?;

        info!(
            persistent = config.path.is_some(),
            tick_ms = config.tick_interval.as_millis() as u64,
            "engine started"
        );

        Ok(EngineHandle {
            events: events_tx,
            outbox: outbox_rx,
            dropped: outbox.counter(),
            worker: Some(worker),
        })
    }

    fn run(mut self) {
        let ticker = if self.tick_interval.is_zero() {
            never()
        } else {
            tick(self.tick_interval)
        };

        let events = self.events.clone();
        let reply = loop {
            select! {
                recv(events) -> event => match event {
                    Ok(Event::Shutdown(reply)) => break reply,
                    Ok(event) => self.handle(event),
                    Err(_) => break None,
                },
                recv(ticker) -> _ => {
                    self.scheduler.tick(&mut self.manager, &self.outbox);
                }
            }
        };

        let synced = self.manager.sync();
        if let Err(e) = &synced {
            error!(error = %e, "failed to sync store on shutdown");
        }
        info!(ticks = self.scheduler.ticks(), "engine stopped");
        if let Some(reply) = reply {
            let _ = reply.send(synced);
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Host { request, reply } => {
                let result = self.apply(&request);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(monitor = request.dataset_id(), error = %e, "host request failed");
                        }
                    }
                }
            }
            Event::Transport { channel, event } => self.on_transport(&channel, event),
            Event::Ingest {
                channel,
                start,
                end,
                samples,
                reply,
            } => {
                let result = self.manager.ingest_history(&channel, start, end, &samples);
                if let Err(e) = &result {
                    warn!(channel = %channel, error = %e, "history ingest failed");
                }
                let _ = reply.send(result);
            }
            Event::Tick(reply) => {
                let report = self.scheduler.tick(&mut self.manager, &self.outbox);
                let _ = reply.send(report);
            }
            Event::Reconnected => {
                for (channel, generation, e) in self.manager.resubscribe_all() {
                    self.fail_channel(&channel, generation, e.to_string());
                }
            }
            Event::Inspect(f) => f(&mut self.manager),
            Event::Shutdown(_) => {}
        }
    }

    fn apply(&mut self, request: &HostRequest) -> Result<()> {
        match request {
            HostRequest::Subscribe {
                dataset_id,
                channel,
            } => self.manager.monitor_channel(dataset_id, channel).map(|_| ()),
            HostRequest::Unsubscribe {
                dataset_id,
                channel,
            } => self
                .manager
                .stop_monitor_channel(dataset_id, channel)
                .map(|_| ()),
            HostRequest::SetRangeOfInterest {
                dataset_id,
                start,
                end,
                max_points,
            } => self
                .manager
                .set_range_of_interest(dataset_id, *start, *end, *max_points),
        }
    }

    fn on_transport(&mut self, channel: &str, event: TransportEvent) {
        match event {
            TransportEvent::Samples(samples) => {
                self.router
                    .route(&mut self.manager, &self.outbox, channel, &samples);
            }
            TransportEvent::Subscribed { generation } => {
                debug!(channel, generation, "subscription confirmed")
            }
            TransportEvent::SubscribeFailed { generation, error } => {
                self.fail_channel(channel, generation, error)
            }
        }
    }

    /// The transport gave up on a channel: clear it and tell every monitor
    /// that held it. Failures of an earlier opening are only logged.
    fn fail_channel(&mut self, channel: &str, generation: u64, error: String) {
        let monitors = self.manager.drop_subscription(channel, generation);
        warn!(
            channel,
            generation,
            error = %error,
            monitors = monitors.len(),
            "subscription failed"
        );
        for monitor in monitors {
            self.outbox.send(HostMessage::SubscriptionError {
                monitor,
                channel: channel.to_string(),
                error: error.clone(),
            });
        }
    }
}

/// Host-side handle to a running engine.
///
/// Dropping the handle stops the worker.
pub struct EngineHandle {
    events: Sender<Event>,
    outbox: Receiver<HostMessage>,
    dropped: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Queue a host request. Failures are logged by the worker.
    pub fn request(&self, request: HostRequest) -> Result<()> {
        if let HostRequest::SetRangeOfInterest { start, end, .. } = &request {
            check_range(*start, *end)?;
        }
        self.send(Event::Host {
            request,
            reply: None,
        })
    }

    /// Parse and queue a `[code, ...]` host message.
    pub fn request_wire(&self, msg: &serde_json::Value) -> Result<()> {
        self.request(HostRequest::from_wire(msg)?)
    }

    pub fn subscribe(&self, dataset_id: &str, channel: &str) -> Result<()> {
        self.request(HostRequest::Subscribe {
            dataset_id: dataset_id.to_string(),
            channel: channel.to_string(),
        })
    }

    pub fn unsubscribe(&self, dataset_id: &str, channel: &str) -> Result<()> {
        self.request(HostRequest::Unsubscribe {
            dataset_id: dataset_id.to_string(),
            channel: channel.to_string(),
        })
    }

    /// Move a monitor's window. An inverted range is rejected here and never
    /// reaches the worker.
    pub fn set_range_of_interest(
        &self,
        dataset_id: &str,
        start: f64,
        end: f64,
        max_points: u64,
    ) -> Result<()> {
        self.request(HostRequest::SetRangeOfInterest {
            dataset_id: dataset_id.to_string(),
            start,
            end,
            max_points,
        })
    }

    /// Subscribe and get the outcome back on the returned receiver.
    pub fn subscribe_with_reply(
        &self,
        dataset_id: &str,
        channel: &str,
    ) -> Result<Receiver<Result<()>>> {
        self.request_with_reply(HostRequest::Subscribe {
            dataset_id: dataset_id.to_string(),
            channel: channel.to_string(),
        })
    }

    /// Unsubscribe and get the outcome back on the returned receiver.
    pub fn unsubscribe_with_reply(
        &self,
        dataset_id: &str,
        channel: &str,
    ) -> Result<Receiver<Result<()>>> {
        self.request_with_reply(HostRequest::Unsubscribe {
            dataset_id: dataset_id.to_string(),
            channel: channel.to_string(),
        })
    }

    fn request_with_reply(&self, request: HostRequest) -> Result<Receiver<Result<()>>> {
        let (tx, rx) = bounded(1);
        self.send(Event::Host {
            request,
            reply: Some(tx),
        })?;
        Ok(rx)
    }

    /// Messages for the host, in the order they were produced.
    pub fn outbox(&self) -> &Receiver<HostMessage> {
        &self.outbox
    }

    /// Host messages dropped because the outbox was full.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Run a delivery tick now and wait for it.
    pub fn tick_now(&self) -> Result<TickReport> {
        let (tx, rx) = bounded(1);
        self.send(Event::Tick(tx))?;
        rx.recv().map_err(|_| CacheError::Disconnected)
    }

    /// Store a bulk fetch of `[start, end)` and wait for it.
    pub fn ingest_history(
        &self,
        channel: &str,
        start: f64,
        end: f64,
        samples: Vec<Sample>,
    ) -> Result<()> {
        check_range(start, end)?;
        let (tx, rx) = bounded(1);
        self.send(Event::Ingest {
            channel: channel.to_string(),
            start,
            end,
            samples,
            reply: tx,
        })?;
        rx.recv().map_err(|_| CacheError::Disconnected)?
    }

    /// The transport reconnected; subscribe every referenced channel again.
    pub fn reconnected(&self) -> Result<()> {
        self.send(Event::Reconnected)
    }

    /// Run `f` on the worker against the manager and wait for its result.
    pub fn inspect<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DataManager) -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        self.send(Event::Inspect(Box::new(move |manager| {
            let _ = tx.send(f(manager));
        })))?;
        rx.recv().map_err(|_| CacheError::Disconnected)
    }

    /// Stop the worker, syncing the store first.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let (tx, rx) = bounded(1);
        let sent = self.events.send(Event::Shutdown(Some(tx))).is_ok();
        let synced = if sent {
            rx.recv().unwrap_or(Err(CacheError::Disconnected))
        } else {
            Err(CacheError::Disconnected)
        };

        worker
            .join()
            .map_err(|_| CacheError::Storage("engine worker panicked".into()))?;
        synced
    }

    fn send(&self, event: Event) -> Result<()> {
        self.events.send(event).map_err(|_| CacheError::Disconnected)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "engine did not stop cleanly");
        }
    }
}
