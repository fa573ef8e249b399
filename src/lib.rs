//! # chanmux
//!
//! A channel-multiplexing time-series cache.
//!
//! Many named monitors watch overlapping sets of channels. The cache keeps
//! one network subscription per channel no matter how many monitors want it,
//! stores every sample it sees, remembers which time ranges have been fully
//! fetched, and on every tick re-sends each monitor the samples in its
//! current window.
//!
//! ## Core Concepts
//!
//! - **Monitors**: named consumers with a channel set and a range of interest
//! - **Subscriptions**: reference-counted, opened on 0 -> 1 and closed on 1 -> 0
//! - **Channel stores**: per-channel sample tables with half-open range queries
//! - **Coverage**: merged, disjoint intervals of fully loaded time
//! - **Engine**: one worker thread serializing host requests, transport
//!   events and the delivery tick
//!
//! ## Example
//!
//! ```ignore
//! use chanmux::{CacheConfig, Engine, LoopbackTransport, Sample};
//!
//! let transport = LoopbackTransport::new();
//! let engine = Engine::start(CacheConfig::default(), Box::new(transport.clone()))?;
//!
//! engine.subscribe("m1", "OPC1:channelA")?;
//! engine.set_range_of_interest("m1", 0.0, 3600.0, 1000)?;
//! transport.publish("realtime.data_OPC1:channelA", vec![Sample::new(12.0, 0.5)]);
//!
//! for message in engine.outbox().try_iter() {
//!     println!("{}", message.to_wire());
//! }
//! ```

pub mod config;
pub mod coverage;
pub mod engine;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod outbox;
pub mod protocol;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use config::CacheConfig;
pub use coverage::IntervalCoverage;
pub use engine::{Engine, EngineHandle, TransportEvent};
pub use error::{CacheError, Result};
pub use manager::{ChannelCache, DataManager};
pub use monitor::{Monitor, RangeOfInterest};
pub use outbox::Outbox;
pub use protocol::{HostMessage, HostRequest};
pub use router::{RealtimeRouter, RouteReport};
pub use scheduler::{DeliveryScheduler, TickReport};
pub use store::{CacheStore, ChannelStore, SampleLog};
pub use subscriptions::{CallbackFactory, SubscriptionRegistry, TransportBinding};
pub use transport::{
    parse_event_args, LoopbackTransport, NoopCallbacks, SubscriptionCallbacks, Transport,
    TransportCall,
};
pub use types::*;
