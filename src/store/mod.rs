//! Sample persistence.
//!
//! Each channel is an append-only log of fixed-size `(timestamp, value)`
//! records plus an in-memory timestamp index for `[start, end)` queries.

mod channel;
mod dir;
mod log;

pub use channel::ChannelStore;
pub use dir::CacheStore;
pub use log::SampleLog;
