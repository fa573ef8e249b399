//! Subscription multiplexing.
//!
//! Many monitors may watch the same channel, but the transport should only
//! carry one subscription per channel. The registry reference-counts interest
//! and the binding turns the 0 -> 1 and 1 -> 0 transitions into transport
//! calls.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = SubscriptionRegistry::new();
//! let binding = TransportBinding::detached();
//!
//! assert!(registry.acquire("X", &binding)?);   // opens
//! assert!(!registry.acquire("X", &binding)?);  // counter only
//! assert!(!registry.release("X", &binding)?);  // counter only
//! assert!(registry.release("X", &binding)?);   // closes
//! ```

mod binding;
mod registry;

pub use binding::{CallbackFactory, TransportBinding};
pub use registry::SubscriptionRegistry;
