//! Event fan-out.
//!
//! Cache state changes and collaborator notifications are published to the
//! [`EventBus`]; the [`SubscriptionDispatcher`] bridges bus subscriptions to
//! long-lived client connections through an [`EventTransport`].

mod bus;
mod dispatcher;
mod event;
mod sink;
mod transport;

pub use bus::*;
pub use dispatcher::*;
pub use event::*;
pub use sink::*;
pub use transport::*;
