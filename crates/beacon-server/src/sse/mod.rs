//! Live fanout over Server-Sent Events.
//!
//! Newly accepted updates are pushed to every connected `/api/events`
//! reader. Delivery is at-most-once and best-effort with no backlog: a
//! client that connects after a broadcast catches up through `/api/poll`
//! or `/api/state`.

mod registry;
mod subscriber;

pub use registry::{SseRegistry, SubscriptionGuard};
pub use subscriber::{SendOutcome, SseSubscriber};
