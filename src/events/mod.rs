//! Outbox events and the worker that turns them into notifications.

pub mod dispatcher;
pub mod outbox;
pub mod types;

pub use dispatcher::{NotificationDispatcher, NotificationDispatcherBuilder};
pub use outbox::OutboxService;
pub use types::*;
