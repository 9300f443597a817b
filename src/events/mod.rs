pub mod listeners;
pub mod publisher;
pub mod types;

pub use listeners::{ListenerRegistry, Subscription};
pub use publisher::{EventPublisher, PublishedEvent};
pub use types::ConnectionEvent;
