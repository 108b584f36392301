// In-process event bus and the events exchanged over it
pub mod bus;
pub mod types;

pub use bus::{Delivery, EventBus, EventHandler};
pub use types::{CreditPayNotify, Event, EventContext, EventPayload, EventType, PayNotify, UserNotify};
