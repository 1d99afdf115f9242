mod channel;
mod event_types;
mod hooks;

pub use channel::{EventChannel, EventEmitter, Hook};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
