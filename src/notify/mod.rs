//! Notification channel: counts camera events reported by the trainer's
//! viewer and signals the orchestrator when a pass is done.

pub mod channel;
pub mod counter;

pub use channel::NotificationChannel;
pub use counter::{EventDispatcher, TerminationCounter, TerminationReceiver, TerminationSignal};
