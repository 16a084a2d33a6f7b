//! Domain types for Refinery
//!
//! - PerspectiveSpec: a named viewpoint and its artifact pair
//! - Vocabulary: the plain and tokenized perspective sets
//! - IterationRecord: pass index and synthesis strength
//! - ProgressEvent: typed message from the trainer's viewer

pub mod event;
pub mod iteration;
pub mod perspective;

pub use event::{EventKind, ProgressEvent, event_types};
pub use iteration::{DEFAULT_DECAY, IterationRecord, strength};
pub use perspective::{PerspectiveSpec, Vocabulary};
