//! Readiness probing of the trainer's visualization endpoint.

pub mod readiness;
pub mod session;

pub use readiness::{ProbeOutcome, ReadinessProbe};
pub use session::{
    BrowserLauncher, BrowserSession, HttpBrowser, HttpSession, NavigationError, SessionGuard,
};
