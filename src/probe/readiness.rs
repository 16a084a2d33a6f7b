//! ReadinessProbe - waits for the trainer's viewer to start serving.

use std::time::Duration;

use log::{debug, info, warn};

use super::session::{BrowserLauncher, BrowserSession, SessionGuard};
use crate::config::ProbeConfig;
use crate::error::Result;

/// Result of one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The endpoint answered on attempt `attempts`
    Ready { attempts: u32 },
    /// Every attempt failed
    Unreachable { attempts: u32 },
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ProbeOutcome::Ready { attempts } | ProbeOutcome::Unreachable { attempts } => *attempts,
        }
    }
}

pub struct ReadinessProbe<B: BrowserLauncher> {
    launcher: B,
    dwell: Duration,
}

impl<B: BrowserLauncher> ReadinessProbe<B> {
    /// `dwell` is how long the session stays open after a successful load.
    pub fn new(launcher: B, dwell: Duration) -> Self {
        Self { launcher, dwell }
    }

    pub fn launcher(&self) -> &B {
        &self.launcher
    }

    /// Probe with the settings from `config`.
    pub async fn wait_with(&self, config: &ProbeConfig) -> Result<ProbeOutcome> {
        self.wait_until_ready(&config.url, config.max_attempts, config.poll_interval())
            .await
    }

    /// Navigate to `url` until it loads or `max_attempts` navigations failed.
    ///
    /// Each call owns one browser session and closes it before returning. If
    /// the wait is cancelled the session is still closed when it drops.
    /// Only a failure to start the browser is an `Err`.
    pub async fn wait_until_ready(
        &self,
        url: &str,
        max_attempts: u32,
        poll_interval: Duration,
    ) -> Result<ProbeOutcome> {
        let mut session = SessionGuard::new(self.launcher.launch().await?);
        let outcome = poll(&mut session, url, max_attempts, poll_interval).await;

        if outcome.is_ready() && !self.dwell.is_zero() {
            debug!("Holding session on {} for {:?}", url, self.dwell);
            tokio::time::sleep(self.dwell).await;
        }
        session.close().await;

        match outcome {
            ProbeOutcome::Ready { attempts } => info!("{} ready after {} attempt(s)", url, attempts),
            ProbeOutcome::Unreachable { attempts } => {
                warn!("{} unreachable after {} attempt(s)", url, attempts)
            }
        }
        Ok(outcome)
    }
}

async fn poll<S: BrowserSession + 'static>(
    session: &mut SessionGuard<S>,
    url: &str,
    max_attempts: u32,
    poll_interval: Duration,
) -> ProbeOutcome {
    for attempt in 1..=max_attempts {
        debug!("Connecting to {} (attempt {}/{})", url, attempt, max_attempts);
        match session.navigate(url).await {
            Ok(()) => return ProbeOutcome::Ready { attempts: attempt },
            Err(e) => {
                debug!("{}", e);
                if attempt < max_attempts {
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
    ProbeOutcome::Unreachable {
        attempts: max_attempts,
    }
}
