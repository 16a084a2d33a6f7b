//! Browser session seam used by the readiness probe.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use crate::error::{RefineryError, Result};

/// A navigation that failed at the transport level.
#[derive(Debug, Clone, thiserror::Error)]
#[error("navigation to {url} failed: {reason}")]
pub struct NavigationError {
    pub url: String,
    pub reason: String,
}

/// One open browser session.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url`. Only transport failures are errors.
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), NavigationError>;

    /// Tear the session down. Safe to call more than once.
    async fn close(&mut self);
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession + 'static;

    async fn launch(&self) -> Result<Self::Session>;
}

/// Scoped ownership of a browser session.
///
/// `close` tears the session down in place. A guard dropped while still
/// holding its session (a cancelled wait, a panic) hands it to a task on the
/// current runtime that closes it.
pub struct SessionGuard<S: BrowserSession + 'static> {
    session: Option<S>,
}

impl<S: BrowserSession + 'static> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub async fn navigate(&mut self, url: &str) -> std::result::Result<(), NavigationError> {
        match self.session.as_mut() {
            Some(session) => session.navigate(url).await,
            None => Err(NavigationError {
                url: url.to_string(),
                reason: "session closed".to_string(),
            }),
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }
}

impl<S: BrowserSession + 'static> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Browser session dropped while open; closing in background");
                runtime.spawn(async move {
                    session.close().await;
                });
            }
            Err(_) => warn!("Browser session dropped outside a runtime; not closed"),
        }
    }
}

/// Plain HTTP client standing in for a headless browser.
///
/// Any HTTP response counts as a successful page load, matching what a
/// browser's `get` reports.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    request_timeout: Duration,
}

impl HttpBrowser {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for HttpBrowser {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl BrowserLauncher for HttpBrowser {
    type Session = HttpSession;

    async fn launch(&self) -> Result<HttpSession> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| RefineryError::Browser(format!("Failed to start HTTP session: {}", e)))?;
        Ok(HttpSession {
            client: Some(client),
        })
    }
}

pub struct HttpSession {
    client: Option<reqwest::Client>,
}

impl HttpSession {
    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), NavigationError> {
        let client = self.client.as_ref().ok_or_else(|| NavigationError {
            url: url.to_string(),
            reason: "session closed".to_string(),
        })?;
        let response = client.get(url).send().await.map_err(|e| NavigationError {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        debug!("{} answered {}", url, response.status());
        Ok(())
    }

    async fn close(&mut self) {
        self.client = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!("{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_navigate_success() {
        let url = serve_once("HTTP/1.1 200 OK").await;
        let mut session = HttpBrowser::default().launch().await.unwrap();
        assert!(session.navigate(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_error_status_still_counts_as_loaded() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let mut session = HttpBrowser::default().launch().await.unwrap();
        assert!(session.navigate(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_navigate_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut session = HttpBrowser::default().launch().await.unwrap();
        let err = session.navigate(&format!("http://{}", addr)).await.unwrap_err();
        assert!(err.url.contains(&addr.port().to_string()));
    }

    struct CountingSession {
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl BrowserSession for CountingSession {
        async fn navigate(&mut self, _url: &str) -> std::result::Result<(), NavigationError> {
            Ok(())
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_guard_close_then_drop_closes_once() {
        let closes = Arc::new(AtomicU32::new(0));
        let mut guard = SessionGuard::new(CountingSession {
            closes: Arc::clone(&closes),
        });
        assert!(guard.navigate("http://localhost:7007").await.is_ok());
        guard.close().await;
        assert!(!guard.is_open());
        let err = guard.navigate("http://localhost:7007").await.unwrap_err();
        assert_eq!(err.reason, "session closed");
        drop(guard);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guard_dropped_open_closes_in_background() {
        let closes = Arc::new(AtomicU32::new(0));
        let guard = SessionGuard::new(CountingSession {
            closes: Arc::clone(&closes),
        });
        drop(guard);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_dropped_outside_runtime_does_not_panic() {
        let closes = Arc::new(AtomicU32::new(0));
        drop(SessionGuard::new(CountingSession {
            closes: Arc::clone(&closes),
        }));
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_navigation() {
        let mut session = HttpBrowser::default().launch().await.unwrap();
        session.close().await;
        assert!(!session.is_open());
        let err = session.navigate("http://127.0.0.1:1").await.unwrap_err();
        assert_eq!(err.reason, "session closed");
        session.close().await;
    }
}
