//! NotificationChannel - WebSocket listener for trainer progress events.
//!
//! Provides:
//! - TCP listener bound once per run
//! - One task per connected client
//! - Frame decoding into `ProgressEvent`s, applied to the shared counter

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;

use super::counter::{EventDispatcher, TerminationReceiver};
use crate::domain::ProgressEvent;
use crate::error::{RefineryError, Result};

pub struct NotificationChannel {
    local_addr: SocketAddr,
    dispatcher: Arc<EventDispatcher>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    accept_task: Option<JoinHandle<()>>,
}

impl NotificationChannel {
    /// Bind the listener and start accepting connections.
    ///
    /// Termination signals are delivered through the returned receiver.
    pub async fn bind(addr: SocketAddr, threshold: u32) -> Result<(Self, TerminationReceiver)> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RefineryError::Notification(format!("Failed to bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;
        let (dispatcher, receiver) = EventDispatcher::new(threshold);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&dispatcher), shutdown_rx));
        info!("Notification listener on ws://{} (threshold {})", local_addr, threshold.max(1));

        Ok((
            Self {
                local_addr,
                dispatcher,
                shutdown_tx: Some(shutdown_tx),
                accept_task: Some(accept_task),
            },
            receiver,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.accept_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Zero the camera counter.
    pub async fn reset(&self) {
        self.dispatcher.reset().await;
    }

    /// Stop accepting and close every open connection.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(task) = self.accept_task.take()
            && let Err(e) = task.await
        {
            warn!("Notification listener ended abnormally: {}", e);
        }
        info!("Notification listener on {} stopped", self.local_addr);
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<EventDispatcher>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut connections = JoinSet::new();
    let mut next_client_id: u64 = 1;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let client_id = next_client_id;
                        next_client_id += 1;
                        debug!("Client {} connected from {}", client_id, peer);

                        let dispatcher = Arc::clone(&dispatcher);
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, dispatcher).await {
                                warn!("Client {}: {}", client_id, e);
                            }
                            debug!("Client {} disconnected", client_id);
                        });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    connections.shutdown().await;
}

async fn serve_connection(stream: TcpStream, dispatcher: Arc<EventDispatcher>) -> Result<()> {
    let mut ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| RefineryError::Notification(format!("Handshake failed: {}", e)))?;

    while let Some(message) = ws.next().await {
        let message =
            message.map_err(|e| RefineryError::Notification(format!("Read failed: {}", e)))?;
        match message {
            Message::Text(text) => handle_frame(text.as_bytes(), &dispatcher).await,
            Message::Binary(bytes) => handle_frame(&bytes, &dispatcher).await,
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

async fn handle_frame(frame: &[u8], dispatcher: &EventDispatcher) {
    match ProgressEvent::decode(frame) {
        Ok(event) => {
            dispatcher.dispatch(&event).await;
        }
        Err(e) => warn!(
            "Ignoring malformed frame '{}': {}",
            String::from_utf8_lossy(frame),
            e
        ),
    }
}
