//! Socket lifecycle.
//!
//! [`ConnectionManager`] owns at most one framed stream. It connects through a
//! [`Connector`], retrying after a fixed delay until it succeeds or the
//! cancellation token fires, and turns every transport failure into
//! [`C37118Error::ConnectionLost`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::{C37118Codec, Command, RawFrame};
use crate::error::{C37118Error, Result};

/// Opens byte streams to a PMU.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced on success.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open one stream to `address:port`.
    ///
    /// Return [`C37118Error::SocketCreation`] only when no socket can be
    /// allocated at all; any other error is retried.
    async fn connect(&self, address: &str, port: u16) -> Result<Self::Stream>;
}

/// TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, address: &str, port: u16) -> Result<TcpStream> {
        let addr = lookup_host((address, port))
            .await
            .map_err(|e| C37118Error::Connection(format!("resolve {address}:{port}: {e}")))?
            .next()
            .ok_or_else(|| C37118Error::Connection(format!("no address for {address}:{port}")))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(C37118Error::SocketCreation)?;

        let stream = socket
            .connect(addr)
            .await
            .map_err(|e| C37118Error::Connection(format!("connect {addr}: {e}")))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true).ok();
        Ok(stream)
    }
}

/// Result of [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Stream is open
    Connected,
    /// Stop requested before a connection was made
    Aborted,
}

/// Owner of the PMU stream.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    address: String,
    port: u16,
    reconnection_delay: Duration,
    framed: Option<Framed<C::Stream, C37118Codec>>,
    attempts: u64,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager; nothing is opened until [`connect`](Self::connect).
    pub fn new(connector: Arc<C>, address: impl Into<String>, port: u16, reconnection_delay: Duration) -> Self {
        Self {
            connector,
            address: address.into(),
            port,
            reconnection_delay,
            framed: None,
            attempts: 0,
        }
    }

    /// Whether a stream is open.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Connection attempts made so far, successful ones included.
    #[inline]
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Connect, retrying every `reconnection_delay` until success or `cancel`.
    ///
    /// Any open stream is closed first. Only a socket creation failure is
    /// returned as an error.
    pub async fn connect(&mut self, cancel: &CancellationToken) -> Result<ConnectOutcome> {
        self.close();
        loop {
            if cancel.is_cancelled() {
                return Ok(ConnectOutcome::Aborted);
            }
            self.attempts += 1;
            tracing::info!(address = %self.address, port = self.port, attempt = self.attempts, "connecting to PMU");

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Ok(ConnectOutcome::Aborted),
                result = self.connector.connect(&self.address, self.port) => result,
            };

            match attempt {
                Ok(stream) => {
                    self.framed = Some(Framed::new(stream, C37118Codec::new()));
                    tracing::info!(address = %self.address, port = self.port, "connected to PMU");
                    return Ok(ConnectOutcome::Connected);
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "cannot open socket");
                    return Err(e);
                }
                Err(e) => {
                    tracing::info!(
                        error = %e,
                        delay_secs = self.reconnection_delay.as_secs_f64(),
                        "connection failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::debug!("stop received while waiting to reconnect");
                            return Ok(ConnectOutcome::Aborted);
                        }
                        _ = tokio::time::sleep(self.reconnection_delay) => {}
                    }
                }
            }
        }
    }

    /// Write one command frame.
    pub async fn send(&mut self, command: Command) -> Result<()> {
        let framed = self.framed.as_mut().ok_or(C37118Error::ConnectionLost)?;
        if let Err(e) = framed.send(command).await {
            tracing::debug!(error = %e, "write failed");
            self.close();
            return Err(C37118Error::ConnectionLost);
        }
        tracing::trace!(command = ?command.code, "command sent");
        Ok(())
    }

    /// Read the next whole frame.
    ///
    /// End of stream and read errors both close the stream and return
    /// [`C37118Error::ConnectionLost`].
    pub async fn receive(&mut self) -> Result<RawFrame> {
        let framed = self.framed.as_mut().ok_or(C37118Error::ConnectionLost)?;
        match framed.next().await {
            Some(Ok(frame)) => {
                tracing::trace!(%frame, "frame received");
                Ok(frame)
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "read failed");
                self.close();
                Err(C37118Error::ConnectionLost)
            }
            None => {
                self.close();
                Err(C37118Error::ConnectionLost)
            }
        }
    }

    /// Close the stream. Returns whether one was open.
    pub fn close(&mut self) -> bool {
        match self.framed.take() {
            Some(_) => {
                tracing::debug!(address = %self.address, "connection closed");
                true
            }
            None => false,
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .field("attempts", &self.attempts)
            .finish()
    }
}
