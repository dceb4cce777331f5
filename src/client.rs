//! IEEE C37.118 client.
//!
//! [`PmuClient`] is the surface a host drives: configure, register an ingest
//! callback, start, stop. The protocol work happens in a spawned
//! [`Session`] task; the client only owns its cancellation token and join
//! handle.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::connection::{Connector, TcpConnector};
use crate::error::{C37118Error, Result};
use crate::mapper::OutputRecord;
use crate::session::{IngestCallback, Session, SessionState};

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

/// IEEE C37.118 PMU client.
///
/// # Example
///
/// ```rust,ignore
/// let mut client = PmuClient::new();
/// client.set_configuration(ClientConfig::new("192.168.1.50", 4712).my_id_code(7)).await?;
/// client.register_ingest(|record| println!("{}", record.asset));
/// client.start()?;
/// // ...
/// client.stop().await?;
/// ```
pub struct PmuClient<C: Connector = TcpConnector> {
    config: Option<ClientConfig>,
    connector: Arc<C>,
    ingest: Option<IngestCallback>,
    state_tx: Arc<watch::Sender<SessionState>>,
    running: Option<Running>,
}

impl PmuClient<TcpConnector> {
    /// Create an unconfigured client connecting over TCP.
    pub fn new() -> Self {
        Self::with_connector(TcpConnector)
    }
}

impl Default for PmuClient<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> PmuClient<C> {
    /// Create an unconfigured client using `connector` to reach the PMU.
    pub fn with_connector(connector: C) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            config: None,
            connector: Arc::new(connector),
            ingest: None,
            state_tx: Arc::new(state_tx),
            running: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch session state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Active client configuration.
    pub fn configuration(&self) -> Option<&ClientConfig> {
        self.config.as_ref()
    }

    /// Whether a session task is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Register the callback receiving output records.
    ///
    /// Takes effect at the next [`start`](Self::start).
    pub fn register_ingest<F>(&mut self, callback: F)
    where
        F: Fn(OutputRecord) + Send + Sync + 'static,
    {
        self.ingest = Some(Arc::new(callback));
    }

    /// Install a new configuration.
    ///
    /// The configuration is validated first; an invalid one is rejected and
    /// the running session, if any, is left alone. Otherwise a running session
    /// is stopped and joined, the configuration replaced, and the session
    /// started again.
    pub async fn set_configuration(&mut self, config: ClientConfig) -> Result<()> {
        config.validate()?;
        let was_running = self.running.is_some();
        if was_running {
            tracing::info!("reconfiguring, stopping session");
            if let Err(e) = self.stop().await {
                tracing::warn!(error = %e, "previous session ended with error");
            }
        }
        self.config = Some(config);
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// [`set_configuration`](Self::set_configuration) from the host's JSON blob.
    pub async fn set_configuration_json(&mut self, json: &str) -> Result<()> {
        self.set_configuration(ClientConfig::from_json(json)?).await
    }

    /// Spawn the session task. Does nothing if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let config = self
            .config
            .clone()
            .ok_or_else(|| C37118Error::invalid_config("no configuration set"))?;
        let cancel = CancellationToken::new();
        let session = Session::new(
            config,
            Arc::clone(&self.connector),
            self.ingest.clone(),
            Arc::clone(&self.state_tx),
            cancel.clone(),
        )?;
        tracing::info!("C37.118 session start");
        let handle = tokio::spawn(session.run());
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Stop the session and wait for it to finish.
    ///
    /// Calling it again, or before [`start`](Self::start), is a no-op.
    /// Returns the error that ended the session, if it ended on its own.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(Running { cancel, handle }) = self.running.take() else {
            return Ok(());
        };
        cancel.cancel();
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                // The task did not publish its final state
                self.state_tx.send_replace(SessionState::Terminated);
                Err(C37118Error::Connection(format!("session task failed: {e}")))
            }
        }
    }
}

impl<C: Connector> Drop for PmuClient<C> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

impl<C: Connector> std::fmt::Debug for PmuClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PmuClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_is_disconnected() {
        let client = PmuClient::new();
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(!client.is_running());
        assert!(client.configuration().is_none());
    }

    #[test]
    fn test_start_without_configuration() {
        let mut client = PmuClient::new();
        assert!(matches!(client.start(), Err(C37118Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_invalid_configuration_rejected() {
        let mut client = PmuClient::new();
        let mut config = ClientConfig::new("pmu", 4712);
        config.request_config_from_source = false;
        assert!(client.set_configuration(config).await.is_err());
        assert!(client.configuration().is_none());
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let mut client = PmuClient::new();
        client.stop().await.unwrap();
        client.stop().await.unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);
    }
}
