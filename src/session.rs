//! Session engine.
//!
//! One [`Session`] runs as a single task: connect, handshake (unless a static
//! configuration is in use), turn transmission on, then decode data frames
//! until the connection drops or the cancellation token fires.
//!
//! ```text
//!  Disconnected ──► Connecting ──► AwaitingHeader ──► AwaitingConfiguration ──┐
//!                     ▲   │  (static configuration)                           │
//!                     │   └────────────────────────────────► Streaming ◄──────┘
//!                     └──────── connection lost / handshake failure ─┘
//!  any state ── stop ──► Terminating ──► Terminated
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::codec::{Command, RawFrame};
use crate::config::ClientConfig;
use crate::connection::{ConnectOutcome, ConnectionManager, Connector};
use crate::error::{C37118Error, Result};
use crate::mapper::{map_to_records, OutputRecord, RecordOptions};
use crate::model::ConfigurationModel;
use crate::parser::{decode_configuration, decode_data, decode_header};
use crate::types::{CommandCode, FrameType, Timestamp};

/// Callback receiving every output record.
pub type IngestCallback = Arc<dyn Fn(OutputRecord) + Send + Sync>;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not started
    #[default]
    Disconnected,
    /// Opening the TCP connection
    Connecting,
    /// Header requested
    AwaitingHeader,
    /// CFG-2 requested
    AwaitingConfiguration,
    /// Data transmission on, decoding data frames
    Streaming,
    /// Stop requested, turning transmission off
    Terminating,
    /// Stopped
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHeader => "awaiting header",
            Self::AwaitingConfiguration => "awaiting configuration",
            Self::Streaming => "streaming",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What the run loop does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Proceed,
    Reconnect,
    Stop,
}

/// Wait `delay` unless stopped first.
async fn pause(cancel: &CancellationToken, delay: Duration) -> Next {
    tokio::select! {
        _ = cancel.cancelled() => Next::Stop,
        _ = tokio::time::sleep(delay) => Next::Proceed,
    }
}

/// A running session. Built by [`crate::client::PmuClient::start`].
pub struct Session<C: Connector> {
    config: ClientConfig,
    connection: ConnectionManager<C>,
    model: ConfigurationModel,
    options: RecordOptions,
    ingest: Option<IngestCallback>,
    state_tx: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
}

impl<C: Connector> Session<C> {
    /// Create a session. A static configuration, if `config` uses one, is
    /// loaded into the model here.
    pub fn new(
        config: ClientConfig,
        connector: Arc<C>,
        ingest: Option<IngestCallback>,
        state_tx: Arc<watch::Sender<SessionState>>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let model = match (&config.static_configuration, config.request_config_from_source) {
            (Some(static_config), false) => ConfigurationModel::with_configuration(static_config.clone())?,
            (None, false) => {
                return Err(C37118Error::invalid_config(
                    "static configuration required when not requesting it from the PMU",
                ))
            }
            (_, true) => ConfigurationModel::new(),
        };
        let connection = ConnectionManager::new(
            connector,
            config.address.clone(),
            config.port,
            config.reconnection_delay,
        );
        Ok(Self {
            options: config.record_options(),
            config,
            connection,
            model,
            ingest,
            state_tx,
            cancel,
        })
    }

    /// Run until stopped. Returns an error only when the session cannot go on
    /// at all (no socket can be created).
    pub async fn run(mut self) -> Result<()> {
        let result = self.drive().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "session aborted");
        }
        self.terminate().await;
        result
    }

    async fn drive(&mut self) -> Result<()> {
        loop {
            self.set_state(SessionState::Connecting);
            if self.connection.connect(&self.cancel).await? == ConnectOutcome::Aborted {
                return Ok(());
            }

            if !self.model.is_configured() {
                match self.handshake().await {
                    Ok(Next::Proceed) => {}
                    Ok(Next::Reconnect) => continue,
                    Ok(Next::Stop) => return Ok(()),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, "handshake failed, reconnecting");
                        self.connection.close();
                        if pause(&self.cancel, self.config.reconnection_delay).await == Next::Stop {
                            return Ok(());
                        }
                        continue;
                    }
                }
            }

            match self.stream().await? {
                Next::Stop => return Ok(()),
                Next::Proceed | Next::Reconnect => continue,
            }
        }
    }

    /// Request header then CFG-2 and load the configuration.
    async fn handshake(&mut self) -> Result<Next> {
        self.set_state(SessionState::AwaitingHeader);
        if self.send_command(CommandCode::SendHeader).await? == Next::Stop {
            return Ok(Next::Stop);
        }
        let Some(frame) = self.await_reply(FrameType::Header).await? else {
            return Ok(Next::Stop);
        };
        let header = decode_header(&frame.bytes)?;
        tracing::info!(header = %header, "header from PMU");

        self.set_state(SessionState::AwaitingConfiguration);
        if self.send_command(CommandCode::SendConfig2).await? == Next::Stop {
            return Ok(Next::Stop);
        }
        let Some(frame) = self.await_reply(FrameType::Config2).await? else {
            return Ok(Next::Stop);
        };
        let config = decode_configuration(&frame.bytes)?;
        if config.identity.id_code != self.config.stream_id_code {
            tracing::warn!(
                received = config.identity.id_code,
                expected = self.config.stream_id_code,
                "configuration IDCODE differs from STREAMSOURCE_IDCODE"
            );
        }
        self.model.replace(config)?;
        self.report_filter();
        Ok(Next::Proceed)
    }

    /// Log filter entries that match no configured station.
    fn report_filter(&self) {
        for &id_code in &self.options.station_filter {
            if let Err(e) = self.model.lookup_station(id_code) {
                tracing::warn!(error = %e, "station filter entry matches no station");
            }
        }
    }

    /// Turn transmission on and decode data frames.
    async fn stream(&mut self) -> Result<Next> {
        match self.send_command(CommandCode::TurnOn).await {
            Ok(Next::Proceed) => {}
            Ok(other) => return Ok(other),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "turn-on failed, reconnecting");
                self.connection.close();
                return Ok(pause(&self.cancel, self.config.reconnection_delay).await);
            }
        }
        self.set_state(SessionState::Streaming);
        tracing::info!("receiving real time data");

        let cancel = self.cancel.clone();
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Ok(Next::Stop),
                result = self.connection.receive() => result,
            };
            match received {
                Ok(frame) if frame.frame_type() == FrameType::Data => {
                    if self.handle_data(&frame) == Next::Reconnect {
                        self.connection.close();
                        return Ok(Next::Reconnect);
                    }
                }
                Ok(frame) => tracing::debug!(%frame, "ignoring frame while streaming"),
                Err(e) => {
                    tracing::info!(error = %e, "connection lost with PMU, reconnecting");
                    self.connection.close();
                    return Ok(Next::Reconnect);
                }
            }
        }
    }

    fn handle_data(&mut self, frame: &RawFrame) -> Next {
        let Some(config) = self.model.active() else {
            return Next::Reconnect;
        };
        match decode_data(&frame.bytes, config) {
            Ok(data) => {
                let records = map_to_records(&data, config, &self.options);
                if let Some(ingest) = &self.ingest {
                    for record in records {
                        ingest(record);
                    }
                }
                Next::Proceed
            }
            Err(e) if e.requires_reconfiguration() && self.config.request_config_from_source => {
                tracing::warn!(error = %e, "data no longer matches configuration, requesting it again");
                self.model.clear();
                Next::Reconnect
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding data frame");
                Next::Proceed
            }
        }
    }

    /// Send a command; on a transport failure reconnect once and resend.
    async fn send_command(&mut self, code: CommandCode) -> Result<Next> {
        let cancel = self.cancel.clone();
        let command = self.command(code);
        let first = tokio::select! {
            _ = cancel.cancelled() => return Ok(Next::Stop),
            result = self.connection.send(command) => result,
        };
        match first {
            Ok(()) => return Ok(Next::Proceed),
            Err(e) if e.is_connection_error() => {
                tracing::warn!(error = %e, command = ?code, "command failed, reconnecting")
            }
            Err(e) => return Err(e),
        }

        if self.connection.connect(&cancel).await? == ConnectOutcome::Aborted {
            return Ok(Next::Stop);
        }
        let command = self.command(code);
        tokio::select! {
            _ = cancel.cancelled() => Ok(Next::Stop),
            result = self.connection.send(command) => result.map(|()| Next::Proceed),
        }
    }

    fn command(&self, code: CommandCode) -> Command {
        let time_base = self
            .model
            .active()
            .map(|c| c.identity.time_base)
            .unwrap_or(1_000_000);
        Command {
            code,
            id_code: self.config.my_id_code,
            timestamp: Timestamp::now(time_base),
        }
    }

    /// Wait for a frame of type `expected`, skipping others.
    ///
    /// `None` when stopped; [`C37118Error::Timeout`] after the response timeout.
    async fn await_reply(&mut self, expected: FrameType) -> Result<Option<RawFrame>> {
        let cancel = self.cancel.clone();
        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                result = timeout_at(deadline, self.connection.receive()) => result,
            };
            match received {
                Err(_) => return Err(C37118Error::Timeout),
                Ok(Ok(frame)) if frame.frame_type() == expected => return Ok(Some(frame)),
                Ok(Ok(frame)) => tracing::debug!(%frame, %expected, "skipping unexpected frame"),
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// Turn transmission off if connected, close, publish `Terminated`.
    async fn terminate(&mut self) {
        if self.connection.is_connected() {
            self.set_state(SessionState::Terminating);
            let command = self.command(CommandCode::TurnOff);
            match timeout(self.config.response_timeout, self.connection.send(command)).await {
                Ok(Ok(())) => tracing::debug!("transmission turned off"),
                Ok(Err(e)) => tracing::debug!(error = %e, "turn-off not sent"),
                Err(_) => tracing::debug!("turn-off timed out"),
            }
            self.connection.close();
        }
        self.set_state(SessionState::Terminated);
        tracing::info!("session terminated");
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "session state");
        }
    }
}
