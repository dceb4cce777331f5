//! # voltage_c37118
//!
//! IEEE C37.118 synchrophasor streaming client for Rust.
//!
//! This crate connects to a Phasor Measurement Unit (or PMU simulator) over
//! TCP, negotiates the stream configuration and turns every data frame into
//! structured, unit-correct records for a downstream ingest callback.
//!
//! ## Features
//!
//! - **Resilient session**: fixed-delay reconnection, re-handshake on schema
//!   change, cooperative stop
//! - **Full data decoding**: rectangular/polar phasors, fixed-point and float
//!   encodings selected per station
//! - **Static or negotiated configuration**: request CFG-2 from the PMU or
//!   supply the station layout up front
//! - **Pure codec**: decoders and encoders usable without the session
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voltage_c37118::{ClientConfig, PmuClient};
//!
//! #[tokio::main]
//! async fn main() -> voltage_c37118::Result<()> {
//!     let mut client = PmuClient::new();
//!     client
//!         .set_configuration(ClientConfig::new("192.168.1.50", 4712).my_id_code(7).stream_id_code(2))
//!         .await?;
//!
//!     client.register_ingest(|record| {
//!         println!("{}: {} stations", record.asset, record.stations.len());
//!     });
//!     client.start()?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     client.stop().await
//! }
//! ```
//!
//! ## Protocol Overview
//!
//! IEEE C37.118.2 runs over TCP (commonly port 4712). A client sends command
//! frames; the PMU answers with header, configuration and data frames:
//!
//! - **Header**: free text describing the PMU
//! - **CFG-2**: station names, channel names, units and data formats
//! - **Data**: one measurement block per station, laid out by CFG-2
//! - **Command**: turn transmission on/off, send header, send CFG-1/CFG-2
//!
//! ### Frame Structure
//!
//! ```text
//! +------+---------+--------+-------+-----------+---------+------+
//! | SYNC | FRAMESZ | IDCODE |  SOC  |  FRACSEC  | payload | CHK  |
//! | (2)  |   (2)   |  (2)   |  (4)  |    (4)    |   ...   | (2)  |
//! +------+---------+--------+-------+-----------+---------+------+
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod mapper;
pub mod model;
pub mod parser;
pub mod session;
pub mod types;

// Re-export main types
pub use client::PmuClient;
pub use codec::{
    encode_command, encode_configuration, encode_data, encode_header, C37118Codec, Command,
    RawFrame,
};
pub use config::ClientConfig;
pub use connection::{ConnectOutcome, ConnectionManager, Connector, TcpConnector};
pub use error::{C37118Error, Result};
pub use mapper::{map_to_records, OutputRecord, RecordOptions};
pub use model::ConfigurationModel;
pub use parser::{decode_command, decode_configuration, decode_data, decode_header};
pub use session::{IngestCallback, SessionState};
pub use types::*;
