//! IEEE C37.118 type definitions.
//!
//! This module contains the core types for the C37.118 protocol:
//!
//! - `FrameHeader`, `FrameType`, `CommandCode`, `Timestamp` - common frame prefix
//! - `FormatFlags` - per-station numeric encoding selection
//! - `PhasorUnit`, `AnalogUnit`, `DigitalUnit`, `NominalFrequency` - conversion factors
//! - `StreamConfiguration`, `StationConfig` - channel layout of a stream
//! - `DataFrame`, `StationMeasurement`, `Phasor` - decoded measurements

mod config;
mod data;
mod format;
mod frame;
mod units;

pub use config::*;
pub use data::*;
pub use format::*;
pub use frame::*;
pub use units::*;

#[cfg(test)]
pub(crate) use config::fixtures;
