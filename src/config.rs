//! Client configuration.
//!
//! A [`ClientConfig`] is either built in code:
//!
//! ```rust,ignore
//! let config = ClientConfig::new("192.168.1.50", 4712)
//!     .my_id_code(7)
//!     .stream_id_code(2)
//!     .reconnection_delay(Duration::from_secs(2));
//! ```
//!
//! or imported from the JSON blob a host hands over at reconfiguration:
//!
//! ```json
//! {
//!     "IP_ADDR": "127.0.0.1", "IP_PORT": 4712, "RECONNECTION_DELAY": 1,
//!     "MY_IDCODE": 7, "STREAMSOURCE_IDCODE": 2,
//!     "SPLIT_STATIONS": true, "STN_IDCODES_FILTER": [],
//!     "REQUEST_CONFIG_TO_SENDER": true
//! }
//! ```
//!
//! With `REQUEST_CONFIG_TO_SENDER` set to `false`, `SENDER_HARD_CONFIG` must
//! describe the stream the PMU sends.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{C37118Error, Result};
use crate::mapper::RecordOptions;
use crate::types::{
    AnalogChannel, AnalogUnit, DigitalUnit, DigitalWord, FormatFlags, NominalFrequency,
    PhasorChannel, PhasorUnit, StationConfig, StreamConfiguration, StreamIdentity,
    DIGITALS_PER_WORD,
};

/// Default C37.118 TCP port.
pub const DEFAULT_PORT: u16 = 4712;

/// Default delay between connection attempts in seconds.
pub const DEFAULT_RECONNECTION_DELAY: u64 = 1;

/// Default time to wait for a header or CFG-2 reply in seconds.
pub const DEFAULT_RESPONSE_TIMEOUT: u64 = 5;

/// Default asset name of combined records.
pub const DEFAULT_ASSET_NAME: &str = "c37118";

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// PMU host name or address
    pub address: String,
    /// PMU TCP port
    pub port: u16,
    /// Fixed delay between connection attempts
    pub reconnection_delay: Duration,
    /// Time to wait for a header or configuration reply
    pub response_timeout: Duration,
    /// IDCODE written into outgoing command frames
    pub my_id_code: u16,
    /// Expected IDCODE of the data stream
    pub stream_id_code: u16,
    /// One record per station instead of one per frame
    pub split_stations: bool,
    /// Station IDCODEs to keep; empty keeps all
    pub station_filter: Vec<u16>,
    /// Request the configuration from the PMU instead of using a static one
    pub request_config_from_source: bool,
    /// Static configuration used when not requesting from the PMU
    pub static_configuration: Option<StreamConfiguration>,
    /// Asset name of combined records
    pub asset_name: String,
}

impl ClientConfig {
    /// Create a configuration for the PMU at `address:port`.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            reconnection_delay: Duration::from_secs(DEFAULT_RECONNECTION_DELAY),
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT),
            my_id_code: 1,
            stream_id_code: 1,
            split_stations: true,
            station_filter: Vec::new(),
            request_config_from_source: true,
            static_configuration: None,
            asset_name: DEFAULT_ASSET_NAME.to_string(),
        }
    }

    /// Set reconnection delay.
    pub fn reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    /// Set response timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the local IDCODE.
    pub fn my_id_code(mut self, id_code: u16) -> Self {
        self.my_id_code = id_code;
        self
    }

    /// Set the expected stream IDCODE.
    pub fn stream_id_code(mut self, id_code: u16) -> Self {
        self.stream_id_code = id_code;
        self
    }

    /// Set split-stations mode.
    pub fn split_stations(mut self, split: bool) -> Self {
        self.split_stations = split;
        self
    }

    /// Restrict output to these station IDCODEs.
    pub fn station_filter(mut self, id_codes: impl IntoIterator<Item = u16>) -> Self {
        self.station_filter = id_codes.into_iter().collect();
        self
    }

    /// Use `config` instead of requesting one from the PMU.
    pub fn static_configuration(mut self, config: StreamConfiguration) -> Self {
        self.static_configuration = Some(config);
        self.request_config_from_source = false;
        self
    }

    /// Set asset name of combined records.
    pub fn asset_name(mut self, name: impl Into<String>) -> Self {
        self.asset_name = name.into();
        self
    }

    /// Import the host's JSON configuration blob.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawClientConfig = serde_json::from_str(json)
            .map_err(|e| C37118Error::invalid_config(format!("configuration JSON: {e}")))?;
        let config = raw.into_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable.
    ///
    /// Fails with [`C37118Error::InvalidConfig`] on an empty address, a zero
    /// port or a missing static configuration, and with
    /// [`C37118Error::IncompleteConfiguration`] when the static configuration
    /// does not validate.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(C37118Error::invalid_config("IP_ADDR is empty"));
        }
        if self.port == 0 {
            return Err(C37118Error::invalid_config("IP_PORT is zero"));
        }
        match (&self.static_configuration, self.request_config_from_source) {
            (None, false) => Err(C37118Error::invalid_config(
                "SENDER_HARD_CONFIG is required when REQUEST_CONFIG_TO_SENDER is false",
            )),
            (Some(config), _) => config.validate(),
            (None, true) => Ok(()),
        }
    }

    /// Options handed to the reading mapper.
    pub fn record_options(&self) -> RecordOptions {
        RecordOptions {
            split_stations: self.split_stations,
            station_filter: self.station_filter.clone(),
            asset_name: self.asset_name.clone(),
        }
    }
}

fn default_reconnection_delay() -> u64 {
    DEFAULT_RECONNECTION_DELAY
}

fn default_response_timeout() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RawClientConfig {
    ip_addr: String,
    ip_port: u16,
    #[serde(default = "default_reconnection_delay")]
    reconnection_delay: u64,
    my_idcode: u16,
    streamsource_idcode: u16,
    #[serde(default = "default_true")]
    split_stations: bool,
    #[serde(default)]
    stn_idcodes_filter: Vec<u16>,
    #[serde(default = "default_true")]
    request_config_to_sender: bool,
    #[serde(default)]
    sender_hard_config: Option<RawHardConfig>,
    #[serde(default = "default_response_timeout")]
    response_timeout: u64,
    #[serde(default)]
    asset_name: Option<String>,
}

impl RawClientConfig {
    fn into_config(self) -> Result<ClientConfig> {
        // The hard config is only meaningful, and only checked, when it is used.
        let static_configuration = match (self.request_config_to_sender, self.sender_hard_config) {
            (false, Some(hard)) => Some(hard.into_configuration(self.streamsource_idcode)?),
            _ => None,
        };
        Ok(ClientConfig {
            address: self.ip_addr,
            port: self.ip_port,
            reconnection_delay: Duration::from_secs(self.reconnection_delay),
            response_timeout: Duration::from_secs(self.response_timeout),
            my_id_code: self.my_idcode,
            stream_id_code: self.streamsource_idcode,
            split_stations: self.split_stations,
            station_filter: self.stn_idcodes_filter,
            request_config_from_source: self.request_config_to_sender,
            static_configuration,
            asset_name: self
                .asset_name
                .unwrap_or_else(|| DEFAULT_ASSET_NAME.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RawHardConfig {
    time_base: u32,
    #[serde(default)]
    data_rate: i16,
    stations: Vec<RawStation>,
}

impl RawHardConfig {
    fn into_configuration(self, stream_id_code: u16) -> Result<StreamConfiguration> {
        let stations = self
            .stations
            .into_iter()
            .map(RawStation::into_station)
            .collect::<Result<Vec<_>>>()?;
        Ok(StreamConfiguration::new(
            StreamIdentity::new(stream_id_code, self.time_base, self.data_rate),
            stations,
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RawStation {
    stn: String,
    stn_idcode: u16,
    stn_format: u16,
    #[serde(default)]
    stn_phnam: Vec<String>,
    #[serde(default)]
    stn_annam: Vec<String>,
    #[serde(default)]
    stn_dgnam: Vec<String>,
    #[serde(default)]
    stn_phunit: Vec<u32>,
    #[serde(default)]
    stn_anunit: Vec<u32>,
    #[serde(default)]
    stn_digunit: Vec<u32>,
    #[serde(default)]
    stn_fnom: u16,
    #[serde(default)]
    cfgcnt: u16,
}

impl RawStation {
    fn into_station(self) -> Result<StationConfig> {
        let name = self.stn;
        let mismatch = |what: &str, names: usize, units: usize| {
            C37118Error::incomplete(format!(
                "{name}: {names} {what} names but {units} units"
            ))
        };
        if self.stn_phnam.len() != self.stn_phunit.len() {
            return Err(mismatch("phasor", self.stn_phnam.len(), self.stn_phunit.len()));
        }
        if self.stn_annam.len() != self.stn_anunit.len() {
            return Err(mismatch("analog", self.stn_annam.len(), self.stn_anunit.len()));
        }
        if self.stn_dgnam.len() != DIGITALS_PER_WORD * self.stn_digunit.len() {
            return Err(mismatch("digital", self.stn_dgnam.len(), self.stn_digunit.len()));
        }

        let phasors = self
            .stn_phnam
            .into_iter()
            .zip(self.stn_phunit)
            .map(|(name, unit)| PhasorChannel {
                name,
                unit: PhasorUnit::from_u32(unit),
            })
            .collect();
        let analogs = self
            .stn_annam
            .into_iter()
            .zip(self.stn_anunit)
            .map(|(name, unit)| AnalogChannel {
                name,
                unit: AnalogUnit::from_u32(unit),
            })
            .collect();
        let digitals = self
            .stn_dgnam
            .chunks(DIGITALS_PER_WORD)
            .zip(self.stn_digunit)
            .map(|(names, unit)| DigitalWord {
                names: names.to_vec(),
                unit: DigitalUnit::from_u32(unit),
            })
            .collect();

        Ok(StationConfig {
            format: FormatFlags::from_bits(self.stn_format)?,
            id_code: self.stn_idcode,
            phasors,
            analogs,
            digitals,
            nominal_frequency: NominalFrequency::from_u16(self.stn_fnom),
            config_change_count: self.cfgcnt,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PMU_CONF: &str = r#"{
        "IP_ADDR": "127.0.0.1",
        "IP_PORT": 1410,
        "RECONNECTION_DELAY": 2,
        "MY_IDCODE": 7,
        "STREAMSOURCE_IDCODE": 2,
        "SPLIT_STATIONS": false,
        "STN_IDCODES_FILTER": [5],
        "REQUEST_CONFIG_TO_SENDER": false,
        "SENDER_HARD_CONFIG": {
            "TIME_BASE": 1000000,
            "DATA_RATE": 30,
            "STATIONS": [
                {
                    "STN": "RANDOM STATION 1",
                    "STN_IDCODE": 5,
                    "STN_FORMAT": 15,
                    "STN_PHNAM": ["VA", "VB", "VC"],
                    "STN_ANNAM": ["ANALOG"],
                    "STN_DGNAM": ["DG1", "DG2", "DG3", "DG4", "DG5", "DG6", "DG7", "DG8",
                                  "DG9", "DG10", "DG11", "DG12", "DG13", "DG14", "DG15", "DG16"],
                    "STN_PHUNIT": [0, 0, 0],
                    "STN_ANUNIT": [0],
                    "STN_DIGUNIT": [65535],
                    "STN_FNOM": 1,
                    "CFGCNT": 1
                }
            ]
        }
    }"#;

    #[test]
    fn test_builder_defaults() {
        let config = ClientConfig::new("10.0.0.1", DEFAULT_PORT);
        assert_eq!(config.reconnection_delay, Duration::from_secs(1));
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert!(config.split_stations);
        assert!(config.request_config_from_source);
        assert_eq!(config.asset_name, "c37118");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_with_hard_config() {
        let config = ClientConfig::from_json(PMU_CONF).unwrap();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 1410);
        assert_eq!(config.reconnection_delay, Duration::from_secs(2));
        assert_eq!(config.my_id_code, 7);
        assert_eq!(config.station_filter, vec![5]);
        assert!(!config.split_stations);
        assert!(!config.request_config_from_source);

        let cfg = config.static_configuration.unwrap();
        assert_eq!(cfg.identity, StreamIdentity::new(2, 1_000_000, 30));
        let station = cfg.lookup_station(5).unwrap();
        assert_eq!(station.name, "RANDOM STATION 1");
        assert_eq!(station.phasor_count(), 3);
        assert_eq!(station.digital_word_count(), 1);
        assert_eq!(station.digitals[0].names[15], "DG16");
        assert_eq!(station.digitals[0].unit.valid_inputs, 0xFFFF);
        assert_eq!(station.nominal_frequency, NominalFrequency::Hz50);
    }

    #[test]
    fn test_from_json_minimal() {
        let config = ClientConfig::from_json(
            r#"{"IP_ADDR": "pmu.local", "IP_PORT": 4712, "MY_IDCODE": 1, "STREAMSOURCE_IDCODE": 3}"#,
        )
        .unwrap();
        assert_eq!(config.reconnection_delay, Duration::from_secs(1));
        assert!(config.request_config_from_source);
        assert!(config.static_configuration.is_none());
        assert!(config.station_filter.is_empty());
    }

    #[test]
    fn test_from_json_missing_key() {
        let err = ClientConfig::from_json(r#"{"IP_ADDR": "pmu.local", "MY_IDCODE": 1}"#).unwrap_err();
        assert!(matches!(err, C37118Error::InvalidConfig(_)));
    }

    #[test]
    fn test_from_json_wrong_type() {
        let err = ClientConfig::from_json(
            r#"{"IP_ADDR": "pmu.local", "IP_PORT": "4712", "MY_IDCODE": 1, "STREAMSOURCE_IDCODE": 3}"#,
        )
        .unwrap_err();
        assert!(matches!(err, C37118Error::InvalidConfig(_)));
    }

    #[test]
    fn test_static_mode_requires_hard_config() {
        let err = ClientConfig::from_json(
            r#"{"IP_ADDR": "pmu.local", "IP_PORT": 4712, "MY_IDCODE": 1,
                "STREAMSOURCE_IDCODE": 3, "REQUEST_CONFIG_TO_SENDER": false}"#,
        )
        .unwrap_err();
        assert!(matches!(err, C37118Error::InvalidConfig(_)));
    }

    #[test]
    fn test_hard_config_unit_count_mismatch() {
        let json = PMU_CONF.replace(r#""STN_PHUNIT": [0, 0, 0]"#, r#""STN_PHUNIT": [0, 0]"#);
        let err = ClientConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, C37118Error::IncompleteConfiguration(_)));
    }

    #[test]
    fn test_hard_config_empty_channel_name() {
        let json = PMU_CONF.replace(r#""ANALOG""#, r#""""#);
        let err = ClientConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, C37118Error::IncompleteConfiguration(_)));
    }

    #[test]
    fn test_hard_config_bad_format() {
        let json = PMU_CONF.replace(r#""STN_FORMAT": 15"#, r#""STN_FORMAT": 64"#);
        let err = ClientConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, C37118Error::UnsupportedFormat(64)));
    }

    #[test]
    fn test_record_options() {
        let options = ClientConfig::from_json(PMU_CONF).unwrap().record_options();
        assert!(!options.split_stations);
        assert_eq!(options.station_filter, vec![5]);
        assert_eq!(options.asset_name, DEFAULT_ASSET_NAME);
    }
}
