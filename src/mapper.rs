//! Data frame to output record mapping.
//!
//! [`map_to_records`] is a pure function: the same frame, configuration and
//! options always give the same records, in configuration order.

use serde::Serialize;

use crate::config::DEFAULT_ASSET_NAME;
use crate::types::{DataFrame, StationConfig, StationMeasurement, StreamConfiguration};

/// How data frames are turned into records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOptions {
    /// One record per station (asset = station name) instead of one per frame
    pub split_stations: bool,
    /// Station IDCODEs to keep; empty keeps all
    pub station_filter: Vec<u16>,
    /// Asset name of combined records
    pub asset_name: String,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            split_stations: true,
            station_filter: Vec::new(),
            asset_name: DEFAULT_ASSET_NAME.to_string(),
        }
    }
}

impl RecordOptions {
    /// Whether the station passes the filter.
    #[inline]
    pub fn keeps(&self, id_code: u16) -> bool {
        self.station_filter.is_empty() || self.station_filter.contains(&id_code)
    }
}

/// One record handed to the ingest callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    /// Station name in split mode, configured asset name otherwise
    pub asset: String,
    /// Frame timestamp
    pub timestamp: TimestampRecord,
    /// Stations covered by this record
    pub stations: Vec<StationRecord>,
}

/// Timestamp group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimestampRecord {
    /// Second of century
    pub soc: u32,
    /// Fraction of second, in TIME_BASE units
    pub fracsec: u32,
    /// Resolution of `fracsec`
    pub time_base: u32,
    /// Time quality flags from the FRACSEC high byte
    pub time_quality: u8,
}

impl TimestampRecord {
    /// Seconds since the epoch as a float.
    pub fn seconds(&self) -> f64 {
        if self.time_base == 0 {
            return self.soc as f64;
        }
        self.soc as f64 + self.fracsec as f64 / self.time_base as f64
    }
}

/// Per-station measurement tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRecord {
    /// Station name and IDCODE
    pub identity: IdentityRecord,
    /// Raw STAT word
    pub status: u16,
    /// FREQ and DFREQ
    pub frequency: FrequencyRecord,
    /// Phasors in configuration order
    pub phasors: Vec<PhasorRecord>,
    /// Analogs in configuration order
    pub analogs: Vec<AnalogRecord>,
    /// Absent when the station has no digital words
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digitals: Option<Vec<DigitalRecord>>,
}

/// Station identity group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    /// Station name (STN)
    pub name: String,
    /// Station IDCODE
    pub id_code: u16,
}

/// Frequency group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyRecord {
    /// Hz
    pub freq: f64,
    /// Hz/s
    pub dfreq: f64,
}

/// One phasor in polar form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhasorRecord {
    /// Channel name (CHNAM)
    pub name: String,
    /// Magnitude in engineering units
    pub magnitude: f64,
    /// Radians
    pub angle: f64,
}

/// One analog value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalogRecord {
    /// Channel name (CHNAM)
    pub name: String,
    /// Scaled value
    pub value: f64,
}

/// One digital status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigitalRecord {
    /// Raw 16-bit status word
    pub value: u16,
    /// DIGUNIT normal status mask
    pub normal_status: u16,
    /// DIGUNIT valid inputs mask
    pub valid_inputs: u16,
}

/// Convert a decoded data frame into output records.
///
/// Stations filtered out by `options` are skipped; in combined mode a frame
/// with no remaining station yields no record.
pub fn map_to_records(
    frame: &DataFrame,
    config: &StreamConfiguration,
    options: &RecordOptions,
) -> Vec<OutputRecord> {
    let timestamp = TimestampRecord {
        soc: frame.timestamp.soc,
        fracsec: frame.timestamp.fracsec,
        time_base: config.identity.time_base,
        time_quality: frame.timestamp.time_quality,
    };

    let stations = config
        .stations
        .iter()
        .zip(&frame.stations)
        .filter(|(station, _)| options.keeps(station.id_code))
        .map(|(station, measurement)| station_record(station, measurement));

    if options.split_stations {
        stations
            .map(|record| OutputRecord {
                asset: record.identity.name.clone(),
                timestamp,
                stations: vec![record],
            })
            .collect()
    } else {
        let stations: Vec<_> = stations.collect();
        if stations.is_empty() {
            return Vec::new();
        }
        vec![OutputRecord {
            asset: options.asset_name.clone(),
            timestamp,
            stations,
        }]
    }
}

fn station_record(station: &StationConfig, m: &StationMeasurement) -> StationRecord {
    let phasors = station
        .phasors
        .iter()
        .zip(&m.phasors)
        .map(|(ch, ph)| PhasorRecord {
            name: ch.name.clone(),
            magnitude: ph.magnitude,
            angle: ph.angle,
        })
        .collect();
    let analogs = station
        .analogs
        .iter()
        .zip(&m.analogs)
        .map(|(ch, value)| AnalogRecord {
            name: ch.name.clone(),
            value: *value,
        })
        .collect();
    let digitals = (!station.digitals.is_empty()).then(|| {
        station
            .digitals
            .iter()
            .zip(&m.digitals)
            .map(|(word, value)| DigitalRecord {
                value: *value,
                normal_status: word.unit.normal_status,
                valid_inputs: word.unit.valid_inputs,
            })
            .collect()
    });

    StationRecord {
        identity: IdentityRecord {
            name: station.name.clone(),
            id_code: station.id_code,
        },
        status: m.status.0,
        frequency: FrequencyRecord {
            freq: m.freq,
            dfreq: m.dfreq,
        },
        phasors,
        analogs,
        digitals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{fixed_station, stream};
    use crate::types::{Phasor, StationStatus, Timestamp};

    fn measurement(id_code: u16) -> StationMeasurement {
        StationMeasurement {
            id_code,
            status: StationStatus(0x2000),
            phasors: vec![
                Phasor::from_rectangular(3000.0, 4000.0),
                Phasor::from_polar(230.0, 0.5),
                Phasor::from_polar(230.0, -0.5),
            ],
            freq: 49.98,
            dfreq: 0.01,
            analogs: vec![12.0],
            digitals: vec![0x0003],
        }
    }

    fn frame(ids: &[u16]) -> (DataFrame, StreamConfiguration) {
        let cfg = stream(ids.iter().map(|&id| fixed_station(id)).collect());
        let frame = DataFrame {
            id_code: cfg.identity.id_code,
            timestamp: Timestamp::new(1_392_733_934, 500_000),
            stations: ids.iter().map(|&id| measurement(id)).collect(),
        };
        (frame, cfg)
    }

    #[test]
    fn test_split_records() {
        let (frame, cfg) = frame(&[5, 6]);
        let records = map_to_records(&frame, &cfg, &RecordOptions::default());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].asset, "STATION 5");
        assert_eq!(records[1].asset, "STATION 6");
        assert_eq!(records[0].timestamp.time_base, 1_000_000);
        assert!((records[0].timestamp.seconds() - 1_392_733_934.5).abs() < 1e-6);

        let station = &records[0].stations[0];
        assert_eq!(station.identity.id_code, 5);
        assert_eq!(station.status, 0x2000);
        assert_eq!(station.phasors[0].name, "VA");
        assert!((station.phasors[0].magnitude - 5000.0).abs() < 1e-9);
        assert_eq!(station.analogs[0].name, "ANALOG");
        assert_eq!(station.analogs[0].value, 12.0);
        let digitals = station.digitals.as_ref().unwrap();
        assert_eq!(digitals[0].value, 0x0003);
        assert_eq!(digitals[0].valid_inputs, 0xFFFF);
    }

    #[test]
    fn test_combined_record() {
        let (frame, cfg) = frame(&[5, 6]);
        let options = RecordOptions {
            split_stations: false,
            ..RecordOptions::default()
        };
        let records = map_to_records(&frame, &cfg, &options);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].asset, "c37118");
        let ids: Vec<_> = records[0].stations.iter().map(|s| s.identity.id_code).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[test]
    fn test_station_filter() {
        let (frame, cfg) = frame(&[5, 6, 7]);
        let options = RecordOptions {
            station_filter: vec![6],
            ..RecordOptions::default()
        };
        let records = map_to_records(&frame, &cfg, &options);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stations[0].identity.id_code, 6);

        let options = RecordOptions {
            split_stations: false,
            station_filter: vec![99],
            ..RecordOptions::default()
        };
        assert!(map_to_records(&frame, &cfg, &options).is_empty());
    }

    #[test]
    fn test_no_digital_group_without_digital_words() {
        let (mut frame, mut cfg) = frame(&[5]);
        cfg.stations[0].digitals.clear();
        frame.stations[0].digitals.clear();
        let records = map_to_records(&frame, &cfg, &RecordOptions::default());
        assert!(records[0].stations[0].digitals.is_none());

        let json = serde_json::to_value(&records[0]).unwrap();
        assert!(json["stations"][0].get("digitals").is_none());
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let (frame, cfg) = frame(&[5, 6]);
        let options = RecordOptions::default();
        let first = map_to_records(&frame, &cfg, &options);
        let second = map_to_records(&frame, &cfg, &options);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_record_json_shape() {
        let (frame, cfg) = frame(&[5]);
        let records = map_to_records(&frame, &cfg, &RecordOptions::default());
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["asset"], "STATION 5");
        assert_eq!(json["timestamp"]["soc"], 1_392_733_934u32);
        assert_eq!(json["stations"][0]["identity"]["name"], "STATION 5");
        assert_eq!(json["stations"][0]["frequency"]["freq"], 49.98);
        assert_eq!(json["stations"][0]["phasors"][2]["name"], "VC");
    }
}
