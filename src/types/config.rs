//! Stream and station configuration (the schema a data frame is decoded against).

use std::collections::HashSet;

use super::{AnalogUnit, DigitalUnit, FormatFlags, NominalFrequency, PhasorUnit};
use crate::error::{C37118Error, Result};

/// Maximum byte length of STN and CHNAM fields.
pub const NAME_LENGTH: usize = 16;

/// Digital inputs packed in one status word.
pub const DIGITALS_PER_WORD: usize = 16;

/// Stream-level parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamIdentity {
    /// IDCODE of the data stream
    pub id_code: u16,
    /// FRACSEC resolution (counts per second), 24 bits
    pub time_base: u32,
    /// Frames per second; negative means seconds per frame
    pub data_rate: i16,
}

impl StreamIdentity {
    /// Create a stream identity.
    pub const fn new(id_code: u16, time_base: u32, data_rate: i16) -> Self {
        Self {
            id_code,
            time_base,
            data_rate,
        }
    }

    /// Data rate as frames per second.
    pub fn frames_per_second(&self) -> f64 {
        match self.data_rate {
            0 => 0.0,
            r if r > 0 => r as f64,
            r => 1.0 / (-(r as f64)),
        }
    }
}

/// One phasor channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasorChannel {
    /// Channel name (CHNAM)
    pub name: String,
    /// Conversion factor (PHUNIT)
    pub unit: PhasorUnit,
}

/// One analog channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalogChannel {
    /// Channel name (CHNAM)
    pub name: String,
    /// Conversion factor (ANUNIT)
    pub unit: AnalogUnit,
}

/// One 16-bit digital status word and the names of its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitalWord {
    /// Input names, least significant bit first; exactly 16 when valid
    pub names: Vec<String>,
    /// Masks (DIGUNIT)
    pub unit: DigitalUnit,
}

/// Layout of one station (PMU) inside the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    /// Station name (STN)
    pub name: String,
    /// Station IDCODE
    pub id_code: u16,
    /// Data format flags
    pub format: FormatFlags,
    /// Phasor channels in frame order
    pub phasors: Vec<PhasorChannel>,
    /// Analog channels in frame order
    pub analogs: Vec<AnalogChannel>,
    /// Digital status words in frame order
    pub digitals: Vec<DigitalWord>,
    /// Nominal line frequency
    pub nominal_frequency: NominalFrequency,
    /// Configuration change count (CFGCNT)
    pub config_change_count: u16,
}

impl StationConfig {
    /// Number of phasor channels (PHNMR).
    #[inline]
    pub fn phasor_count(&self) -> usize {
        self.phasors.len()
    }

    /// Number of analog channels (ANNMR).
    #[inline]
    pub fn analog_count(&self) -> usize {
        self.analogs.len()
    }

    /// Number of digital status words (DGNMR).
    #[inline]
    pub fn digital_word_count(&self) -> usize {
        self.digitals.len()
    }

    /// Bytes this station occupies in a data frame, STAT included.
    pub fn data_block_size(&self) -> usize {
        2 + self.format.phasor_size() * self.phasor_count()
            + 2 * self.format.frequency_size()
            + self.format.analog_size() * self.analog_count()
            + 2 * self.digital_word_count()
    }

    /// Bytes this station occupies in a CFG-2 frame.
    pub fn config_block_size(&self) -> usize {
        let names = self.phasor_count() + self.analog_count() + DIGITALS_PER_WORD * self.digital_word_count();
        let units = self.phasor_count() + self.analog_count() + self.digital_word_count();
        NAME_LENGTH + 2 + 2 + 6 + NAME_LENGTH * names + 4 * units + 2 + 2
    }

    /// Check names and digital word layout.
    pub fn validate(&self) -> Result<()> {
        check_name("station name", &self.name)?;
        for (i, ph) in self.phasors.iter().enumerate() {
            check_name(&format!("{}: phasor {i}", self.name), &ph.name)?;
        }
        for (i, an) in self.analogs.iter().enumerate() {
            check_name(&format!("{}: analog {i}", self.name), &an.name)?;
        }
        for (w, word) in self.digitals.iter().enumerate() {
            if word.names.len() != DIGITALS_PER_WORD {
                return Err(C37118Error::incomplete(format!(
                    "{}: digital word {w} has {} names, expected {DIGITALS_PER_WORD}",
                    self.name,
                    word.names.len()
                )));
            }
            for (i, name) in word.names.iter().enumerate() {
                check_name(&format!("{}: digital {w}.{i}", self.name), name)?;
            }
        }
        Ok(())
    }
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(C37118Error::incomplete(format!("{what} is empty")));
    }
    if name.len() > NAME_LENGTH {
        return Err(C37118Error::incomplete(format!(
            "{what} '{name}' is longer than {NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Stream identity plus the ordered list of stations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfiguration {
    /// Stream-level parameters
    pub identity: StreamIdentity,
    /// Stations in frame order
    pub stations: Vec<StationConfig>,
}

impl StreamConfiguration {
    /// Create a configuration.
    pub fn new(identity: StreamIdentity, stations: Vec<StationConfig>) -> Self {
        Self { identity, stations }
    }

    /// Look up a station by its IDCODE.
    pub fn lookup_station(&self, id_code: u16) -> Result<&StationConfig> {
        self.stations
            .iter()
            .find(|s| s.id_code == id_code)
            .ok_or(C37118Error::StationNotFound(id_code))
    }

    /// Expected FRAMESIZE of a data frame under this configuration.
    pub fn data_frame_size(&self) -> usize {
        super::MIN_FRAME_LENGTH
            + self
                .stations
                .iter()
                .map(StationConfig::data_block_size)
                .sum::<usize>()
    }

    /// Validate the whole configuration.
    ///
    /// Fails with [`C37118Error::IncompleteConfiguration`] when TIME_BASE is
    /// zero, there are no stations, station IDCODEs repeat, or any station
    /// fails [`StationConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        if self.identity.time_base == 0 {
            return Err(C37118Error::incomplete("TIME_BASE is zero"));
        }
        if self.identity.time_base > 0x00FF_FFFF {
            return Err(C37118Error::incomplete("TIME_BASE exceeds 24 bits"));
        }
        if self.stations.is_empty() {
            return Err(C37118Error::incomplete("no stations"));
        }
        let mut seen = HashSet::new();
        for station in &self.stations {
            if !seen.insert(station.id_code) {
                return Err(C37118Error::incomplete(format!(
                    "duplicate station IDCODE {}",
                    station.id_code
                )));
            }
            station.validate()?;
        }
        Ok(())
    }

    /// Whether [`validate`](Self::validate) passes.
    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::types::{AnalogKind, NumericFormat, PhasorKind, PhasorNotation};

    /// One station, three fixed rectangular phasors, one analog, one digital word.
    pub fn fixed_station(id_code: u16) -> StationConfig {
        StationConfig {
            name: format!("STATION {id_code}"),
            id_code,
            format: FormatFlags::new(
                PhasorNotation::Rectangular,
                NumericFormat::Fixed,
                NumericFormat::Fixed,
                NumericFormat::Fixed,
            ),
            phasors: ["VA", "VB", "VC"]
                .iter()
                .map(|n| PhasorChannel {
                    name: n.to_string(),
                    unit: PhasorUnit::new(PhasorKind::Voltage, 100_000),
                })
                .collect(),
            analogs: vec![AnalogChannel {
                name: "ANALOG".into(),
                unit: AnalogUnit::new(AnalogKind::Rms, 1),
            }],
            digitals: vec![DigitalWord {
                names: (1..=16).map(|i| format!("DG{i}")).collect(),
                unit: DigitalUnit::from_u32(0x0000_FFFF),
            }],
            nominal_frequency: NominalFrequency::Hz50,
            config_change_count: 1,
        }
    }

    /// Same layout as [`fixed_station`] but every field floating point, polar.
    pub fn float_station(id_code: u16) -> StationConfig {
        StationConfig {
            format: FormatFlags::from_bits(0x000F).unwrap(),
            ..fixed_station(id_code)
        }
    }

    pub fn stream(stations: Vec<StationConfig>) -> StreamConfiguration {
        StreamConfiguration::new(StreamIdentity::new(2, 1_000_000, 30), stations)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_counts_and_sizes() {
        let station = fixed_station(5);
        assert_eq!(station.phasor_count(), 3);
        assert_eq!(station.analog_count(), 1);
        assert_eq!(station.digital_word_count(), 1);
        // STAT + 3*4 + 2*2 + 1*2 + 1*2
        assert_eq!(station.data_block_size(), 2 + 12 + 4 + 2 + 2);

        let cfg = stream(vec![fixed_station(5), float_station(7)]);
        // float: STAT + 3*8 + 2*4 + 4 + 2
        assert_eq!(cfg.data_frame_size(), 16 + 22 + 40);
    }

    #[test]
    fn test_lookup_station() {
        let cfg = stream(vec![fixed_station(5), fixed_station(7)]);
        assert_eq!(cfg.lookup_station(7).unwrap().id_code, 7);
        assert!(matches!(
            cfg.lookup_station(9),
            Err(C37118Error::StationNotFound(9))
        ));
    }

    #[test]
    fn test_validate_complete() {
        assert!(stream(vec![fixed_station(5)]).is_complete());
    }

    #[test]
    fn test_validate_zero_time_base() {
        let mut cfg = stream(vec![fixed_station(5)]);
        cfg.identity.time_base = 0;
        assert!(matches!(
            cfg.validate(),
            Err(C37118Error::IncompleteConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_empty_name() {
        let mut cfg = stream(vec![fixed_station(5)]);
        cfg.stations[0].analogs[0].name = "   ".into();
        assert!(!cfg.is_complete());
    }

    #[test]
    fn test_validate_short_digital_word() {
        let mut cfg = stream(vec![fixed_station(5)]);
        cfg.stations[0].digitals[0].names.truncate(4);
        assert!(!cfg.is_complete());
    }

    #[test]
    fn test_validate_duplicate_station() {
        let cfg = stream(vec![fixed_station(5), fixed_station(5)]);
        assert!(!cfg.is_complete());
    }

    #[test]
    fn test_frames_per_second() {
        assert_eq!(StreamIdentity::new(1, 1, 30).frames_per_second(), 30.0);
        assert_eq!(StreamIdentity::new(1, 1, -5).frames_per_second(), 0.2);
    }
}
