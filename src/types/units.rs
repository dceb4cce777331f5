//! Channel conversion factors carried by a configuration frame.

use serde::Serialize;

/// Quantity measured by a phasor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhasorKind {
    /// Voltage phasor
    Voltage,
    /// Current phasor
    Current,
}

/// PHUNIT word.
///
/// Top byte selects voltage/current, low 24 bits are the scale in
/// 10^-5 V or A per bit. The scale is ignored for floating-point phasors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasorUnit {
    /// Voltage or current
    pub kind: PhasorKind,
    /// Unsigned 24-bit scale word
    pub scale: u32,
}

impl PhasorUnit {
    /// Create a phasor unit; `scale` is truncated to 24 bits.
    #[inline]
    pub const fn new(kind: PhasorKind, scale: u32) -> Self {
        Self {
            kind,
            scale: scale & 0x00FF_FFFF,
        }
    }

    /// Decode a PHUNIT word.
    #[inline]
    pub const fn from_u32(word: u32) -> Self {
        let kind = if (word >> 24) & 0xFF == 0 {
            PhasorKind::Voltage
        } else {
            PhasorKind::Current
        };
        Self::new(kind, word)
    }

    /// Encode to a PHUNIT word.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        let kind = match self.kind {
            PhasorKind::Voltage => 0,
            PhasorKind::Current => 1,
        };
        (kind << 24) | self.scale
    }

    /// Engineering units per integer count.
    #[inline]
    pub fn factor(&self) -> f64 {
        self.scale as f64 * 1e-5
    }
}

/// Kind of analog quantity (top byte of ANUNIT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalogKind {
    /// Single point-on-wave
    PointOnWave,
    /// RMS of analog input
    Rms,
    /// Peak of analog input
    Peak,
    /// Reserved / user-defined code
    Other(u8),
}

impl AnalogKind {
    /// Parse the kind byte.
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::PointOnWave,
            1 => Self::Rms,
            2 => Self::Peak,
            other => Self::Other(other),
        }
    }

    /// Encode the kind byte.
    #[inline]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::PointOnWave => 0,
            Self::Rms => 1,
            Self::Peak => 2,
            Self::Other(v) => *v,
        }
    }
}

/// ANUNIT word: kind byte plus signed 24-bit user scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogUnit {
    /// Analog kind
    pub kind: AnalogKind,
    /// Signed 24-bit scale
    pub scale: i32,
}

impl AnalogUnit {
    /// Create an analog unit; `scale` must fit in 24 signed bits.
    #[inline]
    pub const fn new(kind: AnalogKind, scale: i32) -> Self {
        Self { kind, scale }
    }

    /// Decode an ANUNIT word, sign-extending the 24-bit scale.
    #[inline]
    pub const fn from_u32(word: u32) -> Self {
        let scale = ((word << 8) as i32) >> 8;
        Self {
            kind: AnalogKind::from_u8((word >> 24) as u8),
            scale,
        }
    }

    /// Encode to an ANUNIT word.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        ((self.kind.as_u8() as u32) << 24) | (self.scale as u32 & 0x00FF_FFFF)
    }

    /// Multiplier applied to integer analog samples. A zero scale is unity.
    #[inline]
    pub fn factor(&self) -> f64 {
        if self.scale == 0 {
            1.0
        } else {
            self.scale as f64
        }
    }
}

/// DIGUNIT word: two 16-bit masks for one digital status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitalUnit {
    /// Normal status of the inputs
    pub normal_status: u16,
    /// Which inputs are valid
    pub valid_inputs: u16,
}

impl DigitalUnit {
    /// Decode a DIGUNIT word.
    #[inline]
    pub const fn from_u32(word: u32) -> Self {
        Self {
            normal_status: (word >> 16) as u16,
            valid_inputs: word as u16,
        }
    }

    /// Encode to a DIGUNIT word.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        ((self.normal_status as u32) << 16) | self.valid_inputs as u32
    }
}

/// FNOM field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NominalFrequency {
    /// 50 Hz (bit 0 set)
    Hz50,
    /// 60 Hz (bit 0 clear)
    #[default]
    Hz60,
}

impl NominalFrequency {
    /// Decode the FNOM word.
    #[inline]
    pub const fn from_u16(word: u16) -> Self {
        if word & 0x0001 != 0 {
            Self::Hz50
        } else {
            Self::Hz60
        }
    }

    /// Encode the FNOM word.
    #[inline]
    pub const fn as_u16(&self) -> u16 {
        match self {
            Self::Hz50 => 1,
            Self::Hz60 => 0,
        }
    }

    /// Nominal frequency in Hz.
    #[inline]
    pub const fn hz(&self) -> f64 {
        match self {
            Self::Hz50 => 50.0,
            Self::Hz60 => 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phasor_unit_word() {
        let unit = PhasorUnit::from_u32(0x0100_0A3C);
        assert_eq!(unit.kind, PhasorKind::Current);
        assert_eq!(unit.scale, 0x0A3C);
        assert_eq!(unit.as_u32(), 0x0100_0A3C);

        let unit = PhasorUnit::new(PhasorKind::Voltage, 100_000);
        assert!((unit.factor() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_analog_unit_sign_extension() {
        let unit = AnalogUnit::from_u32(0x01FF_FFFE);
        assert_eq!(unit.kind, AnalogKind::Rms);
        assert_eq!(unit.scale, -2);
        assert_eq!(unit.as_u32(), 0x01FF_FFFE);
        assert_eq!(unit.factor(), -2.0);

        assert_eq!(AnalogUnit::from_u32(0).factor(), 1.0);
    }

    #[test]
    fn test_digital_unit_masks() {
        let unit = DigitalUnit::from_u32(0x0000_FFFF);
        assert_eq!(unit.normal_status, 0);
        assert_eq!(unit.valid_inputs, 0xFFFF);
        assert_eq!(unit.as_u32(), 0x0000_FFFF);
    }

    #[test]
    fn test_nominal_frequency() {
        assert_eq!(NominalFrequency::from_u16(1), NominalFrequency::Hz50);
        assert_eq!(NominalFrequency::from_u16(0), NominalFrequency::Hz60);
        assert_eq!(NominalFrequency::Hz50.hz(), 50.0);
    }
}
