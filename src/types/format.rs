//! Station FORMAT word.
//!
//! ```text
//! bit 3: FREQ/DFREQ   0 = 16-bit integer, 1 = float
//! bit 2: analogs      0 = 16-bit integer, 1 = float
//! bit 1: phasors      0 = 16-bit integer, 1 = float
//! bit 0: phasors      0 = rectangular,    1 = polar
//! bits 15-4: unused, must be zero
//! ```

use crate::error::{C37118Error, Result};

const POLAR: u16 = 0x0001;
const PHASOR_FLOAT: u16 = 0x0002;
const ANALOG_FLOAT: u16 = 0x0004;
const FREQ_FLOAT: u16 = 0x0008;
const KNOWN_BITS: u16 = POLAR | PHASOR_FLOAT | ANALOG_FLOAT | FREQ_FLOAT;

/// Numeric encoding of a data frame field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFormat {
    /// 16-bit integer, scaled by the channel unit
    Fixed,
    /// IEEE 754 single precision
    Float,
}

/// Phasor representation on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhasorNotation {
    /// Real and imaginary parts
    Rectangular,
    /// Magnitude and angle
    Polar,
}

/// Validated FORMAT flags of one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags(u16);

impl FormatFlags {
    /// Validate a raw FORMAT word.
    pub fn from_bits(bits: u16) -> Result<Self> {
        if bits & !KNOWN_BITS != 0 {
            return Err(C37118Error::UnsupportedFormat(bits));
        }
        Ok(Self(bits))
    }

    /// Build flags from their parts.
    pub const fn new(
        notation: PhasorNotation,
        phasors: NumericFormat,
        analogs: NumericFormat,
        frequency: NumericFormat,
    ) -> Self {
        let mut bits = 0;
        if matches!(notation, PhasorNotation::Polar) {
            bits |= POLAR;
        }
        if matches!(phasors, NumericFormat::Float) {
            bits |= PHASOR_FLOAT;
        }
        if matches!(analogs, NumericFormat::Float) {
            bits |= ANALOG_FLOAT;
        }
        if matches!(frequency, NumericFormat::Float) {
            bits |= FREQ_FLOAT;
        }
        Self(bits)
    }

    /// Raw FORMAT word.
    #[inline]
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Phasor representation.
    #[inline]
    pub const fn phasor_notation(&self) -> PhasorNotation {
        if self.0 & POLAR != 0 {
            PhasorNotation::Polar
        } else {
            PhasorNotation::Rectangular
        }
    }

    /// Phasor numeric encoding.
    #[inline]
    pub const fn phasor_format(&self) -> NumericFormat {
        Self::numeric(self.0 & PHASOR_FLOAT)
    }

    /// Analog numeric encoding.
    #[inline]
    pub const fn analog_format(&self) -> NumericFormat {
        Self::numeric(self.0 & ANALOG_FLOAT)
    }

    /// FREQ/DFREQ numeric encoding.
    #[inline]
    pub const fn frequency_format(&self) -> NumericFormat {
        Self::numeric(self.0 & FREQ_FLOAT)
    }

    /// Bytes per phasor in a data frame.
    #[inline]
    pub const fn phasor_size(&self) -> usize {
        match self.phasor_format() {
            NumericFormat::Fixed => 4,
            NumericFormat::Float => 8,
        }
    }

    /// Bytes per analog value in a data frame.
    #[inline]
    pub const fn analog_size(&self) -> usize {
        match self.analog_format() {
            NumericFormat::Fixed => 2,
            NumericFormat::Float => 4,
        }
    }

    /// Bytes per FREQ (and per DFREQ) in a data frame.
    #[inline]
    pub const fn frequency_size(&self) -> usize {
        match self.frequency_format() {
            NumericFormat::Fixed => 2,
            NumericFormat::Float => 4,
        }
    }

    #[inline]
    const fn numeric(bit: u16) -> NumericFormat {
        if bit != 0 {
            NumericFormat::Float
        } else {
            NumericFormat::Fixed
        }
    }
}

impl std::fmt::Display for FormatFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_float_polar() {
        let flags = FormatFlags::from_bits(0x000F).unwrap();
        assert_eq!(flags.phasor_notation(), PhasorNotation::Polar);
        assert_eq!(flags.phasor_format(), NumericFormat::Float);
        assert_eq!(flags.analog_format(), NumericFormat::Float);
        assert_eq!(flags.frequency_format(), NumericFormat::Float);
        assert_eq!(flags.phasor_size(), 8);
        assert_eq!(flags.analog_size(), 4);
        assert_eq!(flags.frequency_size(), 4);
    }

    #[test]
    fn test_all_fixed_rectangular() {
        let flags = FormatFlags::from_bits(0).unwrap();
        assert_eq!(flags.phasor_notation(), PhasorNotation::Rectangular);
        assert_eq!(flags.phasor_size(), 4);
        assert_eq!(flags.analog_size(), 2);
        assert_eq!(flags.frequency_size(), 2);
    }

    #[test]
    fn test_unknown_bits_rejected() {
        assert!(matches!(
            FormatFlags::from_bits(0x0010),
            Err(C37118Error::UnsupportedFormat(0x0010))
        ));
    }

    #[test]
    fn test_new_matches_bits() {
        let flags = FormatFlags::new(
            PhasorNotation::Polar,
            NumericFormat::Fixed,
            NumericFormat::Float,
            NumericFormat::Fixed,
        );
        assert_eq!(flags.bits(), 0x0005);
    }
}
