//! Decoded data frame types.
//!
//! A [`DataFrame`] carries no schema of its own; it is only meaningful next to
//! the [`StreamConfiguration`](super::StreamConfiguration) it was decoded with.

use std::f64::consts::PI;

use super::Timestamp;

/// A phasor in polar form.
///
/// Always normalized: `magnitude >= 0` and `angle` in radians within (-π, π].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phasor {
    /// Magnitude in engineering units
    pub magnitude: f64,
    /// Angle in radians
    pub angle: f64,
}

impl Phasor {
    /// Build from rectangular components.
    pub fn from_rectangular(real: f64, imaginary: f64) -> Self {
        Self::from_polar(real.hypot(imaginary), imaginary.atan2(real))
    }

    /// Build from magnitude and angle, normalizing both.
    pub fn from_polar(magnitude: f64, angle: f64) -> Self {
        let (magnitude, angle) = if magnitude < 0.0 {
            (-magnitude, angle + PI)
        } else {
            (magnitude, angle)
        };
        Self {
            magnitude,
            angle: wrap_angle(angle),
        }
    }

    /// Real component.
    #[inline]
    pub fn real(&self) -> f64 {
        self.magnitude * self.angle.cos()
    }

    /// Imaginary component.
    #[inline]
    pub fn imaginary(&self) -> f64 {
        self.magnitude * self.angle.sin()
    }

    /// Angle in degrees.
    #[inline]
    pub fn angle_degrees(&self) -> f64 {
        self.angle.to_degrees()
    }
}

/// Wrap an angle into (-π, π].
fn wrap_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// STAT word of one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StationStatus(pub u16);

impl StationStatus {
    /// Data error code (bits 15-14), 0 = good data.
    #[inline]
    pub const fn data_error(&self) -> u8 {
        (self.0 >> 14) as u8 & 0x03
    }

    /// PMU lost time synchronization (bit 13).
    #[inline]
    pub const fn sync_lost(&self) -> bool {
        self.0 & 0x2000 != 0
    }

    /// PMU trigger detected (bit 11).
    #[inline]
    pub const fn triggered(&self) -> bool {
        self.0 & 0x0800 != 0
    }

    /// Configuration change pending (bit 10).
    #[inline]
    pub const fn config_changed(&self) -> bool {
        self.0 & 0x0400 != 0
    }
}

/// Measurements of one station in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StationMeasurement {
    /// Station IDCODE (from the configuration, for correlation)
    pub id_code: u16,
    /// STAT word
    pub status: StationStatus,
    /// One phasor per configured phasor channel
    pub phasors: Vec<Phasor>,
    /// Frequency in Hz
    pub freq: f64,
    /// Rate of change of frequency in Hz/s
    pub dfreq: f64,
    /// One value per configured analog channel
    pub analogs: Vec<f64>,
    /// One raw word per configured digital status word
    pub digitals: Vec<u16>,
}

/// A decoded data frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    /// Stream IDCODE
    pub id_code: u16,
    /// Frame timestamp
    pub timestamp: Timestamp,
    /// One measurement block per configured station, in configuration order
    pub stations: Vec<StationMeasurement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_rectangular_to_polar() {
        let p = Phasor::from_rectangular(3000.0, 4000.0);
        assert!(close(p.magnitude, 5000.0));
        assert!(close(p.angle, (4.0f64).atan2(3.0)));
        assert!(close(p.real(), 3000.0));
        assert!(close(p.imaginary(), 4000.0));
    }

    #[test]
    fn test_negative_real_axis_is_pi() {
        let p = Phasor::from_rectangular(-1.0, 0.0);
        assert!(close(p.angle, PI));
    }

    #[test]
    fn test_polar_normalization() {
        let p = Phasor::from_polar(-2.0, 0.5);
        assert!(close(p.magnitude, 2.0));
        assert!(close(p.angle, 0.5 + PI - 2.0 * PI));

        let p = Phasor::from_polar(1.0, 2.5 * PI);
        assert!(close(p.angle, 0.5 * PI));

        let p = Phasor::from_polar(1.0, -PI);
        assert!(close(p.angle, PI));
    }

    #[test]
    fn test_angle_degrees() {
        let p = Phasor::from_polar(1.0, -0.5 * PI);
        assert!(close(p.angle_degrees(), -90.0));
        assert!(close(Phasor::from_rectangular(-1.0, 0.0).angle_degrees(), 180.0));
    }

    #[test]
    fn test_status_bits() {
        let stat = StationStatus(0x8000 | 0x2000 | 0x0400);
        assert_eq!(stat.data_error(), 2);
        assert!(stat.sync_lost());
        assert!(stat.config_changed());
        assert!(!stat.triggered());
    }
}
