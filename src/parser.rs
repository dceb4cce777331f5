//! C37.118 frame decoders.
//!
//! All functions here are pure: they depend only on the bytes (and, for data
//! frames, the configuration) passed in. Each expects exactly one complete
//! frame, FRAMESIZE and checksum included.

use bytes::Buf;

use crate::error::{C37118Error, Result};
use crate::types::{
    verify_frame, AnalogChannel, AnalogUnit, CommandCode, DataFrame, DigitalUnit, DigitalWord,
    FormatFlags, FrameHeader, FrameType, NominalFrequency, NumericFormat, Phasor, PhasorChannel,
    PhasorNotation, PhasorUnit, StationConfig, StationMeasurement, StationStatus,
    StreamConfiguration, StreamIdentity, CHECKSUM_LENGTH, DIGITALS_PER_WORD, NAME_LENGTH,
    PREFIX_LENGTH,
};

/// Decode a header frame into its text.
pub fn decode_header(bytes: &[u8]) -> Result<String> {
    let header = expect_frame(bytes, FrameType::Header)?;
    let text = String::from_utf8_lossy(payload(bytes));
    let text = text.trim_end_matches(['\0', ' ', '\r', '\n']).to_string();
    tracing::trace!(id_code = header.id_code, len = text.len(), "decoded header frame");
    Ok(text)
}

/// Decode a command frame into the sender IDCODE and the command.
pub fn decode_command(bytes: &[u8]) -> Result<(u16, CommandCode)> {
    let header = expect_frame(bytes, FrameType::Command)?;
    let mut body = payload(bytes);
    need(body, 2, "CMD")?;
    let command = CommandCode::from_code(body.get_u16())?;
    Ok((header.id_code, command))
}

/// Decode a CFG-2 frame.
///
/// Fails with [`C37118Error::MalformedFrame`] when the frame is truncated, has
/// trailing bytes, or declares more stations or channels than it carries, and
/// with [`C37118Error::UnsupportedFormat`] on unknown FORMAT bits.
pub fn decode_configuration(bytes: &[u8]) -> Result<StreamConfiguration> {
    let header = expect_frame(bytes, FrameType::Config2)?;
    let mut body = payload(bytes);

    need(body, 6, "TIME_BASE/NUM_PMU")?;
    let time_base = body.get_u32() & 0x00FF_FFFF;
    let num_pmu = body.get_u16() as usize;

    let mut stations = Vec::with_capacity(num_pmu);
    for index in 0..num_pmu {
        let station = parse_station(&mut body).map_err(|e| match e {
            C37118Error::MalformedFrame(msg) => C37118Error::malformed(format!(
                "station {} of {num_pmu}: {msg}",
                index + 1
            )),
            other => other,
        })?;
        stations.push(station);
    }

    need(body, 2, "DATA_RATE")?;
    let data_rate = body.get_i16();
    if body.has_remaining() {
        return Err(C37118Error::malformed(format!(
            "{} unexpected bytes after DATA_RATE",
            body.remaining()
        )));
    }

    Ok(StreamConfiguration::new(
        StreamIdentity::new(header.id_code, time_base, data_rate),
        stations,
    ))
}

fn parse_station(body: &mut &[u8]) -> Result<StationConfig> {
    need(body, NAME_LENGTH + 10, "station header")?;
    let name = read_name(body);
    let id_code = body.get_u16();
    let format = FormatFlags::from_bits(body.get_u16())?;
    let phnmr = body.get_u16() as usize;
    let annmr = body.get_u16() as usize;
    let dgnmr = body.get_u16() as usize;

    let name_count = phnmr + annmr + DIGITALS_PER_WORD * dgnmr;
    need(body, NAME_LENGTH * name_count, "CHNAM")?;
    let phasor_names: Vec<String> = (0..phnmr).map(|_| read_name(body)).collect();
    let analog_names: Vec<String> = (0..annmr).map(|_| read_name(body)).collect();
    let digital_names: Vec<Vec<String>> = (0..dgnmr)
        .map(|_| (0..DIGITALS_PER_WORD).map(|_| read_name(body)).collect())
        .collect();

    need(body, 4 * (phnmr + annmr + dgnmr) + 4, "units/FNOM/CFGCNT")?;
    let phasors = phasor_names
        .into_iter()
        .map(|name| PhasorChannel {
            name,
            unit: PhasorUnit::from_u32(body.get_u32()),
        })
        .collect();
    let analogs = analog_names
        .into_iter()
        .map(|name| AnalogChannel {
            name,
            unit: AnalogUnit::from_u32(body.get_u32()),
        })
        .collect();
    let digitals = digital_names
        .into_iter()
        .map(|names| DigitalWord {
            names,
            unit: DigitalUnit::from_u32(body.get_u32()),
        })
        .collect();
    let nominal_frequency = NominalFrequency::from_u16(body.get_u16());
    let config_change_count = body.get_u16();

    Ok(StationConfig {
        name,
        id_code,
        format,
        phasors,
        analogs,
        digitals,
        nominal_frequency,
        config_change_count,
    })
}

/// Decode a data frame against `config`.
///
/// Fails with [`C37118Error::SchemaMismatch`] when the frame size or stream
/// IDCODE disagree with `config`, and with [`C37118Error::MalformedFrame`] on
/// sync, length or checksum errors.
pub fn decode_data(bytes: &[u8], config: &StreamConfiguration) -> Result<DataFrame> {
    let header = expect_frame(bytes, FrameType::Data)?;

    let expected = config.data_frame_size();
    if bytes.len() != expected {
        return Err(C37118Error::schema_mismatch(format!(
            "data frame is {} bytes, configuration expects {expected}",
            bytes.len()
        )));
    }
    if header.id_code != config.identity.id_code {
        return Err(C37118Error::schema_mismatch(format!(
            "data frame IDCODE {} does not match stream IDCODE {}",
            header.id_code, config.identity.id_code
        )));
    }

    let mut body = payload(bytes);
    let stations = config
        .stations
        .iter()
        .map(|station| parse_measurement(&mut body, station))
        .collect::<Result<Vec<_>>>()?;

    Ok(DataFrame {
        id_code: header.id_code,
        timestamp: header.timestamp,
        stations,
    })
}

fn parse_measurement(body: &mut &[u8], station: &StationConfig) -> Result<StationMeasurement> {
    // Size was checked against the whole configuration; this guards the slice.
    need(body, station.data_block_size(), "station data block")?;
    let format = station.format;
    let status = StationStatus(body.get_u16());

    let phasors = station
        .phasors
        .iter()
        .map(|ch| read_phasor(body, format, &ch.unit))
        .collect();

    let (freq, dfreq) = match format.frequency_format() {
        NumericFormat::Fixed => {
            let deviation_mhz = body.get_i16() as f64;
            let rocof = body.get_i16() as f64;
            (
                station.nominal_frequency.hz() + deviation_mhz / 1000.0,
                rocof / 100.0,
            )
        }
        NumericFormat::Float => (body.get_f32() as f64, body.get_f32() as f64),
    };

    let analogs = station
        .analogs
        .iter()
        .map(|ch| match format.analog_format() {
            NumericFormat::Fixed => body.get_i16() as f64 * ch.unit.factor(),
            NumericFormat::Float => body.get_f32() as f64,
        })
        .collect();

    let digitals = station.digitals.iter().map(|_| body.get_u16()).collect();

    Ok(StationMeasurement {
        id_code: station.id_code,
        status,
        phasors,
        freq,
        dfreq,
        analogs,
        digitals,
    })
}

fn read_phasor(body: &mut &[u8], format: FormatFlags, unit: &PhasorUnit) -> Phasor {
    match (format.phasor_format(), format.phasor_notation()) {
        (NumericFormat::Fixed, PhasorNotation::Rectangular) => {
            let factor = unit.factor();
            let real = body.get_i16() as f64 * factor;
            let imaginary = body.get_i16() as f64 * factor;
            Phasor::from_rectangular(real, imaginary)
        }
        (NumericFormat::Fixed, PhasorNotation::Polar) => {
            let magnitude = body.get_u16() as f64 * unit.factor();
            // 16-bit angle in radians x 10^4
            let angle = body.get_i16() as f64 / 10_000.0;
            Phasor::from_polar(magnitude, angle)
        }
        (NumericFormat::Float, PhasorNotation::Rectangular) => {
            let real = body.get_f32() as f64;
            let imaginary = body.get_f32() as f64;
            Phasor::from_rectangular(real, imaginary)
        }
        (NumericFormat::Float, PhasorNotation::Polar) => {
            let magnitude = body.get_f32() as f64;
            let angle = body.get_f32() as f64;
            Phasor::from_polar(magnitude, angle)
        }
    }
}

/// Verify framing and checksum, then check the frame type.
fn expect_frame(bytes: &[u8], expected: FrameType) -> Result<FrameHeader> {
    let header = verify_frame(bytes)?;
    if header.frame_type != expected {
        return Err(C37118Error::malformed(format!(
            "expected {expected} frame, got {}",
            header.frame_type
        )));
    }
    Ok(header)
}

/// Bytes between the prefix and the checksum. Caller has verified the frame.
#[inline]
fn payload(bytes: &[u8]) -> &[u8] {
    &bytes[PREFIX_LENGTH..bytes.len() - CHECKSUM_LENGTH]
}

#[inline]
fn need(body: &[u8], len: usize, what: &str) -> Result<()> {
    if body.len() < len {
        return Err(C37118Error::malformed(format!(
            "truncated {what}: need {len} bytes, {} left",
            body.len()
        )));
    }
    Ok(())
}

/// Read a 16-byte space/NUL padded name.
fn read_name(body: &mut &[u8]) -> String {
    let raw = &body[..NAME_LENGTH];
    let name = String::from_utf8_lossy(raw)
        .trim_end_matches(['\0', ' '])
        .trim_start()
        .to_string();
    body.advance(NAME_LENGTH);
    name
}
