//! C37.118 codec for tokio.
//!
//! [`C37118Codec`] splits a byte stream into whole frames using SYNC and
//! FRAMESIZE and writes command frames. Payload decoding lives in
//! [`crate::parser`]; the `encode_*` functions here build complete frames
//! (checksum included) and are what a PMU simulator or a test needs.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{C37118Error, Result};
use crate::types::{
    crc_ccitt, CommandCode, DataFrame, FrameHeader, FrameType, NumericFormat, Phasor,
    PhasorNotation, StationConfig, StationMeasurement, StreamConfiguration, Timestamp,
    CHECKSUM_LENGTH, COMMAND_FRAME_LENGTH, MIN_FRAME_LENGTH, NAME_LENGTH, PREFIX_LENGTH,
    SYNC_BYTE,
};

/// Largest frame FRAMESIZE can describe.
pub const MAX_FRAME_LENGTH: usize = u16::MAX as usize;

/// One complete frame as cut from the stream.
///
/// Only the prefix has been parsed; the checksum is verified by the
/// [`crate::parser`] function that decodes the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Parsed prefix
    pub header: FrameHeader,
    /// Whole frame, SYNC through CHK
    pub bytes: Bytes,
}

impl RawFrame {
    /// Frame type from SYNC.
    #[inline]
    pub fn frame_type(&self) -> FrameType {
        self.header.frame_type
    }
}

impl std::fmt::Display for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} IDCODE={} SIZE={} SOC={}",
            self.header.frame_type,
            self.header.id_code,
            self.header.frame_size,
            self.header.timestamp.soc
        )
    }
}

/// Outgoing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Command code
    pub code: CommandCode,
    /// IDCODE of the receiving stream
    pub id_code: u16,
    /// Timestamp written into the frame
    pub timestamp: Timestamp,
}

impl Command {
    /// Create a command stamped with the current time.
    pub fn new(code: CommandCode, id_code: u16) -> Self {
        Self {
            code,
            id_code,
            timestamp: Timestamp::now(1_000_000),
        }
    }
}

/// IEEE C37.118 codec.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_util::codec::Framed;
/// use voltage_c37118::codec::{C37118Codec, Command};
///
/// let stream = TcpStream::connect("192.168.1.50:4712").await?;
/// let mut framed = Framed::new(stream, C37118Codec::new());
///
/// framed.send(Command::new(CommandCode::SendConfig2, 7)).await?;
/// while let Some(frame) = framed.next().await {
///     println!("Received: {}", frame?);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct C37118Codec {
    state: DecodeState,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::enum_variant_names)]
enum DecodeState {
    #[default]
    WaitingForSync,
    WaitingForSize,
    WaitingForData {
        length: usize,
    },
}

impl C37118Codec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Second SYNC byte: bit 7 clear, known type bits, non-zero version.
#[inline]
fn plausible_sync(second: u8) -> bool {
    second & 0x80 == 0 && (second >> 4) & 0x07 <= 0b101 && second & 0x0F != 0
}

impl Decoder for C37118Codec {
    type Item = RawFrame;
    type Error = C37118Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::WaitingForSync => {
                    let skip = src.iter().position(|&b| b == SYNC_BYTE).unwrap_or(src.len());
                    if skip > 0 {
                        tracing::trace!(skipped = skip, "discarding bytes before SYNC");
                        src.advance(skip);
                    }
                    if src.is_empty() {
                        return Ok(None);
                    }
                    self.state = DecodeState::WaitingForSize;
                }

                DecodeState::WaitingForSize => {
                    // SYNC + FRAMESIZE
                    if src.len() < 4 {
                        return Ok(None);
                    }
                    let length = u16::from_be_bytes([src[2], src[3]]) as usize;
                    if !plausible_sync(src[1]) || length < MIN_FRAME_LENGTH {
                        src.advance(1);
                        self.state = DecodeState::WaitingForSync;
                        continue;
                    }
                    self.state = DecodeState::WaitingForData { length };
                }

                DecodeState::WaitingForData { length } => {
                    if src.len() < length {
                        src.reserve(length - src.len());
                        return Ok(None);
                    }
                    let bytes = src.split_to(length).freeze();
                    self.state = DecodeState::WaitingForSync;

                    match FrameHeader::parse(&bytes) {
                        Ok(header) => return Ok(Some(RawFrame { header, bytes })),
                        Err(e) => {
                            tracing::debug!(error = %e, "dropping unparseable frame");
                            continue;
                        }
                    }
                }
            }
        }
    }
}

impl Encoder<Command> for C37118Codec {
    type Error = C37118Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        dst.reserve(COMMAND_FRAME_LENGTH);
        dst.extend_from_slice(&encode_command(item.code, item.id_code, item.timestamp));
        Ok(())
    }
}

/// Prefix, payload and checksum.
fn finish(frame_type: FrameType, id_code: u16, timestamp: Timestamp, payload: &[u8]) -> Result<Bytes> {
    let size = PREFIX_LENGTH + payload.len() + CHECKSUM_LENGTH;
    if size > MAX_FRAME_LENGTH {
        return Err(C37118Error::malformed(format!(
            "{frame_type} frame of {size} bytes exceeds {MAX_FRAME_LENGTH}"
        )));
    }
    let mut buf = BytesMut::with_capacity(size);
    buf.extend_from_slice(&FrameHeader::new(frame_type, size as u16, id_code, timestamp).encode());
    buf.extend_from_slice(payload);
    let crc = crc_ccitt(&buf);
    buf.put_u16(crc);
    Ok(buf.freeze())
}

/// Build an 18-byte command frame.
pub fn encode_command(code: CommandCode, id_code: u16, timestamp: Timestamp) -> Bytes {
    let mut buf = BytesMut::with_capacity(COMMAND_FRAME_LENGTH);
    let header = FrameHeader::new(FrameType::Command, COMMAND_FRAME_LENGTH as u16, id_code, timestamp);
    buf.extend_from_slice(&header.encode());
    buf.put_u16(code.code());
    let crc = crc_ccitt(&buf);
    buf.put_u16(crc);
    buf.freeze()
}

/// Build a header frame carrying `text`.
pub fn encode_header(id_code: u16, timestamp: Timestamp, text: &str) -> Result<Bytes> {
    finish(FrameType::Header, id_code, timestamp, text.as_bytes())
}

/// Build a CFG-2 frame describing `config`.
pub fn encode_configuration(config: &StreamConfiguration, timestamp: Timestamp) -> Result<Bytes> {
    let blocks: usize = config.stations.iter().map(StationConfig::config_block_size).sum();
    let mut body = BytesMut::with_capacity(4 + 2 + blocks + 2);
    body.put_u32(config.identity.time_base & 0x00FF_FFFF);
    body.put_u16(config.stations.len() as u16);
    for station in &config.stations {
        put_station(&mut body, station);
    }
    body.put_i16(config.identity.data_rate);
    finish(FrameType::Config2, config.identity.id_code, timestamp, &body)
}

fn put_station(body: &mut BytesMut, station: &StationConfig) {
    put_name(body, &station.name);
    body.put_u16(station.id_code);
    body.put_u16(station.format.bits());
    body.put_u16(station.phasor_count() as u16);
    body.put_u16(station.analog_count() as u16);
    body.put_u16(station.digital_word_count() as u16);
    for ch in &station.phasors {
        put_name(body, &ch.name);
    }
    for ch in &station.analogs {
        put_name(body, &ch.name);
    }
    for word in &station.digitals {
        for name in &word.names {
            put_name(body, name);
        }
    }
    for ch in &station.phasors {
        body.put_u32(ch.unit.as_u32());
    }
    for ch in &station.analogs {
        body.put_u32(ch.unit.as_u32());
    }
    for word in &station.digitals {
        body.put_u32(word.unit.as_u32());
    }
    body.put_u16(station.nominal_frequency.as_u16());
    body.put_u16(station.config_change_count);
}

/// Space padded to 16 bytes, truncated if longer.
fn put_name(body: &mut BytesMut, name: &str) {
    let raw = name.as_bytes();
    let len = raw.len().min(NAME_LENGTH);
    body.put_slice(&raw[..len]);
    body.put_bytes(b' ', NAME_LENGTH - len);
}

/// Build a data frame for `frame` laid out according to `config`.
///
/// Integer fields are rounded and saturated. Fails with
/// [`C37118Error::SchemaMismatch`] when the measurement counts do not match
/// the configuration.
pub fn encode_data(frame: &DataFrame, config: &StreamConfiguration) -> Result<Bytes> {
    if frame.stations.len() != config.stations.len() {
        return Err(C37118Error::schema_mismatch(format!(
            "{} station blocks for {} configured stations",
            frame.stations.len(),
            config.stations.len()
        )));
    }
    let mut body = BytesMut::with_capacity(config.data_frame_size());
    for (measurement, station) in frame.stations.iter().zip(&config.stations) {
        put_measurement(&mut body, measurement, station)?;
    }
    finish(FrameType::Data, config.identity.id_code, frame.timestamp, &body)
}

fn put_measurement(body: &mut BytesMut, m: &StationMeasurement, station: &StationConfig) -> Result<()> {
    if m.phasors.len() != station.phasor_count()
        || m.analogs.len() != station.analog_count()
        || m.digitals.len() != station.digital_word_count()
    {
        return Err(C37118Error::schema_mismatch(format!(
            "measurement counts for station {} do not match its configuration",
            station.id_code
        )));
    }
    let format = station.format;
    body.put_u16(m.status.0);

    for (phasor, ch) in m.phasors.iter().zip(&station.phasors) {
        put_phasor(body, phasor, format.phasor_format(), format.phasor_notation(), ch.unit.factor());
    }

    match format.frequency_format() {
        NumericFormat::Fixed => {
            body.put_i16(((m.freq - station.nominal_frequency.hz()) * 1000.0).round() as i16);
            body.put_i16((m.dfreq * 100.0).round() as i16);
        }
        NumericFormat::Float => {
            body.put_f32(m.freq as f32);
            body.put_f32(m.dfreq as f32);
        }
    }

    for (value, ch) in m.analogs.iter().zip(&station.analogs) {
        match format.analog_format() {
            NumericFormat::Fixed => body.put_i16((value / ch.unit.factor()).round() as i16),
            NumericFormat::Float => body.put_f32(*value as f32),
        }
    }

    for word in &m.digitals {
        body.put_u16(*word);
    }
    Ok(())
}

fn put_phasor(body: &mut BytesMut, phasor: &Phasor, numeric: NumericFormat, notation: PhasorNotation, factor: f64) {
    let scale = |v: f64| if factor == 0.0 { 0.0 } else { (v / factor).round() };
    match (numeric, notation) {
        (NumericFormat::Fixed, PhasorNotation::Rectangular) => {
            body.put_i16(scale(phasor.real()) as i16);
            body.put_i16(scale(phasor.imaginary()) as i16);
        }
        (NumericFormat::Fixed, PhasorNotation::Polar) => {
            body.put_u16(scale(phasor.magnitude) as u16);
            body.put_i16((phasor.angle * 10_000.0).round() as i16);
        }
        (NumericFormat::Float, PhasorNotation::Rectangular) => {
            body.put_f32(phasor.real() as f32);
            body.put_f32(phasor.imaginary() as f32);
        }
        (NumericFormat::Float, PhasorNotation::Polar) => {
            body.put_f32(phasor.magnitude as f32);
            body.put_f32(phasor.angle as f32);
        }
    }
}
