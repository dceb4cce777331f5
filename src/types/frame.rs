//! IEEE C37.118 common frame header.
//!
//! Every frame starts with the same 14-byte prefix and ends with a CRC-CCITT
//! checksum.
//!
//! ```text
//! +------+------+---------+---------+-----------+-------------+---------+-------+
//! | 0xAA | type | FRAMESZ | IDCODE  |    SOC    | FRACSEC     | payload | CHK   |
//! |      | ver  | (2)     | (2)     |    (4)    | TQ(1)+FR(3) |   ...   | (2)   |
//! +------+------+---------+---------+-----------+-------------+---------+-------+
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{C37118Error, Result};

/// Leading byte of the SYNC word.
pub const SYNC_BYTE: u8 = 0xAA;

/// Size of the common prefix (SYNC..FRACSEC).
pub const PREFIX_LENGTH: usize = 14;

/// Size of the trailing checksum.
pub const CHECKSUM_LENGTH: usize = 2;

/// Smallest legal frame: prefix + checksum.
pub const MIN_FRAME_LENGTH: usize = PREFIX_LENGTH + CHECKSUM_LENGTH;

/// Length of a command frame without extended data.
pub const COMMAND_FRAME_LENGTH: usize = PREFIX_LENGTH + 2 + CHECKSUM_LENGTH;

/// Protocol version written into outgoing SYNC words (C37.118.2-2011).
pub const PROTOCOL_VERSION: u8 = 0x02;

/// Frame type carried in bits 6-4 of the second SYNC byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Data frame (measurements)
    Data,
    /// Header frame (free text)
    Header,
    /// Configuration frame 1 (capabilities)
    Config1,
    /// Configuration frame 2 (current layout)
    Config2,
    /// Command frame
    Command,
    /// Configuration frame 3 (extended, 2011+)
    Config3,
}

impl FrameType {
    /// Bits 6-4 of the second SYNC byte for this frame type.
    #[inline]
    pub const fn type_bits(&self) -> u8 {
        match self {
            Self::Data => 0b000,
            Self::Header => 0b001,
            Self::Config1 => 0b010,
            Self::Config2 => 0b011,
            Self::Command => 0b100,
            Self::Config3 => 0b101,
        }
    }

    /// Parse the frame type from a SYNC word.
    pub fn from_sync(sync: u16) -> Result<Self> {
        if (sync >> 8) as u8 != SYNC_BYTE {
            return Err(C37118Error::malformed(format!(
                "bad sync byte 0x{:02X}",
                sync >> 8
            )));
        }
        match (sync >> 4) & 0x07 {
            0b000 => Ok(Self::Data),
            0b001 => Ok(Self::Header),
            0b010 => Ok(Self::Config1),
            0b011 => Ok(Self::Config2),
            0b100 => Ok(Self::Command),
            0b101 => Ok(Self::Config3),
            bits => Err(C37118Error::malformed(format!(
                "unknown frame type bits {bits:03b}"
            ))),
        }
    }

    /// Build the SYNC word for this frame type.
    #[inline]
    pub const fn sync_word(&self) -> u16 {
        ((SYNC_BYTE as u16) << 8) | ((self.type_bits() as u16) << 4) | PROTOCOL_VERSION as u16
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Data => "DATA",
            Self::Header => "HEADER",
            Self::Config1 => "CFG-1",
            Self::Config2 => "CFG-2",
            Self::Command => "CMD",
            Self::Config3 => "CFG-3",
        };
        f.write_str(name)
    }
}

/// Command codes understood by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    /// Turn off transmission of data frames
    TurnOff,
    /// Turn on transmission of data frames
    TurnOn,
    /// Send header frame
    SendHeader,
    /// Send configuration frame 1
    SendConfig1,
    /// Send configuration frame 2
    SendConfig2,
}

impl CommandCode {
    /// Wire value of the CMD field.
    #[inline]
    pub const fn code(&self) -> u16 {
        match self {
            Self::TurnOff => 0x0001,
            Self::TurnOn => 0x0002,
            Self::SendHeader => 0x0003,
            Self::SendConfig1 => 0x0004,
            Self::SendConfig2 => 0x0005,
        }
    }

    /// Parse a command code from the CMD field.
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            0x0001 => Ok(Self::TurnOff),
            0x0002 => Ok(Self::TurnOn),
            0x0003 => Ok(Self::SendHeader),
            0x0004 => Ok(Self::SendConfig1),
            0x0005 => Ok(Self::SendConfig2),
            _ => Err(C37118Error::malformed(format!(
                "unknown command 0x{code:04X}"
            ))),
        }
    }
}

/// SOC/FRACSEC timestamp.
///
/// `fracsec` holds the 24-bit fraction count; `time_quality` holds the
/// leap-second and clock quality flags from the top byte of FRACSEC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    /// Seconds since 1970-01-01 UTC
    pub soc: u32,
    /// Fraction of second, in units of 1/TIME_BASE
    pub fracsec: u32,
    /// Time quality / leap second flags
    pub time_quality: u8,
}

impl Timestamp {
    /// Create a timestamp with no quality flags.
    #[inline]
    pub const fn new(soc: u32, fracsec: u32) -> Self {
        Self {
            soc,
            fracsec: fracsec & 0x00FF_FFFF,
            time_quality: 0,
        }
    }

    /// Current wall clock time expressed against `time_base`.
    pub fn now(time_base: u32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let fracsec = (now.subsec_nanos() as u64 * time_base as u64 / 1_000_000_000) as u32;
        Self::new(now.as_secs() as u32, fracsec)
    }

    /// Decode the packed 32-bit FRACSEC field.
    #[inline]
    pub const fn from_parts(soc: u32, raw_fracsec: u32) -> Self {
        Self {
            soc,
            fracsec: raw_fracsec & 0x00FF_FFFF,
            time_quality: (raw_fracsec >> 24) as u8,
        }
    }

    /// Encode the packed 32-bit FRACSEC field.
    #[inline]
    pub const fn raw_fracsec(&self) -> u32 {
        ((self.time_quality as u32) << 24) | (self.fracsec & 0x00FF_FFFF)
    }

    /// Leap second pending flag (bit 4 of the time quality byte).
    #[inline]
    pub const fn leap_second_pending(&self) -> bool {
        self.time_quality & 0x10 != 0
    }

    /// Clock quality code (bits 3-0), 0 = locked to UTC.
    #[inline]
    pub const fn quality_code(&self) -> u8 {
        self.time_quality & 0x0F
    }
}

/// Common 14-byte frame prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame type from SYNC
    pub frame_type: FrameType,
    /// Version nibble from SYNC
    pub version: u8,
    /// Total frame size in bytes, checksum included
    pub frame_size: u16,
    /// Stream or command source IDCODE
    pub id_code: u16,
    /// SOC/FRACSEC timestamp
    pub timestamp: Timestamp,
}

impl FrameHeader {
    /// Create a prefix for an outgoing frame.
    pub fn new(frame_type: FrameType, frame_size: u16, id_code: u16, timestamp: Timestamp) -> Self {
        Self {
            frame_type,
            version: PROTOCOL_VERSION,
            frame_size,
            id_code,
            timestamp,
        }
    }

    /// Parse the prefix from the first 14 bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREFIX_LENGTH {
            return Err(C37118Error::malformed(format!(
                "frame prefix needs {PREFIX_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        let sync = u16::from_be_bytes([bytes[0], bytes[1]]);
        let frame_type = FrameType::from_sync(sync)?;
        let version = (sync & 0x000F) as u8;
        if version == 0 {
            return Err(C37118Error::malformed("version nibble is zero"));
        }
        let soc = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let raw_fracsec = u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
        Ok(Self {
            frame_type,
            version,
            frame_size: u16::from_be_bytes([bytes[2], bytes[3]]),
            id_code: u16::from_be_bytes([bytes[4], bytes[5]]),
            timestamp: Timestamp::from_parts(soc, raw_fracsec),
        })
    }

    /// Encode the prefix to 14 bytes.
    pub fn encode(&self) -> [u8; PREFIX_LENGTH] {
        let sync = ((SYNC_BYTE as u16) << 8)
            | ((self.frame_type.type_bits() as u16) << 4)
            | (self.version as u16 & 0x0F);
        let mut out = [0u8; PREFIX_LENGTH];
        out[0..2].copy_from_slice(&sync.to_be_bytes());
        out[2..4].copy_from_slice(&self.frame_size.to_be_bytes());
        out[4..6].copy_from_slice(&self.id_code.to_be_bytes());
        out[6..10].copy_from_slice(&self.timestamp.soc.to_be_bytes());
        out[10..14].copy_from_slice(&self.timestamp.raw_fracsec().to_be_bytes());
        out
    }
}

/// CRC-CCITT (poly 0x1021, init 0xFFFF, no reflection) as used by C37.118.
pub fn crc_ccitt(buffer: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in buffer {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Check that a whole frame is self-consistent: prefix parses, FRAMESIZE equals
/// the buffer length and the trailing checksum matches.
pub fn verify_frame(bytes: &[u8]) -> Result<FrameHeader> {
    if bytes.len() < MIN_FRAME_LENGTH {
        return Err(C37118Error::malformed(format!(
            "frame needs at least {MIN_FRAME_LENGTH} bytes, got {}",
            bytes.len()
        )));
    }
    let header = FrameHeader::parse(bytes)?;
    if header.frame_size as usize != bytes.len() {
        return Err(C37118Error::malformed(format!(
            "FRAMESIZE {} does not match buffer length {}",
            header.frame_size,
            bytes.len()
        )));
    }
    let body = &bytes[..bytes.len() - CHECKSUM_LENGTH];
    let expected = crc_ccitt(body);
    let actual = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
    if expected != actual {
        return Err(C37118Error::malformed(format!(
            "checksum mismatch: computed 0x{expected:04X}, frame has 0x{actual:04X}"
        )));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_word() {
        assert_eq!(FrameType::Command.sync_word(), 0xAA42);
        assert_eq!(FrameType::Config2.sync_word(), 0xAA32);
        assert_eq!(FrameType::Data.sync_word(), 0xAA02);
        assert_eq!(FrameType::Header.sync_word(), 0xAA12);
    }

    #[test]
    fn test_frame_type_from_sync() {
        assert_eq!(FrameType::from_sync(0xAA31).unwrap(), FrameType::Config2);
        assert_eq!(FrameType::from_sync(0xAA01).unwrap(), FrameType::Data);
        assert!(FrameType::from_sync(0xAB01).is_err());
        assert!(FrameType::from_sync(0xAA71).is_err());
    }

    #[test]
    fn test_command_codes() {
        for cmd in [
            CommandCode::TurnOff,
            CommandCode::TurnOn,
            CommandCode::SendHeader,
            CommandCode::SendConfig1,
            CommandCode::SendConfig2,
        ] {
            assert_eq!(CommandCode::from_code(cmd.code()).unwrap(), cmd);
        }
        assert!(CommandCode::from_code(0x0008).is_err());
    }

    #[test]
    fn test_crc_ccitt_known_value() {
        // CRC-CCITT (0xFFFF) of "123456789"
        assert_eq!(crc_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_timestamp_fracsec_packing() {
        let ts = Timestamp::from_parts(1_392_733_934, 0x1F0F_4240);
        assert_eq!(ts.fracsec, 0x0F_4240);
        assert_eq!(ts.time_quality, 0x1F);
        assert!(ts.leap_second_pending());
        assert_eq!(ts.quality_code(), 0x0F);
        assert_eq!(ts.raw_fracsec(), 0x1F0F_4240);
    }

    #[test]
    fn test_header_encode_parse() {
        let header = FrameHeader::new(
            FrameType::Header,
            20,
            7,
            Timestamp::new(1_392_733_934, 500_000),
        );
        let bytes = header.encode();
        assert_eq!(&bytes[0..2], &[0xAA, 0x12]);
        assert_eq!(FrameHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_verify_frame_rejects_bad_checksum() {
        let header = FrameHeader::new(FrameType::Command, 18, 7, Timestamp::default());
        let mut frame = header.encode().to_vec();
        frame.extend_from_slice(&CommandCode::TurnOn.code().to_be_bytes());
        let crc = crc_ccitt(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        assert!(verify_frame(&frame).is_ok());

        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            verify_frame(&frame),
            Err(C37118Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_verify_frame_rejects_length_mismatch() {
        let header = FrameHeader::new(FrameType::Command, 40, 7, Timestamp::default());
        let mut frame = header.encode().to_vec();
        frame.extend_from_slice(&[0x00, 0x02]);
        let crc = crc_ccitt(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        assert!(matches!(
            verify_frame(&frame),
            Err(C37118Error::MalformedFrame(_))
        ));
    }
}
