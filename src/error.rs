//! Error types for the IEEE C37.118 client.

use thiserror::Error;

/// Result type alias for C37.118 operations.
pub type Result<T> = std::result::Result<T, C37118Error>;

/// IEEE C37.118 client error types.
#[derive(Debug, Error)]
pub enum C37118Error {
    /// The OS refused to hand out a socket. Not recoverable by retrying.
    #[error("Socket creation failed: {0}")]
    SocketCreation(std::io::Error),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Peer closed the connection (read returned zero bytes) or the stream broke.
    #[error("Connection lost")]
    ConnectionLost,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad sync word, length, checksum or truncated payload
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// FORMAT word with bits this client does not understand
    #[error("Unsupported format flags: 0x{0:04X}")]
    UnsupportedFormat(u16),

    /// Data frame does not match the active configuration
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Configuration is missing required fields or has inconsistent counts
    #[error("Incomplete configuration: {0}")]
    IncompleteConfiguration(String),

    /// No station with this IDCODE in the active configuration
    #[error("Station not found: IDCODE {0}")]
    StationNotFound(u16),

    /// Host-supplied configuration blob could not be imported
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No reply from the PMU within the response timeout
    #[error("Response timeout")]
    Timeout,
}

impl C37118Error {
    /// Create a malformed frame error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Create an incomplete configuration error.
    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::IncompleteConfiguration(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check if this error indicates a connection problem.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionLost | Self::Io(_) | Self::Timeout
        )
    }

    /// Check if this error must abort the session instead of triggering a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SocketCreation(_))
    }

    /// Check if this error means configuration and data are out of sync.
    pub fn requires_reconfiguration(&self) -> bool {
        matches!(self, Self::SchemaMismatch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = C37118Error::ConnectionLost;
        assert_eq!(err.to_string(), "Connection lost");

        let err = C37118Error::UnsupportedFormat(0x0010);
        assert_eq!(err.to_string(), "Unsupported format flags: 0x0010");

        let err = C37118Error::StationNotFound(1410);
        assert_eq!(err.to_string(), "Station not found: IDCODE 1410");
    }

    #[test]
    fn test_is_connection_error() {
        assert!(C37118Error::ConnectionLost.is_connection_error());
        assert!(C37118Error::Timeout.is_connection_error());
        assert!(C37118Error::Connection("refused".into()).is_connection_error());
        assert!(!C37118Error::malformed("bad sync").is_connection_error());
    }

    #[test]
    fn test_is_fatal() {
        let err = C37118Error::SocketCreation(std::io::Error::other("EMFILE"));
        assert!(err.is_fatal());
        assert!(!C37118Error::ConnectionLost.is_fatal());
    }

    #[test]
    fn test_requires_reconfiguration() {
        assert!(C37118Error::schema_mismatch("size").requires_reconfiguration());
        assert!(!C37118Error::incomplete("no names").requires_reconfiguration());
    }
}
