use crate::aa55::packet::Command;
use std::time::Duration;

/// Everything that can go wrong talking to the inverter.
///
/// The polling layer matches on this to decide whether a failure counts
/// towards the offline streak or goes straight to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Nothing came back at all; the inverter is unreachable or asleep.
    #[error("inverter did not respond to {command} within {timeout:?}")]
    ConnectionTimeout { command: Command, timeout: Duration },

    /// Fewer bytes than the frame header declared (or fewer than a minimal frame).
    #[error("incomplete response to {command}: expected {expected} bytes, got {received:02x?}")]
    IncompleteResponse {
        command: Command,
        expected: usize,
        received: Vec<u8>,
    },

    #[error("response header {received:02x?} does not match expected {expected:02x?}")]
    HeaderMismatch { expected: [u8; 6], received: Vec<u8> },

    #[error("checksum mismatch: calculated {calculated:#06x}, received {received:#06x}")]
    ChecksumMismatch { calculated: u32, received: u16 },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("cannot decode payload: {0}")]
    ProtocolDecode(String),

    /// Local socket failure (bind, permissions, no buffer space). An
    /// unreachable inverter is reported as `ConnectionTimeout` instead.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transient failures are expected on a UDP link to a device that sleeps
    /// at night; they are absorbed by the polling cache instead of surfacing.
    pub fn is_transient(&self) -> bool {
        use Error::*;

        match self {
            ConnectionTimeout { .. }
            | IncompleteResponse { .. }
            | HeaderMismatch { .. }
            | ChecksumMismatch { .. } => true,
            Configuration(_) | ProtocolDecode(_) | Io(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_failures_are_transient() {
        let timeout = Error::ConnectionTimeout {
            command: Command::QueryRunningInfo,
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_transient());

        let checksum = Error::ChecksumMismatch {
            calculated: 0x1234,
            received: 0x1235,
        };
        assert!(checksum.is_transient());
    }

    #[test]
    fn decode_config_and_socket_failures_are_hard() {
        assert!(!Error::ProtocolDecode("work mode 7".to_string()).is_transient());
        assert!(!Error::Configuration("port 0".to_string()).is_transient());

        let io = Error::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(!io.is_transient());
    }

    #[test]
    fn incomplete_response_shows_received_bytes() {
        let err = Error::IncompleteResponse {
            command: Command::QueryIdInfo,
            expected: 9,
            received: vec![0xaa, 0x55],
        };
        assert_eq!(
            err.to_string(),
            "incomplete response to query id info: expected 9 bytes, got [aa, 55]"
        );
    }
}
