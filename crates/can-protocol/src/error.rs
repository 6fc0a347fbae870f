//! Transport Error Taxonomy

use std::fmt;

use thiserror::Error;

/// Classified driver return codes. The driver reports failures as negative
/// integers; anything outside this table maps to [`ErrorCode::Unknown`] and
/// is still logged, never dropped.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Unspecified driver failure.
    Generic = -1,
    /// Library or channel not initialized.
    NotInitialized = -2,
    /// System memory error while copying parameters or results.
    Memory = -3,
    /// Operation not supported by the board.
    Unsupported = -4,
    /// A parameter is out of the supported range.
    InvalidParam = -5,
    /// No board or channel matches the parameter.
    NoDevice = -6,
    /// The channel is occupied by another process.
    Busy = -7,
    /// The driver-side operation timed out.
    Timeout = -8,
    /// Driver queue exhausted.
    NoBuffers = -9,
    /// Low-level I/O failure talking to the board.
    Io = -10,
    /// A code outside the documented set.
    Unknown = -99,
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        match code {
            -1 => Self::Generic,
            -2 => Self::NotInitialized,
            -3 => Self::Memory,
            -4 => Self::Unsupported,
            -5 => Self::InvalidParam,
            -6 => Self::NoDevice,
            -7 => Self::Busy,
            -8 => Self::Timeout,
            -9 => Self::NoBuffers,
            -10 => Self::Io,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Generic => "unspecified driver failure",
            Self::NotInitialized => "driver not initialized",
            Self::Memory => "system memory error",
            Self::Unsupported => "operation not supported",
            Self::InvalidParam => "parameter out of supported range",
            Self::NoDevice => "no such board or channel",
            Self::Busy => "channel occupied by another process",
            Self::Timeout => "driver operation timed out",
            Self::NoBuffers => "driver queue exhausted",
            Self::Io => "board i/o failure",
            Self::Unknown => "undocumented driver code",
        };
        write!(f, "{} ({:?})", msg, self)
    }
}

/// A failed transport primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{op} failed on channel {channel}: {code}")]
pub struct TransportError {
    /// The primitive that failed.
    pub op: &'static str,
    /// Channel (or board slot) the call addressed.
    pub channel: u8,
    /// Classified driver code.
    pub code: ErrorCode,
}

impl TransportError {
    /// Classify a raw driver return value.
    pub fn from_raw(op: &'static str, channel: u8, ret: i32) -> Self {
        Self {
            op,
            channel,
            code: ErrorCode::from(ret),
        }
    }
}

/// Convenience alias used throughout the transport surface.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_codes_map() {
        assert_eq!(ErrorCode::from(-5), ErrorCode::InvalidParam);
        assert_eq!(ErrorCode::from(-6), ErrorCode::NoDevice);
        assert_eq!(ErrorCode::from(-7), ErrorCode::Busy);
    }

    #[test]
    fn test_unmatched_codes_become_unknown() {
        assert_eq!(ErrorCode::from(-42), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from(-999), ErrorCode::Unknown);
    }

    #[test]
    fn test_error_names_the_failing_step() {
        let err = TransportError::from_raw("set_bit_rate", 0, -5);
        let text = err.to_string();
        assert!(text.contains("set_bit_rate"));
        assert!(text.contains("channel 0"));
    }
}
