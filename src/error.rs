// Crate-wide error type and coarse result codes.
//
// Every fallible operation in the codec reports one of three outcomes:
// success, end-of-data (the input ended before a complete unit could be
// read), or a hard error.  `VcdiffError::status` collapses the rich error
// into that three-way code for callers that only need the classification.

use std::io;

use crate::vcdiff::varint::VarIntError;

/// Coarse outcome of a codec operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    /// Input ended before a complete item could be read.
    Eod,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => f.write_str("success"),
            Status::Eod => f.write_str("end of data"),
            Status::Error => f.write_str("error"),
        }
    }
}

/// Errors produced while encoding or decoding a VCDIFF stream.
#[derive(Debug, thiserror::Error)]
pub enum VcdiffError {
    /// The input ended before a complete header, window or instruction.
    #[error("unexpected end of data")]
    Eod,

    /// Malformed input: bad magic, illegal flags, out-of-range values.
    #[error("invalid VCDIFF data: {0}")]
    Invalid(String),

    /// A window's Adler-32 did not match the reconstructed bytes.
    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Well-formed input that uses a feature this codec does not implement.
    #[error("unsupported VCDIFF feature: {0}")]
    Unsupported(String),

    /// Encoder configuration rejected before any output was produced.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VcdiffError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        VcdiffError::Invalid(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        VcdiffError::Unsupported(msg.into())
    }

    /// Map to the coarse three-way result code.
    pub fn status(&self) -> Status {
        match self {
            VcdiffError::Eod => Status::Eod,
            _ => Status::Error,
        }
    }

    /// `true` if this is an end-of-data condition rather than a hard error.
    #[inline]
    pub fn is_eod(&self) -> bool {
        matches!(self, VcdiffError::Eod)
    }
}

impl From<VarIntError> for VcdiffError {
    fn from(e: VarIntError) -> Self {
        match e {
            VarIntError::Eod => VcdiffError::Eod,
            VarIntError::Overflow => VcdiffError::invalid("varint overflow"),
        }
    }
}

pub type Result<T> = std::result::Result<T, VcdiffError>;
