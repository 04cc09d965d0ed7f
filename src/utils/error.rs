use std::error::Error;
use std::fmt;
use std::io;

use crate::bitstream::BitStreamError;

/// Main error type for the wavelet codec.
#[derive(Debug)]
pub enum WaveletError {
    /// An I/O error occurred
    Io(io::Error),
    /// Invalid dimensions, process counts or codec settings
    Config(String),
    /// A byte budget was reached; data written so far is still valid
    BudgetExceeded { budget: usize },
    /// Decoded sizes disagree with what the header promised
    Corrupt(String),
    /// A peer rank went away or sent something unexpected
    Comm(String),
}

impl WaveletError {
    /// Budget stops are the only errors a caller is expected to recover from.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WaveletError::BudgetExceeded { .. })
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        WaveletError::Config(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        WaveletError::Corrupt(msg.into())
    }
}

impl fmt::Display for WaveletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveletError::Io(err) => write!(f, "I/O error: {}", err),
            WaveletError::Config(msg) => write!(f, "Configuration error: {}", msg),
            WaveletError::BudgetExceeded { budget } => {
                write!(f, "Byte budget of {} bytes exceeded", budget)
            }
            WaveletError::Corrupt(msg) => write!(f, "Corrupt stream: {}", msg),
            WaveletError::Comm(msg) => write!(f, "Communication error: {}", msg),
        }
    }
}

impl Error for WaveletError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WaveletError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for WaveletError {
    fn from(err: io::Error) -> Self {
        WaveletError::Io(err)
    }
}

impl From<BitStreamError> for WaveletError {
    fn from(err: BitStreamError) -> Self {
        let msg = err.to_string();
        match err {
            BitStreamError::BudgetExceeded(budget) => WaveletError::BudgetExceeded { budget },
            BitStreamError::Io(e) => WaveletError::Io(e),
            BitStreamError::BlockTooLarge { .. } => WaveletError::Corrupt(msg),
            BitStreamError::WriterUnavailable | BitStreamError::Coder(_) => {
                WaveletError::Io(io::Error::other(msg))
            }
        }
    }
}

/// A specialized `Result` type for codec operations.
pub type Result<T> = std::result::Result<T, WaveletError>;
