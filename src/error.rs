use std::fmt::Display;

/// Failures of a single call across the native boundary.
#[derive(Debug)]
pub enum BridgeError {
    MissingSymbol { symbol: String, reason: String },
    InteriorNul { position: usize },
    NullReturn { symbol: String },
    InvalidUtf8 { symbol: String },
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::MissingSymbol { symbol, reason } => {
                write!(f, "Symbol {} could not be resolved: {}", symbol, reason)
            }
            BridgeError::InteriorNul { position } => {
                write!(f, "Input contains a NUL byte at offset {}", position)
            }
            BridgeError::NullReturn { symbol } => {
                write!(f, "{} returned a null pointer", symbol)
            }
            BridgeError::InvalidUtf8 { symbol } => {
                write!(f, "{} returned text that is not valid UTF-8", symbol)
            }
        }
    }
}

impl std::error::Error for BridgeError {}
