use thiserror::Error;

/// Failure to decode a single telemetry record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Record too short: needed {needed} bytes, found {found}")]
    TooShort { needed: usize, found: usize },

    #[error("Missing null terminator in {field}")]
    MissingTerminator { field: &'static str },

    #[error("Truncated {field} at offset {offset}")]
    Truncated { field: &'static str, offset: usize },

    #[error("Non-ASCII bytes in {field}")]
    NonAscii { field: &'static str },

    #[error("Stream ended inside a record: declared {declared} bytes, {available} available")]
    UnexpectedEof { declared: usize, available: usize },
}

impl DecodeError {
    /// Whether the stream reader may skip the record and keep going.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DecodeError::TooShort { .. } => true,
            DecodeError::MissingTerminator { .. } => true,
            DecodeError::Truncated { .. } => true,
            DecodeError::NonAscii { .. } => true,
            DecodeError::UnexpectedEof { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `entry` counts whitespace-separated entries from 1
    #[error("Malformed catalog entry {entry}: {reason}")]
    MalformedEntry { entry: usize, reason: String },

    #[error("Invalid timestamp in catalog entry {entry}: '{value}'")]
    InvalidTimestamp { entry: usize, value: String },

    #[error("Recording {recording} has no '{event}' event")]
    MissingEvent { recording: String, event: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClipError {
    #[error("No recording covers segment {start:.3}..{end:.3}")]
    NoRecording { start: f64, end: f64 },
}

/// Outcome of a clustering capability that could not partition its input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("Insufficient data: {points} points, at least {required} required")]
    InsufficientData { points: usize, required: usize },

    #[error("Degenerate input: {0}")]
    Degenerate(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum TuwError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Clip(#[from] ClipError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TuwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_recoverability() {
        assert!(DecodeError::TooShort { needed: 24, found: 3 }.is_recoverable());
        assert!(DecodeError::MissingTerminator { field: "room" }.is_recoverable());
        assert!(!DecodeError::UnexpectedEof { declared: 80, available: 12 }.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = ClipError::NoRecording { start: 1.0, end: 2.5 };
        assert_eq!(err.to_string(), "No recording covers segment 1.000..2.500");

        let err: TuwError = ClusterError::InsufficientData { points: 1, required: 2 }.into();
        assert_eq!(err.to_string(), "Insufficient data: 1 points, at least 2 required");
    }
}
