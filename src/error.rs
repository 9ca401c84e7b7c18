use thiserror::Error;

/// Main error type for the clip-composer library
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Pipeline failure: {0}")]
    Pipeline(#[from] PipelineFailure),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised while decoding an image or animated image source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Source is empty")]
    Empty,

    #[error("Malformed image data: {reason}")]
    Malformed { reason: String },

    #[error("Animated source contains no decodable frame")]
    NoFrames,
}

/// Errors raised by the editing session itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("An export is already running (writing to {output})")]
    Busy { output: String },
}

/// Category of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorCode {
    /// The pipeline could not be started at all (missing binary, bad setup)
    Unavailable,
    /// An input could not be read or an output could not be written
    Io,
    /// The pipeline rejected the job description
    InvalidComposition,
    /// Decoding, encoding or muxing failed inside the pipeline
    Processing,
    Unspecified,
}

/// Failure reported by a transformation pipeline, relayed as-is
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({code:?})")]
pub struct PipelineFailure {
    pub code: PipelineErrorCode,
    pub message: String,
}

impl PipelineFailure {
    pub fn new<S: Into<String>>(code: PipelineErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using EditorError
pub type Result<T> = std::result::Result<T, EditorError>;

impl EditorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode(DecodeError::Empty) => {
                "The selected animated filter is empty. Pick another file.".to_string()
            }
            Self::Decode(DecodeError::NoFrames) => {
                "The selected animated filter has no frames that could be decoded.".to_string()
            }
            Self::Session(SessionError::Busy { .. }) => {
                "An export is already in progress. Cancel it or wait for it to finish.".to_string()
            }
            Self::Pipeline(PipelineFailure {
                code: PipelineErrorCode::Unavailable,
                message,
            }) => {
                format!("The transformation pipeline is not available: {}", message)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
