/*!
 * Error types for the dubwai application.
 *
 * `DubError` covers the per-unit failures of the dubbing pipeline. Most of
 * them are recoverable: the offending unit is dropped or degraded, the event
 * is handed to a diagnostics sink, and the batch keeps going. `ProviderError`
 * describes failures of the remote translation and speech backends, and
 * `AppError` wraps everything at the application boundary.
 */

use thiserror::Error;

/// Errors raised by the dubbing stages
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DubError {
    /// A timestamp could not be parsed; the unit carrying it is dropped
    #[error("Malformed timecode: '{0}'")]
    MalformedTimecode(String),

    /// A window or placement that cannot be honoured exactly
    #[error("Timing inconsistency for unit {index}: {message}")]
    TimingInconsistency {
        /// Unit index the problem refers to
        index: usize,
        /// Human readable description
        message: String,
    },

    /// The clip would need to be compressed beyond the configured ceiling
    #[error("Extreme speech rate for unit {index}: speed factor {factor:.2}")]
    ExtremeSpeechRate {
        /// Unit index
        index: usize,
        /// Computed speed factor
        factor: f64,
    },

    /// Speech synthesis failed or produced an empty render
    #[error("Speech synthesis failed for unit {index}: {message}")]
    SynthesisFailure {
        /// Unit index
        index: usize,
        /// Cause reported by the synthesizer
        message: String,
    },

    /// Translation failed; the unit keeps its source text
    #[error("Translation failed for unit {index}: {message}")]
    TranslationFailure {
        /// Unit index
        index: usize,
        /// Cause reported by the translator
        message: String,
    },

    /// A clip could not be read while assembling or rendering the track
    #[error("Audio I/O failed for unit {index}: {message}")]
    AssemblyIo {
        /// Unit index
        index: usize,
        /// Underlying I/O error
        message: String,
    },

    /// A stage received or produced no units at all
    #[error("Stage '{0}' has no units to work with")]
    EmptyStage(String),
}

impl DubError {
    /// Index of the unit the error refers to, when there is one
    pub fn unit_index(&self) -> Option<usize> {
        match self {
            Self::TimingInconsistency { index, .. }
            | Self::ExtremeSpeechRate { index, .. }
            | Self::SynthesisFailure { index, .. }
            | Self::TranslationFailure { index, .. }
            | Self::AssemblyIo { index, .. } => Some(*index),
            Self::MalformedTimecode(_) | Self::EmptyStage(_) => None,
        }
    }

    /// Warnings leave the output intact, everything else degrades it
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::ExtremeSpeechRate { .. } | Self::TimingInconsistency { .. })
    }
}

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Local I/O while storing a provider result
    #[error("I/O error: {0}")]
    Io(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::ParseError(_) | Self::AuthenticationError(_) | Self::Io(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a dubbing stage
    #[error("Dubbing error: {0}")]
    Dub(#[from] DubError),

    /// An external tool (ffmpeg, yt-dlp, ...) failed
    #[error("External tool error: {0}")]
    Tool(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
