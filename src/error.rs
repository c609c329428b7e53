//! Error types for voicectl.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoicectlError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Speaker model errors
    #[error("Speaker model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Malformed speaker model: {message}")]
    ModelFormat { message: String },

    #[error("Speaker model contains no sample utterances")]
    EmptyModel,

    // Action errors
    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Failed to start pipeline: {message}")]
    PipelineStart { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoicectlError>;
