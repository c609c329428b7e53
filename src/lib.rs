//! voicectl - Speaker-dependent voice control
//!
//! Listens for isolated words, matches them against a trained speaker model
//! with dynamic time warping and runs the command bound to the word.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod action;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod recognition;

// Composition root - needs everything
#[cfg(all(feature = "cpal-audio", feature = "cli"))]
pub mod app;

// Core traits (source → features → recognizer → action)
pub use action::{Action, ActionRunner, CommandExecutor, ShellExecutor};
pub use audio::source::AudioCapture;
pub use features::{FeatureVector, FrameProcessor};

// Model and recognition
pub use model::{Model, ModelItem, SampleUtterance};
pub use recognition::{BranchAndBound, DtwParams, ScoreAggregator, TimeSyncDecoder};

// Pipeline
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use pipeline::types::{Recognition, RecognitionEvent};

// Error handling
pub use error::{Result, VoicectlError};

// Config
pub use config::Config;

// Station error reporting (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
