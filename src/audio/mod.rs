//! Audio input: capture devices and the peak-amplitude VAD.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod source;
pub mod vad;
pub mod wav;

pub use source::{AudioCapture, MockAudioSource};
pub use wav::WavAudioSource;
