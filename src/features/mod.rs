//! Turning raw audio into feature vectors.
//!
//! [`Framer`] cuts the chunk stream into overlapping analysis windows and a
//! [`FrameProcessor`] maps each window to one [`FeatureVector`].

pub mod filterbank;
pub mod framer;

pub use filterbank::FilterbankExtractor;
pub use framer::Framer;

use crate::defaults::FEATURE_DIM;

/// One frame's spectral coefficients.
pub type FeatureVector = [f32; FEATURE_DIM];

/// Maps one analysis window of samples to one feature vector.
///
/// Implementations may keep scratch buffers, hence `&mut self`; the output
/// must depend on the window alone.
pub trait FrameProcessor: Send {
    /// Number of samples expected per window.
    fn window_len(&self) -> usize;

    fn process(&mut self, window: &[i16]) -> FeatureVector;
}
