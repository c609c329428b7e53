//! Speaker model: the reference templates recognition matches against.
//!
//! A model is an ordered list of items (a label plus the command it stands
//! for), each with one or more recorded sample utterances. Recognition walks
//! a flat index over every sample of every item; `owner` maps a flat index
//! back to its item.
//!
//! Each sample also carries its DTW scratch window and an `active` flag.
//! Both belong to the recognizer thread for the duration of a run.

pub mod file;

use crate::error::{Result, VoicectlError};
use crate::features::FeatureVector;
use crate::recognition::dtw::DtwWindow;

/// One recorded example of an item.
#[derive(Debug, Clone)]
pub struct SampleUtterance {
    pub id: String,
    pub frames: Vec<FeatureVector>,
    /// Raw 16-bit PCM bytes of the recording, when kept.
    pub waveform: Option<Vec<u8>>,
    pub(crate) window: DtwWindow,
    pub(crate) active: bool,
}

impl SampleUtterance {
    pub fn new(id: impl Into<String>, frames: Vec<FeatureVector>) -> Self {
        let window = DtwWindow::new(frames.len());
        Self {
            id: id.into(),
            frames,
            waveform: None,
            window,
            active: true,
        }
    }

    pub fn with_waveform(mut self, waveform: Vec<u8>) -> Self {
        self.waveform = Some(waveform);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[derive(Debug, Clone)]
pub struct ModelItem {
    pub label: String,
    pub command: String,
    pub samples: Vec<SampleUtterance>,
}

impl ModelItem {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            samples: Vec::new(),
        }
    }

    pub fn with_sample(mut self, sample: SampleUtterance) -> Self {
        self.samples.push(sample);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    items: Vec<ModelItem>,
    /// `(item, sample)` for every sample, in file order.
    direct: Vec<(usize, usize)>,
}

impl Model {
    pub fn new(items: Vec<ModelItem>) -> Self {
        let direct = items
            .iter()
            .enumerate()
            .flat_map(|(i, item)| (0..item.samples.len()).map(move |s| (i, s)))
            .collect();
        Self { items, direct }
    }

    pub fn items(&self) -> &[ModelItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&ModelItem> {
        self.items.get(index)
    }

    /// Total number of samples across all items.
    pub fn sample_count(&self) -> usize {
        self.direct.len()
    }

    /// Item that owns the sample at flat index `k`.
    pub fn owner(&self, k: usize) -> usize {
        self.direct[k].0
    }

    pub fn sample(&self, k: usize) -> &SampleUtterance {
        let (i, s) = self.direct[k];
        &self.items[i].samples[s]
    }

    pub fn sample_mut(&mut self, k: usize) -> &mut SampleUtterance {
        let (i, s) = self.direct[k];
        &mut self.items[i].samples[s]
    }

    /// Mark every sample active and forget its DTW history.
    pub fn activate_all(&mut self) {
        for item in &mut self.items {
            for sample in &mut item.samples {
                sample.active = true;
                sample.window = DtwWindow::new(sample.frames.len());
            }
        }
    }

    pub fn active_count(&self) -> usize {
        (0..self.sample_count())
            .filter(|&k| self.sample(k).active)
            .count()
    }

    /// Deactivate sample `k`. Returns whether it was active.
    pub fn deactivate(&mut self, k: usize) -> bool {
        let sample = self.sample_mut(k);
        std::mem::replace(&mut sample.active, false)
    }

    /// A model can drive recognition only with at least one sample, and
    /// every sample needs at least one frame.
    pub fn validate(&self) -> Result<()> {
        if self.direct.is_empty() {
            return Err(VoicectlError::EmptyModel);
        }
        for item in &self.items {
            if let Some(sample) = item.samples.iter().find(|s| s.is_empty()) {
                return Err(VoicectlError::ModelFormat {
                    message: format!(
                        "sample '{}' of item '{}' has no frames",
                        sample.id, item.label
                    ),
                });
            }
        }
        Ok(())
    }
}
