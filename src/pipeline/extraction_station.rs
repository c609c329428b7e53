//! Feature extraction station: audio chunks in, tagged feature vectors out.

use crate::features::{FeatureVector, FrameProcessor, Framer};
use crate::pipeline::orchestrator::PipelineConfig;
use crate::pipeline::queue::{StatusQueue, Tag};
use crate::pipeline::status::SharedStatus;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

const STATION: &str = "extraction";

/// Frames every utterance and forwards one feature vector per window.
///
/// The first vector of an utterance is tagged `Start` and the last `End`;
/// one vector is held back so the `End` tag always lands on a real frame.
/// Once `End` or `Abort` is forwarded the shared "extraction done" flag is
/// raised.
pub struct ExtractionStation {
    input: Arc<StatusQueue<Vec<i16>>>,
    output: Arc<StatusQueue<FeatureVector>>,
    status: Arc<SharedStatus>,
    processor: Box<dyn FrameProcessor>,
    framer: Framer,
    pending: Option<(Tag, FeatureVector)>,
    frames: usize,
}

impl ExtractionStation {
    pub fn new(
        input: Arc<StatusQueue<Vec<i16>>>,
        output: Arc<StatusQueue<FeatureVector>>,
        status: Arc<SharedStatus>,
        processor: Box<dyn FrameProcessor>,
        config: &PipelineConfig,
    ) -> Self {
        let framer = Framer::new(processor.window_len(), config.hop_samples);
        Self {
            input,
            output,
            status,
            processor,
            framer,
            pending: None,
            frames: 0,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(STATION.to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        loop {
            let item = self.input.pop();
            match item.tag {
                Tag::Start => {
                    self.framer.reset();
                    self.pending = None;
                    self.frames = 0;
                    self.status.set_extraction_done(false);
                    self.extract(&item.data, true);
                }
                Tag::Data => self.extract(&item.data, false),
                Tag::End => {
                    self.extract(&item.data, false);
                    self.finish();
                }
                Tag::Abort => {
                    self.pending = None;
                    self.output.push(Tag::Abort, [0.0; crate::defaults::FEATURE_DIM]);
                    self.status.set_extraction_done(true);
                }
                Tag::Exit => {
                    self.output.push(Tag::Exit, [0.0; crate::defaults::FEATURE_DIM]);
                    break;
                }
            }
        }
        debug!("extraction station stopped");
    }

    fn extract(&mut self, chunk: &[i16], starts_utterance: bool) {
        self.framer.push(chunk);

        let processor = &mut self.processor;
        let output = &self.output;
        let pending = &mut self.pending;
        let mut produced = 0;
        self.framer.frames(|index, _, window| {
            let features = processor.process(window);
            let tag = if starts_utterance && index == 0 {
                Tag::Start
            } else {
                Tag::Data
            };
            if let Some((tag, features)) = pending.replace((tag, features)) {
                output.push(tag, features);
            }
            produced += 1;
        });
        self.frames += produced;
    }

    /// Flush the held-back frame as the utterance's last.
    fn finish(&mut self) {
        match self.pending.take() {
            Some((Tag::Start, features)) => {
                // single-frame utterance: repeat the frame to close it
                self.output.push(Tag::Start, features);
                self.output.push(Tag::End, features);
            }
            Some((_, features)) => self.output.push(Tag::End, features),
            None => {
                debug!("utterance too short for a single frame");
                self.output.push(Tag::Abort, [0.0; crate::defaults::FEATURE_DIM]);
            }
        }
        trace!(frames = self.frames, "utterance extracted");
        self.status.set_extraction_done(true);
    }
}
