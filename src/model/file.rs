//! `.cvc` speaker model files.
//!
//! Little-endian binary layout:
//!
//! ```text
//! i32 len, bytes   header "KVoiceControl Speakermodel V1.0"
//! i32              total number of samples
//! i32              number of items
//! per item:        i32 len + label, i32 len + command, i32 sample count
//! per sample:      i32 len + id, i32 frame count, frames * 16 f32,
//!                  i32 has_wave [, i32 wave_len, wave_len bytes]
//! ```

use super::{Model, ModelItem, SampleUtterance};
use crate::defaults::{FEATURE_DIM, MODEL_EXTENSION};
use crate::error::{Result, VoicectlError};
use crate::features::FeatureVector;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HEADER: &str = "KVoiceControl Speakermodel V1.0";

const MAX_STRING_LEN: usize = 64 * 1024;
const MAX_FRAMES: usize = 1 << 20;
const MAX_WAVE_BYTES: usize = 256 * 1024 * 1024;

/// `path` with the model extension appended unless it already has it.
pub fn model_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == MODEL_EXTENSION) {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(MODEL_EXTENSION);
    PathBuf::from(name)
}

fn format_error(message: impl Into<String>) -> VoicectlError {
    VoicectlError::ModelFormat {
        message: message.into(),
    }
}

fn truncated(e: io::Error) -> VoicectlError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        format_error("unexpected end of file")
    } else {
        VoicectlError::Io(e)
    }
}

/* ─────────────────────────── reading ─────────────────────────── */

struct ModelReader<R> {
    inner: R,
}

impl<R: Read> ModelReader<R> {
    fn i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf).map_err(truncated)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// A non-negative count no larger than `max`.
    fn count(&mut self, what: &str, max: usize) -> Result<usize> {
        let value = self.i32()?;
        let count = usize::try_from(value)
            .map_err(|_| format_error(format!("negative {what}: {value}")))?;
        if count > max {
            return Err(format_error(format!("{what} too large: {count}")));
        }
        Ok(count)
    }

    fn bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(truncated)?;
        Ok(buf)
    }

    fn string(&mut self, what: &str) -> Result<String> {
        let len = self.count(what, MAX_STRING_LEN)?;
        let bytes = self.bytes(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink())?;
        if copied < len as u64 {
            return Err(format_error("unexpected end of file"));
        }
        Ok(())
    }

    fn frames(&mut self, count: usize) -> Result<Vec<FeatureVector>> {
        let raw = self.bytes(count * FEATURE_DIM * 4)?;
        Ok(raw
            .chunks_exact(FEATURE_DIM * 4)
            .map(|frame| {
                let mut vector = [0.0f32; FEATURE_DIM];
                for (value, bytes) in vector.iter_mut().zip(frame.chunks_exact(4)) {
                    *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                }
                vector
            })
            .collect())
    }

    fn sample(&mut self, with_waveforms: bool) -> Result<SampleUtterance> {
        let id = self.string("sample id length")?;
        let frame_count = self.count("frame count", MAX_FRAMES)?;
        let frames = self.frames(frame_count)?;
        let mut sample = SampleUtterance::new(id, frames);

        if self.i32()? != 0 {
            let wave_len = self.count("waveform length", MAX_WAVE_BYTES)?;
            if with_waveforms {
                sample.waveform = Some(self.bytes(wave_len)?);
            } else {
                self.skip(wave_len)?;
            }
        }
        Ok(sample)
    }
}

impl Model {
    /// Load a model file, appending the `.cvc` extension when missing.
    ///
    /// Recorded waveforms are only kept with `with_waveforms`; recognition
    /// never needs them.
    pub fn load(path: &Path, with_waveforms: bool) -> Result<Self> {
        let path = model_path(path);
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VoicectlError::ModelNotFound {
                path: path.display().to_string(),
            },
            _ => VoicectlError::Io(e),
        })?;
        let model = Self::read_from(BufReader::new(file), with_waveforms)?;
        debug!(
            path = %path.display(),
            items = model.items().len(),
            samples = model.sample_count(),
            "loaded speaker model"
        );
        Ok(model)
    }

    pub fn read_from<R: Read>(reader: R, with_waveforms: bool) -> Result<Self> {
        let mut r = ModelReader { inner: reader };

        let header = r.string("header length")?;
        if header != HEADER {
            return Err(format_error(format!("unknown header '{header}'")));
        }

        let total = r.count("sample total", usize::MAX)?;
        let item_count = r.count("item count", usize::MAX)?;

        let mut items = Vec::new();
        let mut seen = 0usize;
        for _ in 0..item_count {
            let label = r.string("label length")?;
            let command = r.string("command length")?;
            let sample_count = r.count("sample count", usize::MAX)?;
            seen = seen.saturating_add(sample_count);
            if seen > total {
                return Err(format_error(format!(
                    "more samples than the declared total of {total}"
                )));
            }

            let mut item = ModelItem::new(label, command);
            for _ in 0..sample_count {
                item.samples.push(r.sample(with_waveforms)?);
            }
            items.push(item);
        }

        if seen != total {
            return Err(format_error(format!(
                "declared {total} samples, found {seen}"
            )));
        }
        Ok(Model::new(items))
    }

    /// Write the model, replacing `path` (with `.cvc` appended when missing)
    /// only once the new file is complete.
    pub fn save(&self, path: &Path) -> Result<()> {
        let path = model_path(path);
        let tmp = path.with_extension(format!("{MODEL_EXTENSION}.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        fn int<W: Write>(w: &mut W, value: usize) -> Result<()> {
            let value = i32::try_from(value)
                .map_err(|_| format_error(format!("{value} does not fit the file format")))?;
            w.write_all(&value.to_le_bytes())?;
            Ok(())
        }
        fn string<W: Write>(w: &mut W, s: &str) -> Result<()> {
            int(w, s.len())?;
            w.write_all(s.as_bytes())?;
            Ok(())
        }

        string(writer, HEADER)?;
        int(writer, self.sample_count())?;
        int(writer, self.items().len())?;
        for item in self.items() {
            string(writer, &item.label)?;
            string(writer, &item.command)?;
            int(writer, item.samples.len())?;
            for sample in &item.samples {
                string(writer, &sample.id)?;
                int(writer, sample.frames.len())?;
                for frame in &sample.frames {
                    for value in frame {
                        writer.write_all(&value.to_le_bytes())?;
                    }
                }
                match &sample.waveform {
                    Some(wave) => {
                        int(writer, 1)?;
                        int(writer, wave.len())?;
                        writer.write_all(wave)?;
                    }
                    None => int(writer, 0)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(len: usize, base: f32) -> Vec<FeatureVector> {
        (0..len)
            .map(|i| std::array::from_fn(|c| base + i as f32 + c as f32 * 0.25))
            .collect()
    }

    fn model() -> Model {
        Model::new(vec![
            ModelItem::new("browser", "firefox &")
                .with_sample(SampleUtterance::new("browser-1", frames(5, 1.0)))
                .with_sample(
                    SampleUtterance::new("browser-2", frames(7, -2.0)).with_waveform(vec![1, 2, 3, 4]),
                ),
            ModelItem::new("stop", "voicectl_off")
                .with_sample(SampleUtterance::new("stop-1", frames(3, 0.5))),
        ])
    }

    fn encode(m: &Model) -> Vec<u8> {
        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_model_path_appends_extension_once() {
        assert_eq!(model_path(Path::new("me")), PathBuf::from("me.cvc"));
        assert_eq!(model_path(Path::new("me.cvc")), PathBuf::from("me.cvc"));
        assert_eq!(model_path(Path::new("me.old")), PathBuf::from("me.old.cvc"));
    }

    #[test]
    fn test_save_and_load_preserve_items_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let original = model();
        original.save(&dir.path().join("speaker")).unwrap();
        assert!(dir.path().join("speaker.cvc").exists());
        assert!(!dir.path().join("speaker.cvc.tmp").exists());

        let loaded = Model::load(&dir.path().join("speaker"), true).unwrap();
        assert_eq!(loaded.sample_count(), 3);
        assert_eq!(loaded.items()[0].command, "firefox &");
        assert_eq!(loaded.items()[1].label, "stop");
        assert_eq!(loaded.sample(1).frames, original.sample(1).frames);
        assert_eq!(loaded.sample(1).waveform.as_deref(), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(loaded.owner(2), 1);
    }

    #[test]
    fn test_waveforms_skipped_unless_requested() {
        let loaded = Model::read_from(&encode(&model())[..], false).unwrap();
        assert!(loaded.sample(1).waveform.is_none());
        // data after the skipped waveform still parses
        assert_eq!(loaded.sample(2).id, "stop-1");
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&model());
        assert_eq!(&bytes[..4], &(HEADER.len() as i32).to_le_bytes());
        assert_eq!(&bytes[4..4 + HEADER.len()], HEADER.as_bytes());
        let rest = &bytes[4 + HEADER.len()..];
        assert_eq!(&rest[..4], &3i32.to_le_bytes());
        assert_eq!(&rest[4..8], &2i32.to_le_bytes());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = Model::load(&dir.path().join("nobody"), false);
        match result {
            Err(VoicectlError::ModelNotFound { path }) => assert!(path.ends_with("nobody.cvc")),
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_header_is_rejected() {
        let mut bytes = encode(&model());
        bytes[4 + HEADER.len() - 1] = b'9';
        assert!(matches!(
            Model::read_from(&bytes[..], false),
            Err(VoicectlError::ModelFormat { .. })
        ));
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let bytes = encode(&model());
        for cut in [10, bytes.len() / 2, bytes.len() - 1] {
            let result = Model::read_from(&bytes[..cut], true);
            assert!(
                matches!(result, Err(VoicectlError::ModelFormat { .. })),
                "cut at {cut}: {result:?}"
            );
        }
    }

    #[test]
    fn test_sample_total_mismatch_is_rejected() {
        let mut bytes = encode(&model());
        let at = 4 + HEADER.len();
        bytes[at..at + 4].copy_from_slice(&4i32.to_le_bytes());
        assert!(matches!(
            Model::read_from(&bytes[..], false),
            Err(VoicectlError::ModelFormat { .. })
        ));
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let mut bytes = encode(&model());
        let at = 4 + HEADER.len() + 4;
        bytes[at..at + 4].copy_from_slice(&(-1i32).to_le_bytes());
        let err = Model::read_from(&bytes[..], false).unwrap_err();
        assert!(err.to_string().contains("negative item count"));
    }
}
