//! Microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::source::AudioCapture;
use crate::audio::wav::{downmix, resample};
use crate::defaults;
use crate::error::{Result, VoicectlError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long `read` waits for the device before declaring it dead.
const READ_STALL_TIMEOUT: Duration = Duration::from_secs(2);

const READ_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Hides the ALSA/JACK chatter CPAL triggers while probing backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for desktop sound servers.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never microphones.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List input devices usable as a microphone.
///
/// Preferred sound-server devices are marked with "\[recommended\]".
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _keep_alive = host;
    let devices = devices.map_err(|e| VoicectlError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoicectlError::AudioCapture {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

        let mut preferred = None;
        for device in devices {
            let Ok(name) = device.name() else { continue };
            match device_name {
                Some(wanted) if name == wanted => return Ok(device),
                None if preferred.is_none() && is_preferred_device(&name) => {
                    preferred = Some(device);
                }
                _ => {}
            }
        }

        if let Some(wanted) = device_name {
            return Err(VoicectlError::AudioDeviceNotFound {
                device: wanted.to_string(),
            });
        }

        preferred
            .or_else(|| host.default_input_device())
            .ok_or_else(|| VoicectlError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only created, paused and dropped by the capture
/// station thread that owns the `CpalAudioSource`.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Live microphone capture, 16-bit mono at 16kHz.
///
/// The device callback appends to a shared buffer; `read` blocks until a
/// full chunk is buffered. Tries i16/16kHz/mono first and falls back to the
/// device's native format with software downmix and resampling.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    buffer: Arc<Mutex<Vec<i16>>>,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Select an input device. `None` prefers PipeWire/PulseAudio, then the
    /// host default.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        if let Ok(name) = device.name() {
            debug!(device = %name, "selected capture device");
        }

        Ok(Self {
            device,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate: defaults::SAMPLE_RATE,
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                buffer.lock().extend_from_slice(data);
            },
            |err| warn!(error = %err, "audio stream error"),
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| VoicectlError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        debug!(
            channels = native_channels,
            rate = native_rate,
            format = ?default_config.sample_format(),
            "using native capture format"
        );

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        let err_callback = |err| warn!(error = %err, "audio stream error");

        match default_config.sample_format() {
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let mono = downmix(data, native_channels);
                        buffer
                            .lock()
                            .extend(resample(&mono, native_rate, target_rate));
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoicectlError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {}", e),
                }),
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let pcm: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let mono = downmix(&pcm, native_channels);
                        buffer
                            .lock()
                            .extend(resample(&mono, native_rate, target_rate));
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoicectlError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {}", e),
                }),
            fmt => Err(VoicectlError::AudioCapture {
                message: format!(
                    "Unsupported native sample format: {:?}. \
                     Try specifying a device with --device.",
                    fmt
                ),
            }),
        }
    }
}

impl AudioCapture for CpalAudioSource {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        self.buffer.lock().clear();
        self.callback_count.store(0, Ordering::Relaxed);

        let stream = self.build_stream()?;
        stream.play().map_err(|e| VoicectlError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Some PipeWire-ALSA setups accept a non-native config but never
        // fire the callback.
        std::thread::sleep(Duration::from_millis(200));

        let stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            self.buffer.lock().clear();
            let native = self.build_stream_native()?;
            native.play().map_err(|e| VoicectlError::AudioCapture {
                message: format!("Failed to start native audio stream: {}", e),
            })?;
            native
        } else {
            stream
        };

        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn read(&mut self, chunk: &mut [i16]) -> Result<usize> {
        if self.stream.is_none() {
            return Err(VoicectlError::AudioCapture {
                message: "read from a closed device".to_string(),
            });
        }

        let mut last_progress = Instant::now();
        let mut last_len = 0;
        loop {
            {
                let mut buffer = self.buffer.lock();
                if buffer.len() >= chunk.len() {
                    chunk.copy_from_slice(&buffer[..chunk.len()]);
                    buffer.drain(..chunk.len());
                    return Ok(chunk.len());
                }
                if buffer.len() != last_len {
                    last_len = buffer.len();
                    last_progress = Instant::now();
                }
            }

            if last_progress.elapsed() > READ_STALL_TIMEOUT {
                return Err(VoicectlError::AudioCapture {
                    message: format!(
                        "no audio from device for {}s",
                        READ_STALL_TIMEOUT.as_secs()
                    ),
                });
            }
            std::thread::sleep(READ_POLL_INTERVAL);
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.0.pause().map_err(|e| VoicectlError::AudioCapture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        self.buffer.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51:CARD=PCH"));
        assert!(should_filter_device("HDMI 2"));
        assert!(should_filter_device("front:CARD=Generic"));
        assert!(!should_filter_device("pulse"));
        assert!(!should_filter_device("USB Microphone"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PulseAudio Sound Server"));
        assert!(!is_preferred_device("hw:CARD=PCH,DEV=0"));
    }

    #[test]
    fn test_list_devices_does_not_panic() {
        // CI machines often have no sound card; either outcome is fine.
        if let Ok(devices) = list_devices() {
            assert!(devices.iter().all(|name| !should_filter_device(name)));
        }
    }
}
