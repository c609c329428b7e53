use crate::defaults;
use crate::error::VoicectlError;
use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub recognizer: RecognizerConfig,
    pub features: FeatureConfig,
}

/// Audio capture and voice activity configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub rec_level: i16,
    pub stop_level: i16,
    pub open_retry_secs: u64,
}

/// DTW and branch-and-bound configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognizerConfig {
    pub score_threshold: f32,
    pub adjust_window_width: usize,
    pub sloppy_corner: usize,
    pub nbest: usize,
    pub branch_bound_lookahead: usize,
}

/// Feature extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    pub mean_subtraction: bool,
    pub channel_mean: Vec<f32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            rec_level: defaults::REC_LEVEL,
            stop_level: defaults::STOP_LEVEL,
            open_retry_secs: defaults::OPEN_RETRY_SECS,
        }
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            score_threshold: defaults::SCORE_THRESHOLD,
            adjust_window_width: defaults::ADJUST_WINDOW_WIDTH,
            sloppy_corner: defaults::SLOPPY_CORNER,
            nbest: defaults::NBEST,
            branch_bound_lookahead: defaults::BRANCH_BOUND_LOOKAHEAD,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            mean_subtraction: true,
            channel_mean: vec![0.0; defaults::FEATURE_DIM],
        }
    }
}

impl FeatureConfig {
    /// Channel mean as a fixed-size vector. Call after [`Config::validate`].
    pub fn channel_mean_vector(&self) -> FeatureVector {
        let mut mean = [0.0; defaults::FEATURE_DIM];
        for (dst, src) in mean.iter_mut().zip(&self.channel_mean) {
            *dst = *src;
        }
        mean
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML or values that
    /// fail [`Config::validate`]. Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VoicectlError::ConfigFileNotFound {
                path: path.display().to_string(),
            },
            _ => VoicectlError::ConfigParse {
                message: format!("cannot read {}: {e}", path.display()),
            },
        })?;
        let config: Config = toml::from_str(&contents).map_err(VoicectlError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if matches!(
                    e.downcast_ref::<VoicectlError>(),
                    Some(VoicectlError::ConfigFileNotFound { .. })
                ) {
                    Ok(Self::default())
                } else {
                    Err(e.context(format!("Failed to load config from {}", path.display())))
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOICECTL_AUDIO_DEVICE → audio.device
    /// - VOICECTL_REC_LEVEL → audio.rec_level
    /// - VOICECTL_STOP_LEVEL → audio.stop_level
    /// - VOICECTL_SCORE_THRESHOLD → recognizer.score_threshold
    ///
    /// Empty or unparsable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("VOICECTL_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Some(level) = env_parse::<i16>("VOICECTL_REC_LEVEL") {
            self.audio.rec_level = level;
        }

        if let Some(level) = env_parse::<i16>("VOICECTL_STOP_LEVEL") {
            self.audio.stop_level = level;
        }

        if let Some(threshold) = env_parse::<f32>("VOICECTL_SCORE_THRESHOLD") {
            self.recognizer.score_threshold = threshold;
        }

        self
    }

    /// Check the values the recognizer cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |key: &str, message: &str| VoicectlError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.audio.rec_level <= 0 {
            return Err(invalid("audio.rec_level", "must be a positive amplitude"));
        }
        if self.audio.stop_level <= 0 {
            return Err(invalid("audio.stop_level", "must be a positive amplitude"));
        }
        if self.audio.stop_level > self.audio.rec_level {
            return Err(invalid(
                "audio.stop_level",
                "must not be above audio.rec_level",
            ));
        }

        let threshold = self.recognizer.score_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(invalid(
                "recognizer.score_threshold",
                "must be a positive number",
            ));
        }
        if self.recognizer.sloppy_corner == 0 {
            return Err(invalid("recognizer.sloppy_corner", "must be at least 1"));
        }
        if self.recognizer.nbest == 0 {
            return Err(invalid("recognizer.nbest", "must be at least 1"));
        }

        if self.features.channel_mean.len() != defaults::FEATURE_DIM {
            return Err(invalid(
                "features.channel_mean",
                &format!(
                    "expected {} values, got {}",
                    defaults::FEATURE_DIM,
                    self.features.channel_mean.len()
                ),
            ));
        }

        Ok(())
    }

    /// Serialize the effective configuration back to TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voicectl/config.toml on Linux
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(base.join("voicectl").join("config.toml"))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_voicectl_env() {
        remove_env("VOICECTL_AUDIO_DEVICE");
        remove_env("VOICECTL_REC_LEVEL");
        remove_env("VOICECTL_STOP_LEVEL");
        remove_env("VOICECTL_SCORE_THRESHOLD");
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.rec_level, 2000);
        assert_eq!(config.audio.stop_level, 1000);
        assert_eq!(config.audio.open_retry_secs, 10);

        assert_eq!(config.recognizer.score_threshold, 18.0);
        assert_eq!(config.recognizer.adjust_window_width, 90);
        assert_eq!(config.recognizer.sloppy_corner, 4);
        assert_eq!(config.recognizer.nbest, 6);
        assert_eq!(config.recognizer.branch_bound_lookahead, 30);

        assert!(config.features.mean_subtraction);
        assert_eq!(config.features.channel_mean, vec![0.0; 16]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_temp(
            r#"
            [audio]
            device = "hw:0,0"
            rec_level = 3000
            stop_level = 1200

            [recognizer]
            score_threshold = 12.5
            adjust_window_width = 40
            sloppy_corner = 3
            nbest = 4

            [features]
            mean_subtraction = false
            channel_mean = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0,
                            9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.device, Some("hw:0,0".to_string()));
        assert_eq!(config.audio.rec_level, 3000);
        assert_eq!(config.audio.stop_level, 1200);
        assert_eq!(config.recognizer.score_threshold, 12.5);
        assert_eq!(config.recognizer.adjust_window_width, 40);
        assert_eq!(config.recognizer.sloppy_corner, 3);
        assert_eq!(config.recognizer.nbest, 4);
        assert_eq!(config.recognizer.branch_bound_lookahead, 30);
        assert!(!config.features.mean_subtraction);
        assert_eq!(config.features.channel_mean_vector()[15], 16.0);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_temp(
            r#"
            [recognizer]
            score_threshold = 20.0
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.recognizer.score_threshold, 20.0);
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.features, FeatureConfig::default());
    }

    #[test]
    fn test_zero_levels_are_rejected() {
        let temp_file = write_temp(
            r#"
            [audio]
            rec_level = 0
        "#,
        );

        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("audio.rec_level"), "{err}");

        let mut config = Config::default();
        config.audio.stop_level = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stop_level_above_rec_level_is_rejected() {
        let mut config = Config::default();
        config.audio.stop_level = 5000;
        config.audio.rec_level = 4000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("audio.stop_level"));
    }

    #[test]
    fn test_channel_mean_length_is_checked() {
        let mut config = Config::default();
        config.features.channel_mean = vec![0.0; 15];
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for features.channel_mean: expected 16 values, got 15"
        );
    }

    #[test]
    fn test_recognizer_limits_are_checked() {
        let mut config = Config::default();
        config.recognizer.sloppy_corner = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.recognizer.nbest = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.recognizer.score_threshold = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_device() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voicectl_env();

        set_env("VOICECTL_AUDIO_DEVICE", "hw:1,0");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.device, Some("hw:1,0".to_string()));

        clear_voicectl_env();
    }

    #[test]
    fn test_env_override_levels_and_threshold() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voicectl_env();

        set_env("VOICECTL_REC_LEVEL", "4000");
        set_env("VOICECTL_STOP_LEVEL", "1500");
        set_env("VOICECTL_SCORE_THRESHOLD", "9.5");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.rec_level, 4000);
        assert_eq!(config.audio.stop_level, 1500);
        assert_eq!(config.recognizer.score_threshold, 9.5);

        clear_voicectl_env();
    }

    #[test]
    fn test_env_override_empty_or_garbage_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voicectl_env();

        set_env("VOICECTL_AUDIO_DEVICE", "");
        set_env("VOICECTL_REC_LEVEL", "loud");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.rec_level, 2000);

        clear_voicectl_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_temp(
            r#"
            [audio
            device = "broken
        "#,
        );

        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VoicectlError>(),
            Some(VoicectlError::Config(_))
        ));
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_missing_and_unreadable_files_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = Config::load(&missing).unwrap_err();
        match err.downcast_ref::<VoicectlError>() {
            Some(VoicectlError::ConfigFileNotFound { path }) => {
                assert!(path.ends_with("missing.toml"), "{path}")
            }
            other => panic!("expected ConfigFileNotFound, got {other:?}"),
        }

        let binary = dir.path().join("binary.toml");
        std::fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        let err = Config::load(&binary).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VoicectlError>(),
            Some(VoicectlError::ConfigParse { .. })
        ));
        assert!(Config::load_or_default(&binary).is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path().unwrap();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("voicectl/config.toml"), "{path_str}");
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = Config::default();
        config.audio.device = Some("pulse".to_string());
        config.recognizer.nbest = 3;

        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
