use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // TTS
    pub tts_timeout_secs: u64,
    pub piper_binary: String,
    pub piper_model: String,
    pub disabled_backends: Vec<String>, // backend ids, e.g. ["spd-say"]
    // Microphone
    pub calibration_secs: f32,
    pub recalibration_secs: f32,
    pub listen_timeout_secs: f32, // wait for speech onset
    pub phrase_limit_secs: f32,   // cap on one phrase
    pub energy_threshold: f32,    // default sensitivity, i16-scale RMS
    pub energy_multiplier: f32,   // threshold = ambient * multiplier
    pub silence_duration_ms: u64,
    // STT
    pub stt_backend: String, // "vosk" or "whisper"
    pub whisper_model: String,
    pub transcribe_timeout_secs: u64,
    // Session
    pub cycle_pause_ms: u64,
    pub self_test_pause_ms: u64,
    pub enable_self_test: bool,
    pub search_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tts_timeout_secs: 10,
            piper_binary: "piper".to_string(),
            piper_model: "en_US-lessac-medium".to_string(),
            disabled_backends: Vec::new(),
            calibration_secs: 2.0,
            recalibration_secs: 0.5,
            listen_timeout_secs: 5.0,
            phrase_limit_secs: 8.0,
            energy_threshold: 300.0,
            energy_multiplier: 1.5,
            silence_duration_ms: 800,
            stt_backend: "vosk".to_string(),
            whisper_model: "tiny".to_string(),
            transcribe_timeout_secs: 15,
            cycle_pause_ms: 1000,
            self_test_pause_ms: 2000,
            enable_self_test: true,
            search_url: "https://www.google.com/search?q=".to_string(),
        }
    }
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> =
        RwLock::new(Settings::new().unwrap_or_else(|e| {
            tracing::warn!("Invalid settings ({}), using defaults", e);
            Settings::default()
        }));
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Loads defaults, then the optional config files, then `extra`
    /// (required when given), then `VOXLOOP_*` environment variables.
    pub fn load(extra: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            // TTS defaults
            .set_default("tts_timeout_secs", defaults.tts_timeout_secs)?
            .set_default("piper_binary", defaults.piper_binary)?
            .set_default("piper_model", defaults.piper_model)?
            .set_default("disabled_backends", Vec::<String>::new())?
            // Microphone defaults
            .set_default("calibration_secs", defaults.calibration_secs as f64)?
            .set_default("recalibration_secs", defaults.recalibration_secs as f64)?
            .set_default("listen_timeout_secs", defaults.listen_timeout_secs as f64)?
            .set_default("phrase_limit_secs", defaults.phrase_limit_secs as f64)?
            .set_default("energy_threshold", defaults.energy_threshold as f64)?
            .set_default("energy_multiplier", defaults.energy_multiplier as f64)?
            .set_default("silence_duration_ms", defaults.silence_duration_ms)?
            // STT defaults
            .set_default("stt_backend", defaults.stt_backend)?
            .set_default("whisper_model", defaults.whisper_model)?
            .set_default("transcribe_timeout_secs", defaults.transcribe_timeout_secs)?
            // Session defaults
            .set_default("cycle_pause_ms", defaults.cycle_pause_ms)?
            .set_default("self_test_pause_ms", defaults.self_test_pause_ms)?
            .set_default("enable_self_test", defaults.enable_self_test)?
            .set_default("search_url", defaults.search_url)?
            // Merge with local config file (if exists)
            .add_source(File::with_name("Assistant").required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.config/voxloop/Assistant",
                    std::env::var("HOME").unwrap_or_default()
                ))
                .required(false),
            );

        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Merge with environment variables (e.g. VOXLOOP_TTS_TIMEOUT_SECS)
        builder = builder.add_source(
            config::Environment::with_prefix("VOXLOOP")
                .list_separator(",")
                .with_list_parse_key("disabled_backends")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.tts_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "tts_timeout_secs must be greater than 0".to_string(),
            ));
        }
        let durations = [
            ("calibration_secs", self.calibration_secs),
            ("recalibration_secs", self.recalibration_secs),
            ("listen_timeout_secs", self.listen_timeout_secs),
            ("phrase_limit_secs", self.phrase_limit_secs),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(config::ConfigError::Message(format!(
                    "Invalid {}: {}. Must be a non-negative number of seconds",
                    name, value
                )));
            }
        }
        if self.phrase_limit_secs < self.listen_timeout_secs {
            return Err(config::ConfigError::Message(format!(
                "phrase_limit_secs ({}) must not be shorter than listen_timeout_secs ({})",
                self.phrase_limit_secs, self.listen_timeout_secs
            )));
        }
        if self.energy_multiplier < 1.0 {
            return Err(config::ConfigError::Message(format!(
                "Invalid energy_multiplier: {}. Must be at least 1.0",
                self.energy_multiplier
            )));
        }
        if !self.search_url.starts_with("http://") && !self.search_url.starts_with("https://") {
            return Err(config::ConfigError::Message(format!(
                "search_url must be an http(s) URL, got {}",
                self.search_url
            )));
        }
        Ok(())
    }

    pub fn tts_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_timeout_secs)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_millis(self.cycle_pause_ms)
    }

    pub fn self_test_pause(&self) -> Duration {
        Duration::from_millis(self.self_test_pause_ms)
    }
}
