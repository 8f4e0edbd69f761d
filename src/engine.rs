use crate::backends::{self, PrintFallback, SpeechBackend};
use crate::config_loader::Settings;
use crate::host::HostFamily;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything the assistant can talk through. Speaking never fails
/// observably; implementations swallow their own errors.
pub trait AudioOutput: Send + Sync {
    fn speak(&self, text: &str);
}

/// Ordered TTS tiers, walked until one succeeds.
///
/// The last tier is always the print fallback, so `speak` produces
/// output on some channel no matter which backends are missing.
pub struct SpeechOutputChain {
    backends: Vec<Box<dyn SpeechBackend>>,
    timeout: Duration,
}

impl SpeechOutputChain {
    /// Builds a chain from `backends`, appending a stdout print fallback
    /// unless the list already ends with one.
    pub fn new(backends: Vec<Box<dyn SpeechBackend>>, timeout: Duration) -> Self {
        Self::with_fallback(backends, timeout, PrintFallback::stdout())
    }

    pub fn with_fallback(
        mut backends: Vec<Box<dyn SpeechBackend>>,
        timeout: Duration,
        fallback: PrintFallback,
    ) -> Self {
        if backends.last().map(|b| b.id()) != Some(fallback.id()) {
            backends.push(Box::new(fallback));
        }
        Self { backends, timeout }
    }

    /// The chain for this host, built once at startup.
    pub fn from_settings(settings: &Settings, host: HostFamily) -> Self {
        Self::new(
            backends::chain_for_host(settings, host),
            settings.tts_timeout(),
        )
    }

    pub fn print_only() -> Self {
        Self::new(Vec::new(), Duration::from_secs(1))
    }

    pub fn tiers(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.id()).collect()
    }

    /// Speaks through the first tier that succeeds and returns its id.
    /// `None` only if every tier, the fallback included, failed.
    pub fn deliver(&self, text: &str) -> Option<&'static str> {
        for backend in &self.backends {
            match backend.speak(text, self.timeout) {
                Ok(()) => {
                    debug!("spoke via {}", backend.id());
                    return Some(backend.id());
                }
                Err(e) => debug!("{} failed: {}", backend.id(), e),
            }
        }
        warn!("every speech tier failed for {:?}", text);
        None
    }
}

impl AudioOutput for SpeechOutputChain {
    fn speak(&self, text: &str) {
        println!("Assistant: {}", text);
        self.deliver(text);
    }
}
