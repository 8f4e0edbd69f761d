use super::process::run_bounded;
use super::{sanitize, SpeechBackend};
use crate::error::BackendError;
use crate::host::HostFamily;
use std::process::Command;
use std::time::Duration;

/// Primary posix tier: `espeak <text>`.
pub struct EspeakBackend {
    program: String,
}

impl EspeakBackend {
    pub fn new() -> Self {
        Self {
            program: "espeak".to_string(),
        }
    }
}

impl SpeechBackend for EspeakBackend {
    fn id(&self) -> &'static str {
        "espeak"
    }

    fn applies_to(&self, host: HostFamily) -> bool {
        host == HostFamily::Posix
    }

    fn speak(&self, text: &str, timeout: Duration) -> Result<(), BackendError> {
        run_bounded(Command::new(&self.program).arg(sanitize(text)), timeout)
    }

    fn program(&self) -> Option<&str> {
        Some(&self.program)
    }
}

/// Secondary posix tier: speech-dispatcher's `spd-say`.
pub struct SpdSayBackend {
    program: String,
}

impl SpdSayBackend {
    pub fn new() -> Self {
        Self {
            program: "spd-say".to_string(),
        }
    }
}

impl SpeechBackend for SpdSayBackend {
    fn id(&self) -> &'static str {
        "spd-say"
    }

    fn applies_to(&self, host: HostFamily) -> bool {
        host == HostFamily::Posix
    }

    fn speak(&self, text: &str, timeout: Duration) -> Result<(), BackendError> {
        // --wait keeps the call blocking until speech ends
        run_bounded(
            Command::new(&self.program).arg("--wait").arg(sanitize(text)),
            timeout,
        )
    }

    fn program(&self) -> Option<&str> {
        Some(&self.program)
    }
}
