use super::process::run_bounded;
use super::{sanitize, SpeechBackend};
use crate::error::BackendError;
use crate::host::HostFamily;
use std::process::Command;
use std::time::Duration;

/// Darwin's built-in `say`.
pub struct SayBackend;

impl SayBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SpeechBackend for SayBackend {
    fn id(&self) -> &'static str {
        "say"
    }

    fn applies_to(&self, host: HostFamily) -> bool {
        host == HostFamily::MacOs
    }

    fn speak(&self, text: &str, timeout: Duration) -> Result<(), BackendError> {
        run_bounded(Command::new("say").arg(sanitize(text)), timeout)
    }

    fn program(&self) -> Option<&str> {
        Some("say")
    }
}
