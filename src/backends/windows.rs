use super::process::run_bounded;
use super::{sanitize, SpeechBackend};
use crate::error::BackendError;
use crate::host::HostFamily;
use std::io::Write;
use std::process::Command;
use std::time::Duration;

/// Native Windows tier.
///
/// Tries PowerShell's `System.Speech` synthesizer first and falls back
/// to a SAPI VBScript run through `cscript` before the chain moves on.
pub struct WindowsSpeechBackend;

impl WindowsSpeechBackend {
    pub fn new() -> Self {
        Self
    }

    fn powershell_script(text: &str) -> String {
        format!(
            "Add-Type -AssemblyName System.Speech; \
             $speak = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
             $speak.Speak(\"{}\")",
            text
        )
    }

    fn vbscript(text: &str) -> String {
        format!(
            "Set sapi = CreateObject(\"sapi.spvoice\")\r\nsapi.Speak \"{}\"\r\n",
            text
        )
    }

    fn speak_powershell(&self, text: &str, timeout: Duration) -> Result<(), BackendError> {
        run_bounded(
            Command::new("powershell")
                .arg("-NoProfile")
                .arg("-Command")
                .arg(Self::powershell_script(text)),
            timeout,
        )
    }

    fn speak_cscript(&self, text: &str, timeout: Duration) -> Result<(), BackendError> {
        let mut script = tempfile::Builder::new()
            .prefix("voxloop-speak")
            .suffix(".vbs")
            .tempfile()?;
        script.write_all(Self::vbscript(text).as_bytes())?;
        script.flush()?;
        // Closed so cscript can open it; deleted when `path` drops
        let path = script.into_temp_path();

        run_bounded(Command::new("cscript").arg("//Nologo").arg(path.as_os_str()), timeout)
    }
}

impl SpeechBackend for WindowsSpeechBackend {
    fn id(&self) -> &'static str {
        "windows-speech"
    }

    fn applies_to(&self, host: HostFamily) -> bool {
        host == HostFamily::Windows
    }

    fn speak(&self, text: &str, timeout: Duration) -> Result<(), BackendError> {
        let text = sanitize(text);
        match self.speak_powershell(&text, timeout) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!("powershell speech failed ({}), trying cscript", e);
                self.speak_cscript(&text, timeout)
            }
        }
    }

    fn program(&self) -> Option<&str> {
        Some("powershell")
    }
}
