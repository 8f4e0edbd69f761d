pub mod linux;
pub mod macos;
pub mod piper;
pub mod print;
pub mod process;
pub mod windows;

use crate::config_loader::Settings;
use crate::error::BackendError;
use crate::host::HostFamily;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

pub use linux::{EspeakBackend, SpdSayBackend};
pub use macos::SayBackend;
pub use piper::PiperBackend;
pub use print::PrintFallback;
pub use windows::WindowsSpeechBackend;

/// Trait that all speech output tiers must implement.
/// The chain walks these in priority order until one returns `Ok`.
pub trait SpeechBackend: Send + Sync {
    /// Returns the unique ID of the backend (e.g., "espeak")
    fn id(&self) -> &'static str;

    /// Whether this tier can run at all on the given host family
    fn applies_to(&self, host: HostFamily) -> bool;

    /// Speaks `text`, giving up after `timeout`
    fn speak(&self, text: &str, timeout: Duration) -> Result<(), BackendError>;

    /// External program this tier depends on, if any
    fn program(&self) -> Option<&str> {
        None
    }
}

lazy_static! {
    // Quotes end the argument in PowerShell/VBScript; backtick and `$` expand inside them.
    static ref UNSAFE_CHARS: Regex = Regex::new(r#"["'`$]"#).unwrap();
}

/// Strips characters that would break an external invocation.
pub fn sanitize(text: &str) -> String {
    UNSAFE_CHARS.replace_all(text, "").into_owned()
}

/// Every tier this crate knows, in priority order, before host filtering.
pub fn all_backends(settings: &Settings) -> Vec<Box<dyn SpeechBackend>> {
    vec![
        Box::new(WindowsSpeechBackend::new()),
        Box::new(SayBackend::new()),
        Box::new(EspeakBackend::new()),
        Box::new(SpdSayBackend::new()),
        Box::new(PiperBackend::new(&settings.piper_binary, &settings.piper_model)),
    ]
}

/// Selects the tiers that apply to `host`, minus any disabled by id.
/// The print fallback is always appended last and cannot be disabled.
pub fn chain_for_host(settings: &Settings, host: HostFamily) -> Vec<Box<dyn SpeechBackend>> {
    let mut chain: Vec<Box<dyn SpeechBackend>> = all_backends(settings)
        .into_iter()
        .filter(|b| b.applies_to(host))
        .filter(|b| !settings.disabled_backends.iter().any(|d| d == b.id()))
        .collect();
    chain.push(Box::new(PrintFallback::stdout()));
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(chain: &[Box<dyn SpeechBackend>]) -> Vec<&'static str> {
        chain.iter().map(|b| b.id()).collect()
    }

    #[test]
    fn sanitize_removes_quotes() {
        assert_eq!(sanitize(r#"say "hi" it's $5 `now`"#), "say hi its 5 now");
        assert_eq!(sanitize("plain text"), "plain text");
    }

    #[test]
    fn linux_chain_order() {
        let settings = Settings::default();
        let chain = chain_for_host(&settings, HostFamily::Posix);
        assert_eq!(ids(&chain), vec!["espeak", "spd-say", "piper", "print"]);
    }

    #[test]
    fn macos_and_windows_chains() {
        let settings = Settings::default();
        assert_eq!(
            ids(&chain_for_host(&settings, HostFamily::MacOs)),
            vec!["say", "piper", "print"]
        );
        assert_eq!(
            ids(&chain_for_host(&settings, HostFamily::Windows)),
            vec!["windows-speech", "piper", "print"]
        );
    }

    #[test]
    fn disabled_backends_are_skipped_but_print_stays() {
        let settings = Settings {
            disabled_backends: vec!["espeak".into(), "piper".into(), "print".into()],
            ..Settings::default()
        };
        let chain = chain_for_host(&settings, HostFamily::Posix);
        assert_eq!(ids(&chain), vec!["spd-say", "print"]);
    }

    #[test]
    fn unknown_host_gets_engine_and_print() {
        let settings = Settings::default();
        assert_eq!(
            ids(&chain_for_host(&settings, HostFamily::Other)),
            vec!["piper", "print"]
        );
    }
}
