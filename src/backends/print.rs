use super::SpeechBackend;
use crate::error::BackendError;
use crate::host::HostFamily;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Terminal tier: writes `[SPEAK]: <text>`. Never fails.
pub struct PrintFallback {
    out: Arc<Mutex<dyn Write + Send>>,
}

impl PrintFallback {
    pub fn stdout() -> Self {
        Self::with_writer(Arc::new(Mutex::new(std::io::stdout())))
    }

    pub fn with_writer(out: Arc<Mutex<dyn Write + Send>>) -> Self {
        Self { out }
    }
}

impl SpeechBackend for PrintFallback {
    fn id(&self) -> &'static str {
        "print"
    }

    fn applies_to(&self, _host: HostFamily) -> bool {
        true
    }

    fn speak(&self, text: &str, _timeout: Duration) -> Result<(), BackendError> {
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A closed stdout has nowhere left to report to
        let _ = writeln!(out, "[SPEAK]: {}", text);
        let _ = out.flush();
        Ok(())
    }
}
