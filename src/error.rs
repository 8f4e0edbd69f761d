use std::time::Duration;
use thiserror::Error;

/// Outcome of a single TTS tier that did not produce speech.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend does not apply to this host")]
    Unsupported,
    #[error("backend timed out after {0:?}")]
    TimedOut(Duration),
    #[error("backend exited with status {0:?}")]
    ExitStatus(Option<i32>),
    #[error("backend i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine error: {0}")]
    Engine(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found")]
    NoDevice,
    #[error("no speech before the onset timeout")]
    WaitTimeout,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("capture i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("transcription timed out")]
    TimedOut,
    #[error("speech was not intelligible")]
    Ambiguous,
    #[error("no recognizer available: {0}")]
    Unavailable(String),
    #[error("transcription failed: {0}")]
    Other(String),
}

impl From<std::io::Error> for TranscribeError {
    fn from(e: std::io::Error) -> Self {
        TranscribeError::Other(e.to_string())
    }
}

/// Calibration failed; listening continues with the default sensitivity.
#[derive(Debug, Error)]
#[error("microphone calibration degraded: {0}")]
pub struct CalibrationWarning(pub String);

impl From<CaptureError> for CalibrationWarning {
    fn from(e: CaptureError) -> Self {
        CalibrationWarning(e.to_string())
    }
}
