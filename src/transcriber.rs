use crate::backends::process::run_bounded;
use crate::ear::{AudioClip, Transcriber};
use crate::error::{BackendError, TranscribeError};
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::debug;

/// Recognizer that shells out to `vosk-transcriber` and/or `whisper`.
pub struct CommandTranscriber {
    prefer_vosk: bool,
    whisper_model: String,
}

impl CommandTranscriber {
    /// `backend` is "vosk" (vosk, then whisper) or "whisper" (whisper only).
    pub fn new(backend: &str, whisper_model: &str) -> Self {
        Self {
            prefer_vosk: !backend.eq_ignore_ascii_case("whisper"),
            whisper_model: whisper_model.to_string(),
        }
    }

    fn vosk(&self, wav: &Path, dir: &Path, timeout: Duration) -> Result<String, TranscribeError> {
        let txt = dir.join("speech.txt");
        run_bounded(
            Command::new("vosk-transcriber")
                .arg("-i")
                .arg(wav)
                .arg("-o")
                .arg(&txt),
            timeout,
        )
        .map_err(map_backend_error)?;
        Ok(std::fs::read_to_string(txt)?)
    }

    fn whisper(&self, wav: &Path, dir: &Path, timeout: Duration) -> Result<String, TranscribeError> {
        run_bounded(
            Command::new("whisper")
                .arg(wav)
                .arg("--model")
                .arg(&self.whisper_model)
                .arg("--output_format")
                .arg("txt")
                .arg("--output_dir")
                .arg(dir),
            timeout,
        )
        .map_err(map_backend_error)?;
        // whisper names its output after the input stem
        Ok(std::fs::read_to_string(wav.with_extension("txt"))?)
    }
}

fn map_backend_error(e: BackendError) -> TranscribeError {
    match e {
        BackendError::TimedOut(_) => TranscribeError::TimedOut,
        BackendError::Unavailable(msg) => TranscribeError::Unavailable(msg),
        other => TranscribeError::Other(other.to_string()),
    }
}

/// Writes `clip` as a 16-bit mono WAV.
pub fn write_wav(clip: &AudioClip, path: &Path) -> Result<(), TranscribeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| TranscribeError::Other(e.to_string()))?;
    for &sample in &clip.samples {
        writer
            .write_sample(sample)
            .map_err(|e| TranscribeError::Other(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| TranscribeError::Other(e.to_string()))
}

fn non_empty(text: String) -> Result<String, TranscribeError> {
    let text = text.trim().to_string();
    if text.is_empty() {
        Err(TranscribeError::Ambiguous)
    } else {
        Ok(text)
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, clip: &AudioClip, timeout: Duration) -> Result<String, TranscribeError> {
        let dir = tempfile::tempdir()?;
        let wav = dir.path().join("speech.wav");
        write_wav(clip, &wav)?;

        let started = Instant::now();
        if self.prefer_vosk {
            match self.vosk(&wav, dir.path(), timeout) {
                Ok(text) => return non_empty(text),
                Err(TranscribeError::TimedOut) => return Err(TranscribeError::TimedOut),
                Err(e) => debug!("vosk unavailable ({}), trying whisper", e),
            }
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(TranscribeError::TimedOut);
        }
        match self.whisper(&wav, dir.path(), remaining) {
            Ok(text) => non_empty(text),
            Err(TranscribeError::Unavailable(_)) => Err(TranscribeError::Unavailable(
                "install vosk-transcriber (pip install vosk) or openai-whisper".to_string(),
            )),
            Err(e) => Err(e),
        }
    }
}
