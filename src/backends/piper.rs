use super::SpeechBackend;
use crate::error::BackendError;
use crate::host::HostFamily;
use crate::worker::{run_with_deadline, CancelToken, WorkerError};
use rodio::{Decoder, OutputStream, Sink};
use std::io::{Cursor, ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Embedded engine tier: piper renders a WAV, rodio plays it in-process.
pub struct PiperBackend {
    binary_path: String,
    model: String,
    models_dir: PathBuf,
}

impl PiperBackend {
    pub fn new(binary_path: &str, model: &str) -> Self {
        let models_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local/share/piper/models");

        Self {
            binary_path: binary_path.to_string(),
            model: model.to_string(),
            models_dir,
        }
    }

    /// Resolves the configured voice to an `.onnx` file. Accepts either a
    /// path or a bare voice id looked up in the piper models directory.
    fn model_path(&self) -> Option<PathBuf> {
        let direct = PathBuf::from(&self.model);
        if direct.extension().is_some_and(|ext| ext == "onnx") && direct.exists() {
            return Some(direct);
        }
        let onnx = self.models_dir.join(format!("{}.onnx", self.model));
        onnx.exists().then_some(onnx)
    }

    fn synthesize(&self, text: &str, timeout: Duration) -> Result<Vec<u8>, BackendError> {
        let model = self.model_path().ok_or_else(|| {
            BackendError::Unavailable(format!("piper model {} not found", self.model))
        })?;

        // piper writes to a file so a large WAV can never stall on a full pipe
        let output = tempfile::Builder::new()
            .prefix("voxloop-piper")
            .suffix(".wav")
            .tempfile()?;

        let mut child = Command::new(&self.binary_path)
            .arg("-m")
            .arg(&model)
            .arg("--output_file")
            .arg(output.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    BackendError::Unavailable(format!("{} not found", self.binary_path))
                }
                _ => BackendError::Io(e),
            })?;

        // Write text to stdin and close it
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
            stdin.write_all(b"\n")?;
        }

        match child.wait_timeout(timeout)? {
            Some(status) if status.success() => Ok(std::fs::read(output.path())?),
            Some(status) => Err(BackendError::ExitStatus(status.code())),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(BackendError::TimedOut(timeout))
            }
        }
    }
}

/// Plays a WAV buffer on the default output device until it ends or
/// `cancel` fires. The output stream must live on the calling thread.
fn play_wav(wav: Vec<u8>, cancel: CancelToken) -> Result<(), BackendError> {
    let (_stream, handle) = OutputStream::try_default()
        .map_err(|e| BackendError::Unavailable(format!("no audio output: {}", e)))?;
    let sink = Sink::try_new(&handle).map_err(|e| BackendError::Engine(e.to_string()))?;
    let source =
        Decoder::new(Cursor::new(wav)).map_err(|e| BackendError::Engine(e.to_string()))?;

    sink.append(source);
    while !sink.empty() {
        if cancel.is_cancelled() {
            sink.stop();
            return Err(BackendError::Engine("playback cancelled".to_string()));
        }
        thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

impl SpeechBackend for PiperBackend {
    fn id(&self) -> &'static str {
        "piper"
    }

    fn applies_to(&self, _host: HostFamily) -> bool {
        true
    }

    fn speak(&self, text: &str, timeout: Duration) -> Result<(), BackendError> {
        let started = Instant::now();
        let wav = self.synthesize(text, timeout)?;

        let remaining = timeout.saturating_sub(started.elapsed());
        match run_with_deadline(remaining, move |token| play_wav(wav, token)) {
            Ok(result) => result,
            Err(WorkerError::DeadlineExceeded) => Err(BackendError::TimedOut(timeout)),
            Err(WorkerError::Lost) => Err(BackendError::Engine("playback worker lost".into())),
        }
    }

    fn program(&self) -> Option<&str> {
        Some(&self.binary_path)
    }
}
