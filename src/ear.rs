use crate::config_loader::Settings;
use crate::error::{CalibrationWarning, CaptureError, TranscribeError};
use crate::worker::{run_with_deadline, CancelToken, WorkerError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Mono 16-bit PCM captured during one listen call.
#[derive(Debug, Clone, Default)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// An input device that can be opened for the span of one listen call.
pub trait AudioSource: Send + Sync {
    /// Acquires the device. Dropping the returned session releases it.
    fn open(&self) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

pub trait CaptureSession {
    /// Samples ambient noise for `duration`, returning its RMS energy.
    fn measure_ambient(&mut self, duration: Duration) -> Result<f32, CaptureError>;

    /// Waits up to `onset_timeout` for energy above `threshold`, then
    /// records until silence or `phrase_limit`.
    fn record_phrase(
        &mut self,
        threshold: f32,
        onset_timeout: Duration,
        phrase_limit: Duration,
        cancel: &CancelToken,
    ) -> Result<AudioClip, CaptureError>;
}

/// Speech-to-text collaborator.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, clip: &AudioClip, timeout: Duration) -> Result<String, TranscribeError>;
}

/// Result of one bounded listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    /// Lowercased transcription.
    Utterance(String),
    /// No speech before the onset timeout.
    Silence,
    /// Audio was captured but could not be understood.
    Unintelligible,
    /// Device or recognizer failure, already logged.
    Failed(String),
}

pub trait Listener: Send + Sync {
    fn listen(&self) -> Heard;

    /// One-time ambient calibration before the first listen.
    fn calibrate(&self) -> Result<(), CalibrationWarning> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ListenTimings {
    pub calibration: Duration,
    pub recalibration: Duration,
    pub onset_timeout: Duration,
    pub phrase_limit: Duration,
    pub transcribe_timeout: Duration,
}

impl ListenTimings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            calibration: Duration::from_secs_f32(settings.calibration_secs),
            recalibration: Duration::from_secs_f32(settings.recalibration_secs),
            onset_timeout: Duration::from_secs_f32(settings.listen_timeout_secs),
            phrase_limit: Duration::from_secs_f32(settings.phrase_limit_secs),
            transcribe_timeout: Duration::from_secs(settings.transcribe_timeout_secs),
        }
    }
}

impl Default for ListenTimings {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Onset threshold for a measured ambient level. Never drops below the
/// configured floor in a silent room.
fn threshold_for(ambient: f32, multiplier: f32, floor: f32) -> f32 {
    (ambient * multiplier).max(floor)
}

// Slack on top of the capture budget before the worker is abandoned.
const WORKER_GRACE: Duration = Duration::from_secs(2);

/// Microphone plus recognizer: calibrates once, then performs bounded
/// listen-and-transcribe cycles that never propagate a fault.
pub struct Ear {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    timings: ListenTimings,
    default_threshold: f32,
    multiplier: f32,
    threshold: Mutex<f32>,
}

impl Ear {
    pub fn new(
        source: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        settings: &Settings,
    ) -> Self {
        Self::with_timings(
            source,
            transcriber,
            ListenTimings::from_settings(settings),
            settings.energy_threshold,
            settings.energy_multiplier,
        )
    }

    pub fn with_timings(
        source: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        timings: ListenTimings,
        default_threshold: f32,
        multiplier: f32,
    ) -> Self {
        Self {
            source,
            transcriber,
            timings,
            default_threshold,
            multiplier,
            threshold: Mutex::new(default_threshold),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.lock().map(|t| *t).unwrap_or(self.default_threshold)
    }

    fn adopt_ambient(&self, ambient: f32) {
        let threshold = threshold_for(ambient, self.multiplier, self.default_threshold);
        if let Ok(mut t) = self.threshold.lock() {
            *t = threshold;
        }
        debug!("energy threshold now {:.1} (ambient {:.1})", threshold, ambient);
    }

    fn capture(&self) -> Result<AudioClip, CaptureError> {
        let source = self.source.clone();
        let timings = self.timings.clone();
        let previous = self.threshold();
        let (multiplier, floor) = (self.multiplier, self.default_threshold);
        let budget = timings.recalibration + timings.onset_timeout + timings.phrase_limit;

        // The fresh ambient reading comes back even when recording fails
        let job = move |token: CancelToken| -> (Option<f32>, Result<AudioClip, CaptureError>) {
            // Scoped: the device is released when `session` drops
            let mut session = match source.open() {
                Ok(session) => session,
                Err(e) => return (None, Err(e)),
            };
            let ambient = if timings.recalibration.is_zero() {
                None
            } else {
                match session.measure_ambient(timings.recalibration) {
                    Ok(ambient) => Some(ambient),
                    Err(e) => {
                        debug!("recalibration skipped: {}", e);
                        None
                    }
                }
            };
            let threshold = ambient
                .map(|a| threshold_for(a, multiplier, floor))
                .unwrap_or(previous);
            let clip = session.record_phrase(
                threshold,
                timings.onset_timeout,
                timings.phrase_limit,
                &token,
            );
            (ambient, clip)
        };

        match run_with_deadline(budget + WORKER_GRACE, job) {
            Ok((ambient, clip)) => {
                if let Some(ambient) = ambient {
                    self.adopt_ambient(ambient);
                }
                clip
            }
            Err(WorkerError::DeadlineExceeded) => {
                warn!("capture exceeded {:?}, giving up on this cycle", budget);
                Err(CaptureError::WaitTimeout)
            }
            Err(WorkerError::Lost) => Err(CaptureError::Stream("capture worker lost".into())),
        }
    }

    fn transcribe(&self, clip: AudioClip) -> Result<String, TranscribeError> {
        let transcriber = self.transcriber.clone();
        let timeout = self.timings.transcribe_timeout;
        match run_with_deadline(timeout + WORKER_GRACE, move |_| {
            transcriber.transcribe(&clip, timeout)
        }) {
            Ok(result) => result,
            Err(WorkerError::DeadlineExceeded) => Err(TranscribeError::TimedOut),
            Err(WorkerError::Lost) => Err(TranscribeError::Other("recognizer worker lost".into())),
        }
    }
}

impl Listener for Ear {
    /// Samples ambient noise once at startup. Failure leaves the default
    /// sensitivity in place.
    fn calibrate(&self) -> Result<(), CalibrationWarning> {
        println!("Calibrating microphone...");
        let result = self
            .source
            .open()
            .and_then(|mut session| session.measure_ambient(self.timings.calibration));

        match result {
            Ok(ambient) => {
                self.adopt_ambient(ambient);
                println!("Microphone calibrated!");
                Ok(())
            }
            Err(e) => {
                let warning = CalibrationWarning::from(e);
                warn!("{}", warning);
                Err(warning)
            }
        }
    }

    fn listen(&self) -> Heard {
        println!("Listening... (Speak now)");
        let clip = match self.capture() {
            Ok(clip) => clip,
            Err(CaptureError::WaitTimeout) => {
                debug!("no speech before onset timeout");
                return Heard::Silence;
            }
            Err(e) => {
                error!("Error: {}", e);
                return Heard::Failed(e.to_string());
            }
        };

        println!("Processing...");
        info!("captured {:?} of audio", clip.duration());
        match self.transcribe(clip) {
            Ok(text) => {
                let text = text.trim().to_lowercase();
                if text.is_empty() {
                    return Heard::Unintelligible;
                }
                println!("You said: {}", text);
                Heard::Utterance(text)
            }
            Err(TranscribeError::Ambiguous) => Heard::Unintelligible,
            Err(e) => {
                error!("Error: {}", e);
                Heard::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Clone, Copy)]
    enum Script {
        Speech,
        Silence,
        Broken,
        Hang,
    }

    /// Hands out one ambient level per open; the last one repeats.
    struct FakeSource {
        script: Script,
        ambients: Mutex<Vec<f32>>,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        last_threshold: Arc<Mutex<f32>>,
    }

    struct FakeSession {
        script: Script,
        ambient: f32,
        released: Arc<AtomicUsize>,
        last_threshold: Arc<Mutex<f32>>,
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl AudioSource for FakeSource {
        fn open(&self) -> Result<Box<dyn CaptureSession>, CaptureError> {
            if let Script::Broken = self.script {
                return Err(CaptureError::NoDevice);
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let ambient = {
                let mut ambients = self.ambients.lock().unwrap();
                if ambients.len() > 1 {
                    ambients.remove(0)
                } else {
                    ambients[0]
                }
            };
            Ok(Box::new(FakeSession {
                script: self.script,
                ambient,
                released: self.released.clone(),
                last_threshold: self.last_threshold.clone(),
            }))
        }
    }

    impl CaptureSession for FakeSession {
        fn measure_ambient(&mut self, _duration: Duration) -> Result<f32, CaptureError> {
            Ok(self.ambient)
        }

        fn record_phrase(
            &mut self,
            threshold: f32,
            _onset: Duration,
            _limit: Duration,
            cancel: &CancelToken,
        ) -> Result<AudioClip, CaptureError> {
            *self.last_threshold.lock().unwrap() = threshold;
            match self.script {
                Script::Speech => Ok(AudioClip {
                    samples: vec![1000; 1600],
                    sample_rate: 16000,
                }),
                Script::Silence => Err(CaptureError::WaitTimeout),
                Script::Broken => Err(CaptureError::NoDevice),
                Script::Hang => {
                    while !cancel.is_cancelled() {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(CaptureError::Stream("cancelled".into()))
                }
            }
        }
    }

    struct FixedTranscriber(Result<String, TranscribeError>);

    impl Transcriber for FixedTranscriber {
        fn transcribe(&self, _clip: &AudioClip, _t: Duration) -> Result<String, TranscribeError> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(TranscribeError::Ambiguous) => Err(TranscribeError::Ambiguous),
                Err(TranscribeError::TimedOut) => Err(TranscribeError::TimedOut),
                Err(e) => Err(TranscribeError::Other(e.to_string())),
            }
        }
    }

    struct Rig {
        ear: Ear,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        last_threshold: Arc<Mutex<f32>>,
    }

    fn make_rig(script: Script, transcript: Result<String, TranscribeError>) -> Rig {
        make_rig_with_ambients(script, transcript, &[400.0])
    }

    fn make_rig_with_ambients(
        script: Script,
        transcript: Result<String, TranscribeError>,
        ambients: &[f32],
    ) -> Rig {
        let opened = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let last_threshold = Arc::new(Mutex::new(0.0));
        let source = FakeSource {
            script,
            ambients: Mutex::new(ambients.to_vec()),
            opened: opened.clone(),
            released: released.clone(),
            last_threshold: last_threshold.clone(),
        };
        let timings = ListenTimings {
            calibration: Duration::from_millis(10),
            recalibration: Duration::from_millis(5),
            onset_timeout: Duration::from_millis(50),
            phrase_limit: Duration::from_millis(80),
            transcribe_timeout: Duration::from_millis(100),
        };
        let ear = Ear::with_timings(
            Arc::new(source),
            Arc::new(FixedTranscriber(transcript)),
            timings,
            300.0,
            1.5,
        );
        Rig {
            ear,
            opened,
            released,
            last_threshold,
        }
    }

    #[test]
    fn utterance_is_lowercased_and_trimmed() {
        let rig = make_rig(Script::Speech, Ok("  What Time Is It ".into()));
        assert_eq!(rig.ear.listen(), Heard::Utterance("what time is it".into()));
    }

    #[test]
    fn silence_is_empty() {
        let rig = make_rig(Script::Silence, Ok("never".into()));
        assert_eq!(rig.ear.listen(), Heard::Silence);
    }

    #[test]
    fn ambiguous_and_blank_transcripts_are_unintelligible() {
        let rig = make_rig(Script::Speech, Err(TranscribeError::Ambiguous));
        assert_eq!(rig.ear.listen(), Heard::Unintelligible);
        let rig = make_rig(Script::Speech, Ok("   ".into()));
        assert_eq!(rig.ear.listen(), Heard::Unintelligible);
    }

    #[test]
    fn recognizer_errors_are_contained() {
        let rig = make_rig(Script::Speech, Err(TranscribeError::TimedOut));
        assert!(matches!(rig.ear.listen(), Heard::Failed(_)));
        let rig = make_rig(Script::Broken, Ok("x".into()));
        assert!(matches!(rig.ear.listen(), Heard::Failed(_)));
    }

    #[test]
    fn device_is_released_every_cycle() {
        let rig = make_rig(Script::Speech, Ok("hello".into()));
        rig.ear.listen();
        let rig_silent = make_rig(Script::Silence, Ok("x".into()));
        rig_silent.ear.listen();
        assert_eq!(rig.opened.load(Ordering::SeqCst), 1);
        assert_eq!(rig.released.load(Ordering::SeqCst), 1);
        assert_eq!(rig_silent.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hung_capture_hits_the_deadline() {
        let rig = make_rig(Script::Hang, Ok("x".into()));
        let started = std::time::Instant::now();
        assert_eq!(rig.ear.listen(), Heard::Silence);
        assert!(started.elapsed() < Duration::from_secs(4));
        // the worker notices cancellation and drops its session
        thread::sleep(Duration::from_millis(100));
        assert_eq!(rig.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn calibration_raises_threshold() {
        let rig = make_rig(Script::Speech, Ok("hi".into()));
        assert!(rig.ear.calibrate().is_ok());
        assert_eq!(rig.ear.threshold(), 600.0);
        rig.ear.listen();
        assert_eq!(*rig.last_threshold.lock().unwrap(), 600.0);
    }

    #[test]
    fn recalibration_applies_to_the_same_cycle() {
        let rig = make_rig_with_ambients(Script::Speech, Ok("hi".into()), &[100.0, 1000.0]);
        assert!(rig.ear.calibrate().is_ok());
        assert_eq!(rig.ear.threshold(), 300.0);

        rig.ear.listen();
        assert_eq!(*rig.last_threshold.lock().unwrap(), 1500.0);
        assert_eq!(rig.ear.threshold(), 1500.0);
    }

    #[test]
    fn quiet_room_recovers_even_when_nothing_is_heard() {
        let rig = make_rig_with_ambients(Script::Silence, Ok("x".into()), &[3000.0, 100.0]);
        assert!(rig.ear.calibrate().is_ok());
        assert_eq!(rig.ear.threshold(), 4500.0);

        assert_eq!(rig.ear.listen(), Heard::Silence);
        assert_eq!(*rig.last_threshold.lock().unwrap(), 300.0);
        assert_eq!(rig.ear.threshold(), 300.0);
    }

    #[test]
    fn failed_calibration_keeps_default() {
        let rig = make_rig(Script::Broken, Ok("hi".into()));
        assert!(rig.ear.calibrate().is_err());
        assert_eq!(rig.ear.threshold(), 300.0);
    }
}
