use crate::ear::{AudioClip, AudioSource, CaptureSession};
use crate::error::CaptureError;
use crate::worker::CancelToken;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Root-mean-square energy of a block of samples.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[derive(Debug, PartialEq, Eq)]
pub enum Detection {
    Waiting,
    Recording,
    /// Onset timeout elapsed with no speech.
    TimedOut,
    /// Phrase finished by trailing silence or the phrase cap.
    Done,
}

/// Energy-threshold onset and end-of-phrase detector.
///
/// Time is counted in audio, not wall clock, so the outcome depends only
/// on the samples pushed.
pub struct PhraseDetector {
    threshold: f32,
    onset_timeout: Duration,
    phrase_limit: Duration,
    silence_limit: Duration,
    waited: Duration,
    recorded: Duration,
    trailing_silence: Duration,
    speaking: bool,
    samples: Vec<i16>,
}

impl PhraseDetector {
    pub fn new(
        threshold: f32,
        onset_timeout: Duration,
        phrase_limit: Duration,
        silence_limit: Duration,
    ) -> Self {
        Self {
            threshold,
            onset_timeout,
            phrase_limit,
            silence_limit,
            waited: Duration::ZERO,
            recorded: Duration::ZERO,
            trailing_silence: Duration::ZERO,
            speaking: false,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: &[i16], frame_len: Duration) -> Detection {
        let loud = rms(frame) > self.threshold;

        if !self.speaking {
            if !loud {
                self.waited += frame_len;
                return if self.waited >= self.onset_timeout {
                    Detection::TimedOut
                } else {
                    Detection::Waiting
                };
            }
            self.speaking = true;
        }

        self.samples.extend_from_slice(frame);
        self.recorded += frame_len;
        if loud {
            self.trailing_silence = Duration::ZERO;
        } else {
            self.trailing_silence += frame_len;
        }

        if self.recorded >= self.phrase_limit || self.trailing_silence >= self.silence_limit {
            Detection::Done
        } else {
            Detection::Recording
        }
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Default cpal input device.
pub struct Microphone {
    silence_limit: Duration,
}

impl Microphone {
    pub fn new(silence_limit: Duration) -> Self {
        Self { silence_limit }
    }
}

impl AudioSource for Microphone {
    fn open(&self) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::Stream(format!("Error getting config: {}", e)))?;

        let channels = config.channels().max(1) as usize;
        let sample_rate = config.sample_rate();
        info!("input config: {} Hz, {} channel(s)", sample_rate, channels);

        // Two seconds of slack between the callback and the reader
        let rb = HeapRb::<i16>::new(sample_rate as usize * 2);
        let (mut producer, consumer) = rb.split();

        let err_fn = |err| tracing::error!("an error occurred on stream: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.config(),
                move |data: &[f32], _: &_| {
                    for frame in data.chunks(channels) {
                        let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                        let _ = producer.try_push((mono.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                    }
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.config(),
                move |data: &[i16], _: &_| {
                    for frame in data.chunks(channels) {
                        let mono = frame.iter().map(|&s| s as i32).sum::<i32>() / frame.len() as i32;
                        let _ = producer.try_push(mono as i16);
                    }
                },
                err_fn,
                None,
            ),
            other => {
                return Err(CaptureError::Stream(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| CaptureError::Stream(format!("Error building stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| CaptureError::Stream(format!("Error playing stream: {}", e)))?;

        Ok(Box::new(CpalSession {
            _stream: stream,
            consumer,
            sample_rate,
            silence_limit: self.silence_limit,
        }))
    }
}

/// Live input stream; the device is released when this drops.
struct CpalSession {
    _stream: cpal::Stream,
    consumer: HeapCons<i16>,
    sample_rate: u32,
    silence_limit: Duration,
}

// 30 ms frames
const FRAME_MS: u64 = 30;

impl CpalSession {
    fn frame_len(&self) -> usize {
        (self.sample_rate as usize * FRAME_MS as usize / 1000).max(1)
    }

    /// Fills `frame` completely, or fails once `deadline` passes.
    fn read_frame(&mut self, frame: &mut [i16], deadline: Instant) -> Result<(), CaptureError> {
        let mut filled = 0;
        while filled < frame.len() {
            filled += self.consumer.pop_slice(&mut frame[filled..]);
            if filled < frame.len() {
                if Instant::now() >= deadline {
                    return Err(CaptureError::Stream("input device stopped delivering audio".into()));
                }
                thread::sleep(Duration::from_millis(5));
            }
        }
        Ok(())
    }
}

impl CaptureSession for CpalSession {
    fn measure_ambient(&mut self, duration: Duration) -> Result<f32, CaptureError> {
        let mut frame = vec![0i16; self.frame_len()];
        let frames = (duration.as_millis() as u64 / FRAME_MS).max(1);
        let deadline = Instant::now() + duration * 2 + Duration::from_millis(500);

        let mut sum = 0.0f64;
        for _ in 0..frames {
            self.read_frame(&mut frame, deadline)?;
            sum += rms(&frame) as f64;
        }
        Ok((sum / frames as f64) as f32)
    }

    fn record_phrase(
        &mut self,
        threshold: f32,
        onset_timeout: Duration,
        phrase_limit: Duration,
        cancel: &CancelToken,
    ) -> Result<AudioClip, CaptureError> {
        let mut detector =
            PhraseDetector::new(threshold, onset_timeout, phrase_limit, self.silence_limit);
        let mut frame = vec![0i16; self.frame_len()];
        let frame_len = Duration::from_millis(FRAME_MS);
        let deadline = Instant::now() + onset_timeout + phrase_limit + Duration::from_secs(1);

        loop {
            if cancel.is_cancelled() {
                return Err(CaptureError::Stream("capture cancelled".into()));
            }
            self.read_frame(&mut frame, deadline)?;
            match detector.push(&frame, frame_len) {
                Detection::Waiting | Detection::Recording => {}
                Detection::TimedOut => return Err(CaptureError::WaitTimeout),
                Detection::Done => break,
            }
        }

        Ok(AudioClip {
            samples: detector.into_samples(),
            sample_rate: self.sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(30);

    fn detector() -> PhraseDetector {
        PhraseDetector::new(
            300.0,
            Duration::from_millis(90),
            Duration::from_millis(300),
            Duration::from_millis(60),
        )
    }

    #[test]
    fn rms_of_constant_signal() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[500, -500, 500, -500]), 500.0);
    }

    #[test]
    fn quiet_input_times_out() {
        let mut d = detector();
        let quiet = [10i16; 480];
        assert_eq!(d.push(&quiet, FRAME), Detection::Waiting);
        assert_eq!(d.push(&quiet, FRAME), Detection::Waiting);
        assert_eq!(d.push(&quiet, FRAME), Detection::TimedOut);
    }

    #[test]
    fn phrase_ends_on_trailing_silence() {
        let mut d = detector();
        let loud = [2000i16; 480];
        let quiet = [10i16; 480];
        assert_eq!(d.push(&quiet, FRAME), Detection::Waiting);
        assert_eq!(d.push(&loud, FRAME), Detection::Recording);
        assert_eq!(d.push(&quiet, FRAME), Detection::Recording);
        assert_eq!(d.push(&quiet, FRAME), Detection::Done);
        // leading silence is not kept
        assert_eq!(d.into_samples().len(), 480 * 3);
    }

    #[test]
    fn phrase_cap_stops_continuous_speech() {
        let mut d = detector();
        let loud = [2000i16; 480];
        let mut result = Detection::Waiting;
        let mut frames = 0;
        while result != Detection::Done {
            result = d.push(&loud, FRAME);
            frames += 1;
            assert!(frames <= 10, "phrase cap never reached");
        }
        assert_eq!(frames, 10);
    }
}
