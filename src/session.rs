use crate::browser::UrlOpener;
use crate::clock::{self, Clock};
use crate::config_loader::Settings;
use crate::ear::Listener;
use crate::engine::AudioOutput;
use crate::router::{CommandRouter, Continue};
use crate::worker::CancelToken;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const SELF_TEST_PHRASES: [&str; 3] = [
    "Hello! I am your voice assistant.",
    "This is a voice test.",
    "If you can hear me, the voice is working!",
];

pub const INTERRUPT_FAREWELL: &str = "Goodbye!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
    Terminated,
}

impl SessionState {
    /// Idle -> Listening -> Processing -> (Speaking)* -> Idle; any state
    /// may terminate or fall back to Idle after a fault, nothing leaves
    /// Terminated.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (_, Idle) => true,
            (Idle, Listening) | (Idle, Speaking) => true,
            (Listening, Processing) => true,
            (Processing, Speaking) | (Speaking, Processing) => true,
            // nested re-listen for a search query
            (Processing, Listening) | (Speaking, Listening) => true,
            (a, b) => a == b,
        }
    }
}

/// Why the run loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ExitRequested,
    Interrupted,
}

struct StateCell(Mutex<SessionState>);

impl StateCell {
    fn get(&self) -> SessionState {
        self.0.lock().map(|s| *s).unwrap_or(SessionState::Terminated)
    }

    fn set(&self, next: SessionState) {
        let mut state = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.can_transition_to(next) {
            warn!("unexpected session transition {:?} -> {:?}", *state, next);
            if *state == SessionState::Terminated {
                return;
            }
        }
        *state = next;
    }
}

/// Marks the session as Speaking for the span of every speak call.
struct TrackedOutput {
    inner: Arc<dyn AudioOutput>,
    state: Arc<StateCell>,
}

impl AudioOutput for TrackedOutput {
    fn speak(&self, text: &str) {
        let previous = self.state.get();
        self.state.set(SessionState::Speaking);
        self.inner.speak(text);
        self.state.set(previous);
    }
}

/// Marks the session as Listening while a (possibly nested) listen runs.
struct TrackedListener {
    inner: Arc<dyn Listener>,
    state: Arc<StateCell>,
}

impl Listener for TrackedListener {
    fn listen(&self) -> crate::ear::Heard {
        self.state.set(SessionState::Listening);
        let heard = self.inner.listen();
        self.state.set(SessionState::Processing);
        heard
    }

    fn calibrate(&self) -> Result<(), crate::error::CalibrationWarning> {
        self.inner.calibrate()
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub self_test: bool,
    pub self_test_pause: Duration,
    pub cycle_pause: Duration,
    pub search_url: String,
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            self_test: settings.enable_self_test,
            self_test_pause: settings.self_test_pause(),
            cycle_pause: settings.cycle_pause(),
            search_url: settings.search_url.clone(),
        }
    }
}

/// Top-level listen/dispatch/speak loop.
pub struct AssistantSession {
    speaker: Arc<dyn AudioOutput>,
    listener: Arc<dyn Listener>,
    router: CommandRouter,
    clock: Arc<dyn Clock>,
    options: SessionOptions,
    state: Arc<StateCell>,
    cancel: CancelToken,
}

impl AssistantSession {
    pub fn new(
        speaker: Arc<dyn AudioOutput>,
        listener: Arc<dyn Listener>,
        browser: Arc<dyn UrlOpener>,
        clock: Arc<dyn Clock>,
        options: SessionOptions,
    ) -> Self {
        let state = Arc::new(StateCell(Mutex::new(SessionState::Idle)));
        let speaker: Arc<dyn AudioOutput> = Arc::new(TrackedOutput {
            inner: speaker,
            state: state.clone(),
        });
        let listener: Arc<dyn Listener> = Arc::new(TrackedListener {
            inner: listener,
            state: state.clone(),
        });
        let router = CommandRouter::new(
            speaker.clone(),
            listener.clone(),
            browser,
            clock.clone(),
            &options.search_url,
        );

        Self {
            speaker,
            listener,
            router,
            clock,
            options,
            state,
            cancel: CancelToken::new(),
        }
    }

    /// Token that requests a clean shutdown at the next loop boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Calibrates the microphone, runs the audio self-test and greets.
    pub fn start(&self) {
        if let Err(warning) = self.listener.calibrate() {
            println!("Microphone issue: {}", warning);
        }
        println!("Voice Assistant Ready!");

        if self.options.self_test {
            self.self_test();
        }
        if self.cancel.is_cancelled() {
            return;
        }
        let now = self.clock.now();
        self.speaker.speak(clock::greeting_for(&now));
    }

    fn self_test(&self) {
        println!("\n{}", "=".repeat(50));
        println!("VOICE TEST - You should hear this!");
        println!("{}", "=".repeat(50));

        for phrase in SELF_TEST_PHRASES {
            if self.cancel.is_cancelled() {
                return;
            }
            println!("Testing: {}", phrase);
            self.speaker.speak(phrase);
            self.pause(self.options.self_test_pause);
        }
    }

    /// `start` followed by the main loop.
    pub fn run(&self) -> SessionEnd {
        self.start();
        self.run_loop()
    }

    pub fn run_loop(&self) -> SessionEnd {
        info!("entering main loop");
        loop {
            if self.cancel.is_cancelled() {
                self.speaker.speak(INTERRUPT_FAREWELL);
                self.state.set(SessionState::Terminated);
                return SessionEnd::Interrupted;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| self.cycle())) {
                Ok(Continue(false)) => {
                    self.state.set(SessionState::Terminated);
                    return SessionEnd::ExitRequested;
                }
                Ok(Continue(true)) => {}
                Err(payload) => {
                    error!("Error: cycle failed: {}", panic_message(payload.as_ref()));
                    self.state.set(SessionState::Idle);
                }
            }

            self.pause(self.options.cycle_pause);
        }
    }

    /// One listen -> dispatch cycle.
    pub fn cycle(&self) -> Continue {
        let heard = self.listener.listen();
        debug!("heard {:?}", heard);
        let next = self.router.handle(heard);
        self.state.set(SessionState::Idle);
        next
    }

    /// Sleeps for `duration`, waking early on cancellation.
    fn pause(&self, duration: Duration) {
        let until = Instant::now() + duration;
        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= until {
                return;
            }
            thread::sleep((until - now).min(Duration::from_millis(50)));
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
