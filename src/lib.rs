pub mod backends;
pub mod browser;
pub mod clock;
pub mod config_loader;
pub mod ear;
pub mod engine;
pub mod error;
pub mod host;
pub mod microphone;
pub mod router;
pub mod session;
pub mod transcriber;
pub mod worker;

pub use engine::{AudioOutput, SpeechOutputChain};
pub use ear::{Ear, Heard, Listener};
pub use router::{CommandRouter, Continue, Intent};
pub use session::{AssistantSession, SessionEnd, SessionState};
