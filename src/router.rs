use crate::browser::UrlOpener;
use crate::clock::{self, Clock};
use crate::ear::{Heard, Listener};
use crate::engine::AudioOutput;
use std::sync::Arc;
use tracing::debug;

pub const FAREWELL: &str = "Goodbye! Have a great day!";
pub const GREETING_REPLY: &str = "Hello! How can I assist you today?";
pub const HOW_ARE_YOU_REPLY: &str = "I'm doing great! Thank you for asking!";
pub const HELP_REPLY: &str = "I can tell you the time, date, search the web, or just chat with you!";
pub const UNKNOWN_REPLY: &str = "I'm not sure about that. Try asking for time, date, or search.";
pub const SEARCH_PROMPT: &str = "What would you like me to search for?";
pub const NOT_UNDERSTOOD: &str = "Sorry, I didn't understand that.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Exit,
    Greet,
    GetTime,
    GetDate,
    Search,
    HowAreYou,
    Help,
    Unknown,
}

// First match wins. Keywords match anywhere in the lowercased text.
const RULES: &[(Intent, &[&str])] = &[
    (Intent::Exit, &["exit", "quit", "goodbye", "bye"]),
    (Intent::Greet, &["hello", "hi", "hey"]),
    (Intent::GetTime, &["time"]),
    (Intent::GetDate, &["date", "today"]),
    (Intent::Search, &["search"]),
    (Intent::HowAreYou, &["how are you"]),
    (Intent::Help, &["help"]),
];

impl Intent {
    /// Pure, case-insensitive keyword classification. `Unknown` when
    /// nothing matches.
    pub fn classify(text: &str) -> Intent {
        let text = text.to_lowercase();
        RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(*k)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::Unknown)
    }
}

/// Whether the session should keep looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continue(pub bool);

/// The query left after removing every occurrence of "search".
pub fn extract_query(utterance: &str) -> String {
    utterance.to_lowercase().replace("search", "").trim().to_string()
}

/// Percent-encodes each word and joins them with `+`.
pub fn encode_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| urlencoding::encode(w).into_owned())
        .collect::<Vec<_>>()
        .join("+")
}

pub struct CommandRouter {
    speaker: Arc<dyn AudioOutput>,
    listener: Arc<dyn Listener>,
    browser: Arc<dyn UrlOpener>,
    clock: Arc<dyn Clock>,
    search_url: String,
    search_retries: u8,
}

impl CommandRouter {
    pub fn new(
        speaker: Arc<dyn AudioOutput>,
        listener: Arc<dyn Listener>,
        browser: Arc<dyn UrlOpener>,
        clock: Arc<dyn Clock>,
        search_url: &str,
    ) -> Self {
        Self {
            speaker,
            listener,
            browser,
            clock,
            search_url: search_url.to_string(),
            search_retries: 1,
        }
    }

    pub fn classify(&self, utterance: &str) -> Intent {
        Intent::classify(utterance)
    }

    /// Routes one listen outcome. Unintelligible speech gets a spoken
    /// notice; every other empty outcome is a silent no-op.
    pub fn handle(&self, heard: Heard) -> Continue {
        match heard {
            Heard::Utterance(text) => self.dispatch(self.classify(&text), &text),
            Heard::Unintelligible => {
                self.speaker.speak(NOT_UNDERSTOOD);
                Continue(true)
            }
            Heard::Silence | Heard::Failed(_) => Continue(true),
        }
    }

    pub fn dispatch(&self, intent: Intent, utterance: &str) -> Continue {
        if utterance.trim().is_empty() {
            return Continue(true);
        }
        debug!("dispatching {:?} for {:?}", intent, utterance);

        match intent {
            Intent::Exit => {
                self.speaker.speak(FAREWELL);
                return Continue(false);
            }
            Intent::Greet => self.speaker.speak(GREETING_REPLY),
            Intent::GetTime => {
                let now = self.clock.now();
                self.speaker
                    .speak(&format!("The time is {}", clock::format_time(&now)));
            }
            Intent::GetDate => {
                let now = self.clock.now();
                self.speaker
                    .speak(&format!("Today is {}", clock::format_date(&now)));
            }
            Intent::Search => self.search(utterance),
            Intent::HowAreYou => self.speaker.speak(HOW_ARE_YOU_REPLY),
            Intent::Help => self.speaker.speak(HELP_REPLY),
            Intent::Unknown => self.speaker.speak(UNKNOWN_REPLY),
        }
        Continue(true)
    }

    /// Searches for the query in `utterance`, prompting and re-listening
    /// at most `search_retries` times while the query is empty.
    fn search(&self, utterance: &str) {
        let mut query = extract_query(utterance);
        let mut retries = self.search_retries;

        while query.is_empty() {
            if retries == 0 {
                debug!("no search query after retry, giving up");
                return;
            }
            retries -= 1;
            self.speaker.speak(SEARCH_PROMPT);
            match self.listener.listen() {
                Heard::Utterance(text) => query = extract_query(&text),
                Heard::Unintelligible => self.speaker.speak(NOT_UNDERSTOOD),
                Heard::Silence | Heard::Failed(_) => {}
            }
        }

        let url = format!("{}{}", self.search_url, encode_query(&query));
        self.browser.open(&url);
        self.speaker.speak(&format!("Searching for {}", query));
    }
}
