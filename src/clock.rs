use chrono::{DateTime, Local, NaiveDateTime, Timelike};

/// Local wall-clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now: DateTime<Local> = Local::now();
        now.naive_local()
    }
}

/// A clock stopped at one instant.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// "03:05 PM"
pub fn format_time(t: &NaiveDateTime) -> String {
    t.format("%I:%M %p").to_string()
}

/// "Tuesday, March 05, 2024"
pub fn format_date(t: &NaiveDateTime) -> String {
    t.format("%A, %B %d, %Y").to_string()
}

pub fn greeting_for(t: &NaiveDateTime) -> &'static str {
    match t.hour() {
        0..=11 => "Good morning! How can I help you?",
        12..=17 => "Good afternoon! How can I help you?",
        _ => "Good evening! How can I help you?",
    }
}
