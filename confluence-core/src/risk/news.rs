//! High-impact news blackout windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvent {
    pub currency: String,
    pub time: DateTime<Utc>,
    pub impact: Impact,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewsCalendar {
    events: Vec<NewsEvent>,
    before: Duration,
    after: Duration,
}

impl NewsCalendar {
    pub fn new(events: Vec<NewsEvent>, before: Duration, after: Duration) -> Self {
        Self { events, before, after }
    }

    pub fn replace_events(&mut self, events: Vec<NewsEvent>) {
        self.events = events;
    }

    /// High-impact event on any of `currencies` whose window
    /// `[time − before, time + after]` contains `now`.
    pub fn blackout(&self, currencies: &[String], now: DateTime<Utc>) -> Option<&NewsEvent> {
        self.events.iter().find(|e| {
            e.impact == Impact::High
                && currencies.iter().any(|c| c.eq_ignore_ascii_case(&e.currency))
                && now >= e.time - self.before
                && now <= e.time + self.after
        })
    }
}
