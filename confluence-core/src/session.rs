//! Trading sessions and the session-adaptive confluence threshold.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Two or more major sessions open at once.
    Overlap,
    /// At least one session open.
    Single,
    OffHours,
}

impl SessionPhase {
    /// Overlap lowers the bar by one, off-hours raises it by one.
    pub fn threshold(self, base: u8) -> u8 {
        let adjusted = match self {
            SessionPhase::Overlap => base.saturating_sub(1),
            SessionPhase::Single => base,
            SessionPhase::OffHours => base.saturating_add(1),
        };
        adjusted.clamp(1, 6)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Overlap => "overlap",
            SessionPhase::Single => "single",
            SessionPhase::OffHours => "off_hours",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SessionSchedule {
    cfg: SessionConfig,
}

impl SessionSchedule {
    pub fn new(cfg: SessionConfig) -> Self {
        Self { cfg }
    }

    /// Names of the sessions open at `now`.
    pub fn active_sessions(&self, now: DateTime<Utc>) -> Vec<&str> {
        self.cfg
            .windows
            .iter()
            .filter(|w| w.hours.contains(now.hour()))
            .map(|w| w.name.as_str())
            .collect()
    }

    pub fn phase(&self, now: DateTime<Utc>) -> SessionPhase {
        let hour = now.hour();
        let open = self.cfg.windows.iter().filter(|w| w.hours.contains(hour));
        let (mut any, mut majors) = (0, 0);
        for w in open {
            any += 1;
            if w.major {
                majors += 1;
            }
        }
        match (any, majors) {
            (_, m) if m >= 2 => SessionPhase::Overlap,
            (0, _) => SessionPhase::OffHours,
            _ => SessionPhase::Single,
        }
    }

    /// Inside the configured trading window, and not a weekend unless allowed.
    pub fn is_trading_time(&self, now: DateTime<Utc>) -> bool {
        let weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
        if weekend && !self.cfg.trade_weekends {
            return false;
        }
        self.cfg.trading_window.contains(now.hour())
    }

    pub fn adaptive_threshold(&self, base: u8, now: DateTime<Utc>) -> u8 {
        self.phase(now).threshold(base)
    }
}
