/// Stop ratchet for trailing.
///
/// **Core Rule:** Stops may tighten, never loosen.
///
/// A trailing candidate is accepted only when it improves on the current stop
/// by at least `min_step`, so the terminal is not spammed with sub-pip
/// modifications every cycle.
use crate::domain::Direction;

/// Ratchet over one position's stop.
///
/// - Buy: stop can only rise
/// - Sell: stop can only fall
#[derive(Debug, Clone, PartialEq)]
pub struct StopRatchet {
    /// Current stop level (high-water mark for buys, low-water mark for sells)
    current: Option<f64>,
    direction: Direction,
    min_step: f64,
}

impl StopRatchet {
    pub fn new(direction: Direction, current: Option<f64>, min_step: f64) -> Self {
        Self { current, direction, min_step: min_step.max(0.0) }
    }

    /// Offer a new stop level.
    ///
    /// Returns `Some(level)` and moves the ratchet when `proposed` tightens the
    /// stop by at least one step, `None` otherwise. With no current stop any
    /// finite proposal is accepted.
    ///
    /// # Example
    /// ```
    /// use confluence_core::domain::Direction;
    /// use confluence_core::lifecycle::StopRatchet;
    ///
    /// let mut ratchet = StopRatchet::new(Direction::Buy, Some(1.0950), 0.0005);
    ///
    /// // Tightening by ten pips: accepted
    /// assert_eq!(ratchet.propose(1.0960), Some(1.0960));
    ///
    /// // Loosening: blocked, stays at 1.0960
    /// assert_eq!(ratchet.propose(1.0900), None);
    ///
    /// // Tighter, but by less than a step: blocked
    /// assert_eq!(ratchet.propose(1.0962), None);
    /// assert_eq!(ratchet.current(), Some(1.0960));
    /// ```
    pub fn propose(&mut self, proposed: f64) -> Option<f64> {
        if !proposed.is_finite() {
            return None;
        }
        let accept = match self.current {
            None => true,
            Some(current) => {
                let gain = self.direction.favorable_move(current, proposed);
                gain > 0.0 && gain + crate::domain::PRICE_EPSILON >= self.min_step
            }
        };
        if accept {
            self.current = Some(proposed);
            Some(proposed)
        } else {
            None
        }
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}
