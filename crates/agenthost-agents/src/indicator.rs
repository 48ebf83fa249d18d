use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Consumes prices one at a time and reports a value once it has seen
/// enough history.
pub trait Indicator: Send {
    /// Feed the next price. `None` means not warmed up yet.
    fn next_value(&mut self, price: f64) -> Option<f64>;

    fn current(&self) -> Option<f64>;
}

/// Simple moving average over the last `period` prices.
///
/// Returns `None` until `period` prices have been seen.
#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverage {
    period: usize,
    window: VecDeque<f64>,
}

/// Serialized form of a `MovingAverage`: its period and the current window,
/// oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovingAverageState {
    pub period: usize,
    pub values: Vec<f64>,
}

impl MovingAverage {
    pub fn new(period: usize) -> Result<Self, AgentError> {
        if period == 0 {
            return Err(AgentError::Config(
                "moving average period must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn state(&self) -> MovingAverageState {
        MovingAverageState {
            period: self.period,
            values: self.window.iter().copied().collect(),
        }
    }

    /// Replace the window with a snapshot taken from an average of the same period.
    pub fn restore_state(&mut self, state: &MovingAverageState) -> Result<(), AgentError> {
        if state.period != self.period {
            return Err(AgentError::InvalidState(format!(
                "moving average period {} does not match snapshot period {}",
                self.period, state.period
            )));
        }
        if state.values.len() > self.period {
            return Err(AgentError::InvalidState(format!(
                "snapshot holds {} values for period {}",
                state.values.len(),
                self.period
            )));
        }
        self.window = state.values.iter().copied().collect();
        Ok(())
    }
}

impl Indicator for MovingAverage {
    fn next_value(&mut self, price: f64) -> Option<f64> {
        self.window.push_back(price);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        self.current()
    }

    fn current(&self) -> Option<f64> {
        if self.window.len() < self.period {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.period as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_until_warmed_up() {
        let mut ma = MovingAverage::new(3).unwrap();
        assert_eq!(ma.next_value(1.0), None);
        assert_eq!(ma.next_value(2.0), None);
        assert_eq!(ma.next_value(3.0), Some(2.0));
        assert_eq!(ma.next_value(6.0), Some(11.0 / 3.0));
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(matches!(MovingAverage::new(0), Err(AgentError::Config(_))));
    }

    #[test]
    fn restored_average_continues_identically() {
        let mut original = MovingAverage::new(4).unwrap();
        for price in [101.0, 102.5, 99.75] {
            original.next_value(price);
        }

        let mut restored = MovingAverage::new(4).unwrap();
        restored.restore_state(&original.state()).unwrap();

        assert_eq!(original.next_value(100.25), restored.next_value(100.25));
        assert_eq!(original.next_value(98.0), restored.next_value(98.0));
    }

    #[test]
    fn snapshot_with_other_period_is_rejected() {
        let mut ma = MovingAverage::new(5).unwrap();
        let state = MovingAverageState {
            period: 3,
            values: vec![1.0, 2.0, 3.0],
        };
        assert!(ma.restore_state(&state).is_err());
        assert_eq!(ma.state().values, Vec::<f64>::new());
    }
}
