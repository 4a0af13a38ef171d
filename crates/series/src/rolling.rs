//! Trailing window used to build lag and rolling-mean features.
//!
//! A window that has seen fewer values than its capacity reports the mean of
//! what it holds (partial window).

use std::collections::VecDeque;

/// A fixed-size rolling window of values.
///
/// # Example
/// ```
/// use series::rolling::RollingWindow;
///
/// let mut window = RollingWindow::new(3);
/// window.push(1.0);
/// window.push(2.0);
/// assert_eq!(window.mean(), Some(1.5)); // partial window
///
/// window.push(3.0);
/// window.push(4.0); // Drops 1.0
/// assert_eq!(window.mean(), Some(3.0));
/// assert_eq!(window.last(), Some(4.0));
/// ```
#[derive(Debug, Clone)]
pub struct RollingWindow {
    data: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Create a new rolling window with the given capacity.
    ///
    /// # Panics
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RollingWindow capacity must be > 0");
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a value, evicting the oldest when full.
    pub fn push(&mut self, value: f64) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// Mean of the values currently held, oldest first. `None` if empty.
    ///
    /// Summed from the buffer in order, so the result is bit-identical to
    /// averaging the same trailing slice of a series.
    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().sum::<f64>() / self.data.len() as f64)
    }

    /// Most recently pushed value.
    #[inline]
    pub fn last(&self) -> Option<f64> {
        self.data.back().copied()
    }
}
