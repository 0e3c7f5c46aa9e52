//! Bounded collection utilities

use std::collections::VecDeque;

/// Helper trait for bounded VecDeque operations
pub(crate) trait BoundedPush<T> {
    /// Push a value, evicting from the front once `max_size` is reached.
    /// Returns the evicted value, if any.
    fn push_bounded(&mut self, value: T, max_size: usize) -> Option<T>;
}

impl<T> BoundedPush<T> for VecDeque<T> {
    #[inline]
    fn push_bounded(&mut self, value: T, max_size: usize) -> Option<T> {
        if max_size == 0 {
            return Some(value);
        }
        let evicted = if self.len() >= max_size {
            self.pop_front()
        } else {
            None
        };
        self.push_back(value);
        evicted
    }
}
