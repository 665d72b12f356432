//! # Bounded Series
//!
//! Fixed-capacity FIFO used for every telemetry channel. Appending to a full
//! series evicts the oldest element, so the series always holds the most
//! recent `capacity` values in arrival order.

use std::collections::VecDeque;

/// Fixed-capacity FIFO series
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedSeries<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedSeries<T> {
    /// Creates an empty series holding at most `capacity` values.
    ///
    /// A capacity of zero is raised to one.
    ///
    /// # Examples
    ///
    /// ```
    /// use mavviz::telemetry::series::BoundedSeries;
    ///
    /// let mut series = BoundedSeries::new(2);
    /// series.push(1);
    /// series.push(2);
    /// series.push(3);
    /// assert_eq!(series.to_vec(), vec![2, 3]);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `value`, evicting the oldest value once full.
    pub fn push(&mut self, value: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    /// Maximum number of values held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Most recently appended value.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedSeries<T> {
    /// Copies the series out, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
