//! Fixed-capacity circular window over one signal's recent samples.
//!
//! Slots are an arena of `Option<WindowEntry>`: a slot that has never been written is
//! `None`, so an entry stamped exactly at the Unix epoch is still a valid sample.
//!
//! The retained range runs from `start` to `end` inclusive, walking forward modulo the
//! capacity. [`RollingWindow::maintain_span`] nudges `start` by at most one slot per
//! call, so the range only approximately tracks the target span after large gaps.

use chrono::{DateTime, Duration, Utc};
use statrs::statistics::Statistics;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry {
    pub timestamp: DateTime<Utc>,
    pub signal_id: Arc<str>,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct RollingWindow {
    slots: Vec<Option<WindowEntry>>,
    start: usize,
    /// `None` until the first push.
    end: Option<usize>,
    target_span: Duration,
}

impl RollingWindow {
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize, target_span: Duration) -> Self {
        assert!(capacity > 0, "rolling window capacity must be non-zero");
        Self {
            slots: vec![None; capacity],
            start: 0,
            end: None,
            target_span,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn target_span(&self) -> Duration {
        self.target_span
    }

    pub fn start_index(&self) -> usize {
        self.start
    }

    pub fn end_index(&self) -> Option<usize> {
        self.end
    }

    fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }

    fn prev_index(&self, index: usize) -> usize {
        (index + self.capacity() - 1) % self.capacity()
    }

    /// Slot `back` positions behind the newest one; `back = 0` is the newest.
    fn relative_index(&self, end: usize, back: usize) -> usize {
        let capacity = self.capacity();
        (end + capacity - back % capacity) % capacity
    }

    /// Write a sample into the slot after `end`. When the buffer is full this overwrites
    /// the oldest retained sample and `start` moves past it.
    pub fn push(&mut self, timestamp: DateTime<Utc>, signal_id: Arc<str>, value: f64) {
        let slot = match self.end {
            Some(end) => self.next_index(end),
            None => 0,
        };
        let overwrites_oldest = self.end.is_some() && slot == self.start;

        self.slots[slot] = Some(WindowEntry {
            timestamp,
            signal_id,
            value,
        });
        self.end = Some(slot);

        if overwrites_oldest {
            self.start = self.next_index(slot);
        }
    }

    /// Move `start` one step toward covering `target_span` back from the newest sample.
    ///
    /// Forward: while the span exceeds the target and the next slot holds an entry
    /// other than the newest. Backward: while the span is within the target and the
    /// previous slot is within it too.
    pub fn maintain_span(&mut self) {
        let Some(end) = self.end else {
            return;
        };
        if self.start == end {
            return;
        }
        let (Some(newest), Some(oldest)) = (&self.slots[end], &self.slots[self.start]) else {
            return;
        };
        let newest_ts = newest.timestamp;

        if newest_ts - oldest.timestamp > self.target_span {
            let next = self.next_index(self.start);
            if next != end && self.slots[next].is_some() {
                self.start = next;
            }
        } else {
            let prev = self.prev_index(self.start);
            if prev == end {
                return;
            }
            if let Some(candidate) = &self.slots[prev] {
                if newest_ts - candidate.timestamp <= self.target_span {
                    self.start = prev;
                }
            }
        }
    }

    /// Valid entries from oldest to newest.
    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> + '_ {
        let count = match self.end {
            Some(end) if end >= self.start => end - self.start + 1,
            Some(end) => end + self.capacity() - self.start + 1,
            None => 0,
        };
        (0..count).filter_map(move |offset| {
            self.slots[(self.start + offset) % self.capacity()].as_ref()
        })
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.end.is_none()
    }

    pub fn newest(&self) -> Option<&WindowEntry> {
        self.end.and_then(|end| self.slots[end].as_ref())
    }

    pub fn oldest(&self) -> Option<&WindowEntry> {
        self.entries().next()
    }

    /// Time covered by the retained range.
    pub fn span(&self) -> Option<Duration> {
        Some(self.newest()?.timestamp - self.oldest()?.timestamp)
    }

    /// Fraction of retained entries with `value >= threshold`; `0.0` when empty.
    pub fn quantile_at_or_above(&self, threshold: f64) -> f64 {
        let (total, above) = self.entries().fold((0usize, 0usize), |(total, above), entry| {
            (total + 1, above + usize::from(entry.value >= threshold))
        });
        if total == 0 {
            0.0
        } else {
            above as f64 / total as f64
        }
    }

    /// Whether the slot `back` positions behind the newest holds a value `>= threshold`.
    /// Slots never written compare false.
    pub fn is_at_or_above_relative(&self, back: usize, threshold: f64) -> bool {
        self.relative_value(back)
            .is_some_and(|value| value >= threshold)
    }

    /// Whether the slot `back` positions behind the newest holds a value `<= threshold`.
    pub fn is_at_or_below_relative(&self, back: usize, threshold: f64) -> bool {
        self.relative_value(back)
            .is_some_and(|value| value <= threshold)
    }

    fn relative_value(&self, back: usize) -> Option<f64> {
        let end = self.end?;
        self.slots[self.relative_index(end, back)]
            .as_ref()
            .map(|entry| entry.value)
    }

    fn values(&self) -> Vec<f64> {
        self.entries().map(|entry| entry.value).collect()
    }

    pub fn mean(&self) -> Option<f64> {
        let values = self.values();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().mean())
    }

    /// Population standard deviation of the retained range.
    pub fn std_dev(&self) -> Option<f64> {
        let values = self.values();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().population_std_dev())
    }
}
