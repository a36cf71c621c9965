// Bounded buffer of push-delivered metrics
use crate::domain::telemetry::{Metric, MetricId};
use indexmap::IndexMap;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferInsert {
    /// New id appended; carries how many of the oldest arrivals were evicted.
    Appended { evicted: usize },
    /// Existing id replaced in place, arrival position unchanged.
    Replaced,
    /// Sentinel records are never buffered.
    Rejected,
}

/// Identity-keyed metrics in arrival order, never more than `capacity`.
/// Eviction is oldest-by-arrival, independent of `created_at`.
#[derive(Debug, Clone)]
pub struct LiveBuffer {
    entries: IndexMap<MetricId, Metric>,
    capacity: usize,
}

impl Default for LiveBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LiveBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: IndexMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn insert(&mut self, metric: Metric) -> BufferInsert {
        if metric.is_sentinel() {
            return BufferInsert::Rejected;
        }
        if let Some(existing) = self.entries.get_mut(&metric.id) {
            *existing = metric;
            return BufferInsert::Replaced;
        }

        let mut evicted = 0;
        while self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
            evicted += 1;
        }
        self.entries.insert(metric.id, metric);
        BufferInsert::Appended { evicted }
    }

    /// Drop every entry the predicate rejects, preserving arrival order.
    pub fn retain(&mut self, mut keep: impl FnMut(&Metric) -> bool) {
        self.entries.retain(|_, m| keep(m));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, id: MetricId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Contents in arrival order.
    pub fn to_vec(&self) -> Vec<Metric> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::telemetry::{Payload, SENTINEL_ID};
    use chrono::{TimeZone, Utc};

    fn metric(id: MetricId, minute: u32) -> Metric {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap();
        Metric::new(id, "energy", "Garage", Payload::new(), created_at)
    }

    #[test]
    fn test_keeps_last_n_by_arrival() {
        let mut buffer = LiveBuffer::with_capacity(3);
        for id in 1..=5 {
            buffer.insert(metric(id, 0));
        }

        assert_eq!(buffer.len(), 3);
        let ids: Vec<MetricId> = buffer.to_vec().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_eviction_ignores_timestamps() {
        let mut buffer = LiveBuffer::with_capacity(2);
        buffer.insert(metric(1, 50));
        buffer.insert(metric(2, 40));
        // Chronologically oldest, but the newest arrival.
        let outcome = buffer.insert(metric(3, 1));

        assert_eq!(outcome, BufferInsert::Appended { evicted: 1 });
        assert!(!buffer.contains(1));
        assert!(buffer.contains(2));
        assert!(buffer.contains(3));
    }

    #[test]
    fn test_replace_keeps_position_and_evicts_nothing() {
        let mut buffer = LiveBuffer::with_capacity(2);
        buffer.insert(metric(1, 0));
        buffer.insert(metric(2, 1));

        assert_eq!(buffer.insert(metric(1, 5)), BufferInsert::Replaced);
        let contents = buffer.to_vec();
        assert_eq!(contents[0].id, 1);
        assert_eq!(contents[0].created_at.format("%M").to_string(), "05");
        assert_eq!(contents.len(), 2);

        // id 1 is still the oldest arrival.
        buffer.insert(metric(3, 2));
        assert!(!buffer.contains(1));
    }

    #[test]
    fn test_sentinel_rejected() {
        let mut buffer = LiveBuffer::default();
        assert_eq!(buffer.insert(metric(SENTINEL_ID, 0)), BufferInsert::Rejected);
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_retain_and_clear() {
        let mut buffer = LiveBuffer::with_capacity(10);
        for id in 1..=4 {
            buffer.insert(metric(id, 0));
        }
        buffer.retain(|m| m.id % 2 == 0);
        assert_eq!(buffer.len(), 2);

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
