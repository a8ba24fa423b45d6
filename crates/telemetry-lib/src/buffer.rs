//! Bounded in-memory buffer of recent aggregated snapshots
//!
//! Holds the last N snapshots for the dashboard. Pushing at capacity evicts
//! the oldest entry.

use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::models::AggregatedSnapshot;

/// Default number of snapshots retained
pub const DEFAULT_CAPACITY: usize = 1000;

/// Buffer statistics
#[derive(Debug, Clone, PartialEq)]
pub struct BufferStats {
    pub entries: usize,
    pub capacity: usize,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

/// FIFO ring of the most recent snapshots, safe to share between tasks
pub struct RealtimeBuffer {
    entries: RwLock<VecDeque<AggregatedSnapshot>>,
    capacity: usize,
}

impl Default for RealtimeBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RealtimeBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(10_000))),
            capacity,
        }
    }

    /// Append a snapshot, evicting from the front while at capacity.
    /// Returns the number of entries held afterwards.
    pub async fn push(&self, snapshot: AggregatedSnapshot) -> usize {
        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(snapshot);
        entries.len()
    }

    pub async fn latest(&self) -> Option<AggregatedSnapshot> {
        self.entries.read().await.back().cloned()
    }

    /// All held snapshots, oldest first
    pub async fn snapshots(&self) -> Vec<AggregatedSnapshot> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn stats(&self) -> BufferStats {
        let entries = self.entries.read().await;
        BufferStats {
            entries: entries.len(),
            capacity: self.capacity,
            oldest_timestamp: entries.front().map(|s| s.timestamp),
            newest_timestamp: entries.back().map(|s| s.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollaboratorSummaries;

    fn snapshot(timestamp: i64) -> AggregatedSnapshot {
        AggregatedSnapshot::from_samples(timestamp, vec![], CollaboratorSummaries::default())
    }

    #[tokio::test]
    async fn test_buffer_evicts_oldest_at_capacity() {
        let buffer = RealtimeBuffer::new(3);
        for ts in 1..=5 {
            buffer.push(snapshot(ts)).await;
        }

        let timestamps: Vec<_> = buffer.snapshots().await.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![3, 4, 5]);
        assert_eq!(buffer.len().await, 3);
        assert_eq!(buffer.latest().await.unwrap().timestamp, 5);
    }

    #[tokio::test]
    async fn test_empty_buffer() {
        let buffer = RealtimeBuffer::default();
        assert!(buffer.is_empty().await);
        assert!(buffer.latest().await.is_none());
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);

        let stats = buffer.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.oldest_timestamp, None);
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_one_entry() {
        let buffer = RealtimeBuffer::new(0);
        buffer.push(snapshot(1)).await;
        assert_eq!(buffer.push(snapshot(2)).await, 1);

        let stats = buffer.stats().await;
        assert_eq!(stats.oldest_timestamp, Some(2));
        assert_eq!(stats.newest_timestamp, Some(2));
    }
}
