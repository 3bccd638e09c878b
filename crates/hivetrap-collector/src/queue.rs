// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One queued observation from a monitored service.
///
/// Immutable once created; an entry leaves the queue only through
/// [`DeliveryQueue::drain`], which moves it into a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Name of the producing service.
    pub service: String,
    /// The observation itself, any JSON value.
    pub data: serde_json::Value,
    /// Capture time, `YYYY-MM-DD HH:MM:SS` UTC.
    pub timestamp: String,
}

impl QueueEntry {
    fn new(service: &str, data: serde_json::Value) -> Self {
        QueueEntry {
            service: service.to_string(),
            data,
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Takes in individual service observations and accumulates them until the
/// scheduler drains them into a batch.
///
/// One lock guards both `push` and `drain`; lock hold time is an append or a
/// swap and never spans I/O.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    entries: Mutex<Vec<QueueEntry>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation. Returns immediately; never blocks on I/O.
    pub fn push(&self, service: &str, data: serde_json::Value) {
        let entry = QueueEntry::new(service, data);
        #[allow(clippy::expect_used)]
        self.entries.lock().expect("lock poisoned").push(entry);
    }

    /// Atomically swap the backing sequence for an empty one and return the
    /// previous contents. Every pushed entry shows up in exactly one drain.
    pub fn drain(&self) -> Vec<QueueEntry> {
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("lock poisoned");
        std::mem::take(&mut *entries)
    }

    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let entries = self.entries.lock().expect("lock poisoned");
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_push_and_drain() {
        let queue = DeliveryQueue::new();
        queue.push("ssh", serde_json::json!({"attempt": 1}));
        queue.push("telnet", serde_json::json!("login root"));
        assert_eq!(queue.len(), 2);

        let batch = queue.drain();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].service, "ssh");
        assert_eq!(batch[1].service, "telnet");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_on_empty_queue() {
        let queue = DeliveryQueue::new();
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_timestamp_format() {
        let queue = DeliveryQueue::new();
        queue.push("ssh", serde_json::json!(null));
        let batch = queue.drain();
        // 2026-08-06 12:34:56
        let ts = &batch[0].timestamp;
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[13..14], ":");
    }

    /// Concurrent producers racing a draining consumer: every entry must
    /// appear in exactly one drain, none lost, none duplicated.
    #[test]
    fn test_concurrent_enqueue_drain_atomicity() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let queue = Arc::new(DeliveryQueue::new());

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.push("svc", serde_json::json!(p * PER_PRODUCER + i));
                    }
                })
            })
            .collect();

        let drainer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut drained = Vec::new();
                for _ in 0..100 {
                    drained.extend(queue.drain());
                    std::thread::yield_now();
                }
                drained
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let mut drained = drainer.join().unwrap();
        drained.extend(queue.drain());

        assert_eq!(drained.len(), PRODUCERS * PER_PRODUCER);
        let seen: HashSet<i64> = drained
            .iter()
            .map(|e| e.data.as_i64().unwrap())
            .collect();
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    }
}
