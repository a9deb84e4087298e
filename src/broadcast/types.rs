use std::collections::VecDeque;
use std::time::SystemTime;

use crate::source::types::ValueSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub status: DeliveryStatus,
}

impl RecipientOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered)
    }
}

/// Result of one fan-out. `baseline` is the snapshot that was rendered.
#[derive(Debug, Clone)]
pub struct BroadcastRecord {
    pub baseline: ValueSnapshot,
    pub fired_at: SystemTime,
    pub recipients: Vec<RecipientOutcome>,
}

impl BroadcastRecord {
    pub fn delivered(&self) -> usize {
        self.recipients.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.recipients.len() - self.delivered()
    }

    pub fn fully_delivered(&self) -> bool {
        self.recipients.iter().all(RecipientOutcome::is_ok)
    }
}

/// Bounded ring of recent broadcasts, newest last.
#[derive(Debug)]
pub struct BroadcastHistory {
    records: VecDeque<BroadcastRecord>,
    capacity: usize,
}

impl BroadcastHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: BroadcastRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn record(primary: i64, failed: usize) -> BroadcastRecord {
        let mut recipients = vec![RecipientOutcome {
            recipient: "a@c.us".into(),
            status: DeliveryStatus::Delivered,
        }];
        for i in 0..failed {
            recipients.push(RecipientOutcome {
                recipient: format!("f{i}@c.us"),
                status: DeliveryStatus::Failed { reason: "offline".into() },
            });
        }
        BroadcastRecord {
            baseline: ValueSnapshot::new(Decimal::from(primary), Decimal::ZERO),
            fired_at: SystemTime::now(),
            recipients,
        }
    }

    #[test]
    fn counts_outcomes() {
        let r = record(1, 2);
        assert_eq!(r.delivered(), 1);
        assert_eq!(r.failed(), 2);
        assert!(!r.fully_delivered());
        assert!(record(1, 0).fully_delivered());
    }

    #[test]
    fn history_keeps_newest_records() {
        let mut history = BroadcastHistory::new(3);
        for i in 0..5 {
            history.push(record(i, 0));
        }

        assert_eq!(history.len(), 3);
        let kept: Vec<Decimal> = history.records.iter().map(|r| r.baseline.primary).collect();
        assert_eq!(kept, vec![Decimal::from(2), Decimal::from(3), Decimal::from(4)]);
    }
}
