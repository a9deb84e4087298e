use rust_decimal::Decimal;
use tracing::debug;

use crate::source::types::{Delta, ValueSnapshot};

/// A poll result that moved far enough from the last broadcast to matter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub snapshot: ValueSnapshot,
    pub since_last_observed: Delta,
    pub since_last_broadcast: Delta,
}

/// Classifies each poll against the last observed and last broadcast values.
#[derive(Debug)]
pub struct ChangeDetector {
    min_change: Decimal,
    last_observed: Option<ValueSnapshot>,
    last_broadcast: Option<ValueSnapshot>,
}

impl ChangeDetector {
    pub fn new(min_change: Decimal) -> Self {
        Self {
            min_change,
            last_observed: None,
            last_broadcast: None,
        }
    }

    /// The first call only seeds both baselines. Afterwards an event is
    /// returned when either side is at least `min_change` away from the
    /// broadcast baseline. While not `idle` (a timer is armed or a broadcast
    /// is running) a value that has not moved since the previous poll is
    /// skipped, since whatever is pending already carries it.
    pub fn observe(&mut self, snapshot: ValueSnapshot, idle: bool) -> Option<ChangeEvent> {
        let Some(previous) = self.last_observed.replace(snapshot.clone()) else {
            debug!(primary = %snapshot.primary, secondary = %snapshot.secondary, "seeding baselines");
            self.last_broadcast = Some(snapshot);
            return None;
        };

        let since_last_observed = snapshot.delta_from(&previous);
        if since_last_observed.is_zero() && !idle {
            return None;
        }

        let since_last_broadcast = match &self.last_broadcast {
            Some(baseline) => snapshot.delta_from(baseline),
            None => since_last_observed,
        };

        if !since_last_broadcast.reaches(self.min_change) {
            debug!(
                primary = %since_last_broadcast.primary,
                secondary = %since_last_broadcast.secondary,
                "change below threshold"
            );
            return None;
        }

        Some(ChangeEvent {
            snapshot,
            since_last_observed,
            since_last_broadcast,
        })
    }

    /// Move the broadcast baseline. Called at decision points only.
    pub fn mark_broadcast(&mut self, snapshot: ValueSnapshot) {
        self.last_broadcast = Some(snapshot);
    }

    pub fn last_broadcast(&self) -> Option<&ValueSnapshot> {
        self.last_broadcast.as_ref()
    }

    pub fn last_observed(&self) -> Option<&ValueSnapshot> {
        self.last_observed.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(a: i64, b: i64) -> ValueSnapshot {
        ValueSnapshot::new(Decimal::from(a), Decimal::from(b))
    }

    #[test]
    fn first_observation_never_fires() {
        let mut detector = ChangeDetector::new(Decimal::ZERO);

        assert!(detector.observe(snap(100, 110), true).is_none());
        let baseline = detector.last_broadcast().unwrap();
        assert_eq!(baseline.primary, Decimal::from(100));
        assert_eq!(baseline.secondary, Decimal::from(110));
    }

    #[test]
    fn small_moves_are_suppressed() {
        let mut detector = ChangeDetector::new(Decimal::from(5));
        detector.observe(snap(100, 110), true);

        for (a, b) in [(101, 110), (104, 114), (96, 106), (100, 110)] {
            assert!(detector.observe(snap(a, b), true).is_none(), "{a}/{b} should be noise");
        }
    }

    #[test]
    fn drift_accumulates_against_broadcast_baseline() {
        let mut detector = ChangeDetector::new(Decimal::from(5));
        detector.observe(snap(100, 110), true);

        assert!(detector.observe(snap(103, 110), true).is_none());
        let event = detector.observe(snap(106, 110), true).expect("drift crossed threshold");

        assert_eq!(event.since_last_observed.primary, Decimal::from(3));
        assert_eq!(event.since_last_broadcast.primary, Decimal::from(6));
    }

    #[test]
    fn unchanged_value_is_skipped_while_busy() {
        let mut detector = ChangeDetector::new(Decimal::ONE);
        detector.observe(snap(100, 110), true);

        assert!(detector.observe(snap(103, 112), true).is_some());
        assert!(detector.observe(snap(103, 112), false).is_none());
    }

    #[test]
    fn settled_value_is_reported_again_when_idle() {
        let mut detector = ChangeDetector::new(Decimal::ONE);
        detector.observe(snap(100, 110), true);
        detector.observe(snap(120, 130), false);

        let event = detector.observe(snap(120, 130), true).expect("still away from baseline");
        assert!(event.since_last_observed.is_zero());
        assert_eq!(event.since_last_broadcast.primary, Decimal::from(20));
    }

    #[test]
    fn value_back_at_baseline_stays_quiet_when_idle() {
        let mut detector = ChangeDetector::new(Decimal::ONE);
        detector.observe(snap(100, 110), true);

        for _ in 0..3 {
            assert!(detector.observe(snap(100, 110), true).is_none());
        }
    }

    #[test]
    fn mark_broadcast_moves_the_baseline() {
        let mut detector = ChangeDetector::new(Decimal::ONE);
        detector.observe(snap(100, 110), true);
        let event = detector.observe(snap(103, 112), true).unwrap();

        detector.mark_broadcast(event.snapshot);

        assert!(detector.observe(snap(103, 111), false).is_some());
        assert_eq!(detector.last_broadcast().unwrap().primary, Decimal::from(103));
        assert_eq!(detector.last_observed().unwrap().secondary, Decimal::from(111));
    }

    #[test]
    fn last_observed_updates_even_when_suppressed() {
        let mut detector = ChangeDetector::new(Decimal::from(50));
        detector.observe(snap(100, 110), true);
        detector.observe(snap(101, 110), true);

        assert_eq!(detector.last_observed().unwrap().primary, Decimal::from(101));
        assert_eq!(detector.last_broadcast().unwrap().primary, Decimal::from(100));
    }
}
