use rust_decimal::Decimal;
use std::time::SystemTime;

/// One polled observation of the upstream quote.
///
/// `primary` is the buy side and `secondary` the sell side for the gold-rate
/// source, but nothing downstream depends on that reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSnapshot {
    pub primary: Decimal,
    pub secondary: Decimal,
    pub observed_at: SystemTime,
    /// Upstream's own "last updated" label, if the source reports one.
    pub source_time: Option<String>,
}

impl ValueSnapshot {
    pub fn new(primary: Decimal, secondary: Decimal) -> Self {
        Self {
            primary,
            secondary,
            observed_at: SystemTime::now(),
            source_time: None,
        }
    }

    pub fn with_source_time(mut self, source_time: impl Into<String>) -> Self {
        self.source_time = Some(source_time.into());
        self
    }

    /// Component-wise `self - earlier`.
    pub fn delta_from(&self, earlier: &ValueSnapshot) -> Delta {
        Delta {
            primary: self.primary - earlier.primary,
            secondary: self.secondary - earlier.secondary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delta {
    pub primary: Decimal,
    pub secondary: Decimal,
}

impl Delta {
    pub fn is_zero(&self) -> bool {
        self.primary.is_zero() && self.secondary.is_zero()
    }

    /// True when either component moved by at least `min_change`.
    /// A zero component never qualifies, even with a zero threshold.
    pub fn reaches(&self, min_change: Decimal) -> bool {
        let qualifies = |d: Decimal| !d.is_zero() && d.abs() >= min_change;
        qualifies(self.primary) || qualifies(self.secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn snap(a: i64, b: i64) -> ValueSnapshot {
        ValueSnapshot::new(Decimal::from(a), Decimal::from(b))
    }

    #[test]
    fn delta_is_signed() {
        let d = snap(98, 115).delta_from(&snap(100, 110));
        assert_eq!(d.primary, Decimal::from(-2));
        assert_eq!(d.secondary, Decimal::from(5));
    }

    #[test]
    fn reaches_uses_absolute_value_of_either_side() {
        let d = snap(97, 110).delta_from(&snap(100, 110));
        assert!(d.reaches(Decimal::from(3)));
        assert!(!d.reaches(Decimal::from(4)));
    }

    #[test]
    fn zero_delta_never_reaches_zero_threshold() {
        let d = snap(100, 110).delta_from(&snap(100, 110));
        assert!(d.is_zero());
        assert!(!d.reaches(Decimal::ZERO));
    }
}
