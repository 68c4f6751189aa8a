use rust_decimal::Decimal;
use std::time::Duration;
use tracing::debug;

/// Outcome of comparing two consecutive profitability samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendDecision {
    /// Skip execution this cycle and keep watching
    pub defer: bool,
    /// How long to sleep before the next cycle
    pub next_poll_interval: Duration,
}

/// Throttles execution on the direction of profitability between cycles
///
/// While profitability is flat or improving the gate defers and polls fast;
/// once it turns down the gate lets execution proceed and polls slowly.
#[derive(Debug, Clone)]
pub struct TrendGate {
    baseline: Decimal,
    fast_interval: Duration,
    slow_interval: Duration,
}

impl TrendGate {
    pub fn new(fast_interval: Duration, slow_interval: Duration) -> Self {
        Self {
            baseline: Decimal::ZERO,
            fast_interval,
            slow_interval,
        }
    }

    /// Compare `current` against `previous` without touching the stored baseline
    pub fn decide(&self, current: Decimal, previous: Decimal) -> TrendDecision {
        if previous > current {
            TrendDecision {
                defer: false,
                next_poll_interval: self.slow_interval,
            }
        } else {
            TrendDecision {
                defer: true,
                next_poll_interval: self.fast_interval,
            }
        }
    }

    /// Compare against the stored baseline, then make `current` the new baseline
    pub fn check(&mut self, current: Decimal) -> TrendDecision {
        let decision = self.decide(current, self.baseline);
        debug!(
            previous = %self.baseline,
            current = %current,
            defer = decision.defer,
            next_poll_secs = decision.next_poll_interval.as_secs(),
            "Trend gate evaluated"
        );
        self.baseline = current;
        decision
    }

    /// Forget the previous sample; called after every submission
    pub fn reset(&mut self) {
        self.baseline = Decimal::ZERO;
    }

    pub fn baseline(&self) -> Decimal {
        self.baseline
    }

    pub fn fast_interval(&self) -> Duration {
        self.fast_interval
    }

    pub fn slow_interval(&self) -> Duration {
        self.slow_interval
    }
}

impl Default for TrendGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_declining_profitability_executes_slowly() {
        let gate = TrendGate::default();
        let decision = gate.decide(dec!(1.5), dec!(2.0));
        assert!(!decision.defer);
        assert_eq!(decision.next_poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_improving_or_flat_profitability_defers_fast() {
        let gate = TrendGate::default();

        let improving = gate.decide(dec!(2.5), dec!(2.0));
        assert!(improving.defer);
        assert_eq!(improving.next_poll_interval, Duration::from_secs(5));

        let flat = gate.decide(dec!(2.0), dec!(2.0));
        assert!(flat.defer);
        assert_eq!(flat.next_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_decide_is_idempotent() {
        let gate = TrendGate::default();
        for (current, previous) in [
            (dec!(1), dec!(2)),
            (dec!(2), dec!(1)),
            (dec!(0), dec!(0)),
            (dec!(-3), dec!(-1)),
        ] {
            let first = gate.decide(current, previous);
            let second = gate.decide(current, previous);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_check_records_baseline() {
        let mut gate = TrendGate::default();
        assert_eq!(gate.baseline(), Decimal::ZERO);

        // Rising from zero: keep watching
        assert!(gate.check(dec!(0.8)).defer);
        assert_eq!(gate.baseline(), dec!(0.8));

        assert!(gate.check(dec!(1.1)).defer);

        // Crest passed
        let decision = gate.check(dec!(0.9));
        assert!(!decision.defer);
        assert_eq!(gate.baseline(), dec!(0.9));

        gate.reset();
        assert_eq!(gate.baseline(), Decimal::ZERO);
    }

    #[test]
    fn test_negative_sample_after_reset_executes() {
        let mut gate = TrendGate::default();
        let decision = gate.check(dec!(-0.4));
        assert!(!decision.defer);
        assert_eq!(decision.next_poll_interval, gate.slow_interval());
    }
}
