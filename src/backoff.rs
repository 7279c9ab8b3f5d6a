//! Inter-probe delay.
//!
//! Capped exponential backoff seeded at the [`ConvergenceSpec`](crate::ConvergenceSpec) minimum poll interval. The
//! delay never drops below the minimum, never exceeds the configured cap, and is
//! clamped to whatever time is left before the deadline.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor >= 1.0 {
            factor
        } else {
            1.0
        };
        Self {
            min,
            max: max.max(min),
            factor,
            attempt: 0,
        }
    }

    /// Delay for the current attempt without advancing.
    pub fn peek(&self) -> Duration {
        let base = self.min.as_secs_f64();
        let cap = self.max.as_secs_f64();

        // min * factor^attempt, capped
        let scaled = base * self.factor.powi(self.attempt.min(i32::MAX as u32) as i32);
        if !scaled.is_finite() || scaled >= cap {
            self.max
        } else {
            Duration::from_secs_f64(scaled).max(self.min)
        }
    }

    /// Delay before the next probe, clamped to `remaining`, then advance.
    pub fn next_delay(&mut self, remaining: Duration) -> Duration {
        let delay = self.peek();
        self.attempt = self.attempt.saturating_add(1);
        delay.min(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_grows_exponentially_and_caps() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 2.0);
        let delays: Vec<u64> = (0..5).map(|_| b.next_delay(FAR).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn test_factor_one_is_fixed_interval() {
        let mut b = Backoff::new(Duration::from_millis(250), Duration::from_secs(60), 1.0);
        for _ in 0..10 {
            assert_eq!(b.next_delay(FAR), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_clamped_to_remaining() {
        let mut b = Backoff::new(Duration::from_secs(3), Duration::from_secs(30), 2.0);
        assert_eq!(b.next_delay(Duration::from_secs(2)), Duration::from_secs(2));
        assert_eq!(b.next_delay(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_invalid_factor_falls_back_to_fixed() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), f64::NAN);
        assert_eq!(b.next_delay(FAR), Duration::from_secs(1));
        assert_eq!(b.next_delay(FAR), Duration::from_secs(1));

        let b = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 0.5);
        assert_eq!(b.peek(), Duration::from_secs(1));
    }

    #[test]
    fn test_cap_below_min_uses_min() {
        let b = Backoff::new(Duration::from_secs(180), Duration::from_secs(10), 2.0);
        assert_eq!(b.peek(), Duration::from_secs(180));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(600), 2.0);
        for _ in 0..2000 {
            b.next_delay(FAR);
        }
        assert_eq!(b.peek(), Duration::from_secs(600));
    }
}
