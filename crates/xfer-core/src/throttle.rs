//! Token-bucket throttle for outgoing confirmations.

use std::time::{Duration, Instant};

/// Bits charged per confirmation (a confirmed packet is assumed to be 1000 bytes).
pub const ACK_COST_BITS: f64 = 1000.0 * 8.0;

/// How far ahead the bucket may bank credit.
pub const THROTTLE_LOOKAHEAD: Duration = Duration::from_millis(250);

/// Rate limiter in bits per second.
///
/// Credit accrues at `rate` and is capped at `rate * lookahead`. A send is
/// allowed while credit covers it, or while banked credit is above the cap.
#[derive(Debug, Clone)]
pub struct AckThrottle {
    rate_bps: f64,
    available: f64,
    last_send: Instant,
}

impl AckThrottle {
    /// Create a throttle with a full bucket.
    #[must_use]
    pub fn new(rate_bps: f64, now: Instant) -> Self {
        Self {
            rate_bps,
            available: rate_bps * THROTTLE_LOOKAHEAD.as_secs_f64(),
            last_send: now,
        }
    }

    /// Current rate.
    #[must_use]
    pub fn rate_bps(&self) -> f64 {
        self.rate_bps
    }

    /// Change the rate. Banked credit is kept.
    pub fn set_rate(&mut self, rate_bps: f64) {
        self.rate_bps = rate_bps;
    }

    fn lookahead_amount(&self) -> f64 {
        self.rate_bps * THROTTLE_LOOKAHEAD.as_secs_f64()
    }

    fn accrued(&self, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last_send).as_secs_f64();
        self.available + self.rate_bps * dt
    }

    /// Whether sending `amount` bits now would overflow the budget.
    #[must_use]
    pub fn would_overflow(&self, amount: f64, now: Instant) -> bool {
        let available = self.accrued(now);
        !(available - amount >= 0.0 || available > self.lookahead_amount())
    }

    /// Charge `amount` bits. Returns `true` if the bucket went negative.
    pub fn consume(&mut self, amount: f64, now: Instant) -> bool {
        self.available = self.accrued(now).min(self.lookahead_amount()) - amount;
        self.last_send = now;
        self.available < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_refill() {
        let start = Instant::now();
        // 32 kbps: 8000 bits of lookahead, one ack's worth
        let mut throttle = AckThrottle::new(32_000.0, start);

        assert!(!throttle.would_overflow(ACK_COST_BITS, start));
        assert!(!throttle.consume(ACK_COST_BITS, start));
        assert!(throttle.would_overflow(ACK_COST_BITS, start));

        // Refills after 250 ms
        let later = start + Duration::from_millis(250);
        assert!(!throttle.would_overflow(ACK_COST_BITS, later));
    }

    #[test]
    fn test_credit_is_capped() {
        let start = Instant::now();
        let mut throttle = AckThrottle::new(32_000.0, start);
        let much_later = start + Duration::from_secs(60);

        assert!(!throttle.consume(ACK_COST_BITS, much_later));
        // Idle time did not bank more than the lookahead
        assert!(throttle.would_overflow(ACK_COST_BITS, much_later));
    }

    #[test]
    fn test_set_rate() {
        let start = Instant::now();
        let mut throttle = AckThrottle::new(1000.0, start);
        throttle.set_rate(2_000_000.0);
        assert_eq!(throttle.rate_bps(), 2_000_000.0);
    }
}
