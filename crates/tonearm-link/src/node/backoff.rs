//! Reconnect backoff for a single node.

use std::time::Duration;

use tokio::time::Instant;

/// Attempts past this many share the capped delay.
const MAX_BACKOFF_STEP: u32 = 5;

/// Delay before reconnect attempt number `retries` (1-based).
///
/// `(min(retries - 1, 5) + 5)^2` seconds: 25s, 36s, 49s, ... capped at 100s.
pub fn reconnect_delay(retries: u32) -> Duration {
    let step = u64::from(retries.saturating_sub(1).min(MAX_BACKOFF_STEP) + 5);
    Duration::from_millis(step * step * 1000)
}

/// Where a node's reconnect cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    Idle,
    /// A single timer is armed; it fires at `deadline`.
    Pending { deadline: Instant, attempt: u32 },
    Connecting,
}

/// Owns the retry counter and guarantees at most one armed timer.
#[derive(Debug)]
pub struct Reconnector {
    state: ReconnectState,
    retries: u32,
}

impl Default for Reconnector {
    fn default() -> Self {
        Self {
            state: ReconnectState::Idle,
            retries: 0,
        }
    }
}

impl Reconnector {
    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Socket opened: forget past failures and disarm any timer.
    pub fn on_ready(&mut self) {
        self.retries = 0;
        self.state = ReconnectState::Idle;
    }

    /// Socket closed or failed to open.
    ///
    /// Arms a timer and returns its delay, or returns `None` when one is
    /// already pending.
    pub fn on_disconnect(&mut self, now: Instant) -> Option<Duration> {
        if matches!(self.state, ReconnectState::Pending { .. }) {
            return None;
        }
        self.retries += 1;
        let delay = reconnect_delay(self.retries);
        self.state = ReconnectState::Pending {
            deadline: now + delay,
            attempt: self.retries,
        };
        Some(delay)
    }

    /// A connect attempt is starting, whether it is the first open or the
    /// armed timer firing. Any pending timer is consumed.
    pub fn on_connect_attempt(&mut self) {
        self.state = ReconnectState::Connecting;
    }

    pub fn cancel(&mut self) {
        self.state = ReconnectState::Idle;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ReconnectState::Pending { deadline, .. } => Some(deadline),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_formula() {
        assert_eq!(reconnect_delay(1), Duration::from_millis(25_000));
        assert_eq!(reconnect_delay(2), Duration::from_millis(36_000));
        assert_eq!(reconnect_delay(3), Duration::from_millis(49_000));
        assert_eq!(reconnect_delay(6), Duration::from_millis(100_000));
        assert_eq!(reconnect_delay(7), Duration::from_millis(100_000));
        assert_eq!(reconnect_delay(1000), Duration::from_millis(100_000));
    }

    #[test]
    fn zero_retries_is_treated_as_first_attempt() {
        assert_eq!(reconnect_delay(0), reconnect_delay(1));
    }

    #[test]
    fn three_failed_opens_back_off_in_order() {
        let mut r = Reconnector::default();
        let mut delays = Vec::new();
        for _ in 0..3 {
            delays.push(r.on_disconnect(Instant::now()).unwrap());
            r.on_connect_attempt();
            assert_eq!(r.state(), ReconnectState::Connecting);
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(25_000),
                Duration::from_millis(36_000),
                Duration::from_millis(49_000),
            ]
        );
        assert_eq!(r.retries(), 3);
    }

    #[test]
    fn only_one_timer_can_be_pending() {
        let mut r = Reconnector::default();
        let now = Instant::now();
        assert!(r.on_disconnect(now).is_some());
        let armed = r.state();

        assert!(r.on_disconnect(now).is_none());
        assert!(r.on_disconnect(now).is_none());
        assert_eq!(r.state(), armed);
        assert_eq!(r.retries(), 1);
        assert_eq!(r.deadline(), Some(now + Duration::from_millis(25_000)));
    }

    #[test]
    fn ready_resets_retries_and_disarms() {
        let mut r = Reconnector::default();
        r.on_disconnect(Instant::now());
        r.on_connect_attempt();
        r.on_disconnect(Instant::now());
        assert_eq!(r.retries(), 2);

        r.on_ready();
        assert_eq!(r.retries(), 0);
        assert_eq!(r.state(), ReconnectState::Idle);
        assert_eq!(r.deadline(), None);

        assert_eq!(
            r.on_disconnect(Instant::now()),
            Some(Duration::from_millis(25_000))
        );
    }

    #[test]
    fn first_open_is_a_connect_attempt() {
        let mut r = Reconnector::default();
        r.on_connect_attempt();
        assert_eq!(r.state(), ReconnectState::Connecting);
        assert_eq!(r.retries(), 0);
        assert_eq!(r.deadline(), None);

        assert_eq!(
            r.on_disconnect(Instant::now()),
            Some(Duration::from_millis(25_000))
        );
        assert_eq!(r.retries(), 1);
    }
}
