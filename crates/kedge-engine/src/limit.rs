//! Rate control for the epoch exchange
//!
//! Two directions, two mechanisms. The Anchor answers at most one epoch
//! request per identifier per spacing window, so a flood of requests
//! costs it nothing but map lookups. A requester paces its own retries
//! with a doubling backoff so a dead or unreachable Anchor is probed
//! ever more slowly until a response resets the cadence.

use std::collections::HashMap;
use std::time::Duration;

use kedge_core::{NodeId, Timestamp};
use kedge_crypto::EpochExchange;

/// Anchor-side request budget, one slot per requesting identifier
#[derive(Debug, Default)]
pub struct RequestLimiter {
    min_spacing: Duration,
    served: HashMap<NodeId, Timestamp>,
}

impl RequestLimiter {
    pub fn new(min_spacing: Duration) -> Self {
        RequestLimiter {
            min_spacing,
            served: HashMap::new(),
        }
    }

    /// Admit and record one request, or refuse it inside the window.
    pub fn allow(&mut self, id: NodeId, now: Timestamp) -> bool {
        match self.served.get(&id) {
            Some(&at) if now.since(at) < self.min_spacing => false,
            _ => {
                self.served.insert(id, now);
                true
            }
        }
    }

    /// Drop entries older than `retention` so the map tracks only
    /// recently active requesters.
    pub fn prune(&mut self, now: Timestamp, retention: Duration) {
        self.served.retain(|_, at| now.since(*at) < retention);
    }

    pub fn len(&self) -> usize {
        self.served.len()
    }

    pub fn is_empty(&self) -> bool {
        self.served.is_empty()
    }
}

#[derive(Debug)]
struct PendingRequest {
    exchange: EpochExchange,
    target: NodeId,
    issued_at: Timestamp,
}

/// Requester-side retry pacing plus custody of the in-flight exchange key
///
/// One request may be outstanding at a time. The ephemeral exchange half
/// lives here until the matching response consumes it or the response
/// window lapses; a lapsed window is what grows the backoff.
#[derive(Debug)]
pub struct ResyncThrottle {
    window: Duration,
    backoff: Duration,
    backoff_cap: Duration,
    last_attempt: Option<Timestamp>,
    pending: Option<PendingRequest>,
}

impl ResyncThrottle {
    pub fn new(window: Duration, backoff_cap: Duration) -> Self {
        ResyncThrottle {
            window,
            backoff: window,
            backoff_cap,
            last_attempt: None,
            pending: None,
        }
    }

    /// May a new request go out now?
    ///
    /// Also the bookkeeping point: an outstanding request whose response
    /// window has lapsed is abandoned here and doubles the backoff.
    pub fn may_attempt(&mut self, now: Timestamp) -> bool {
        if let Some(pending) = &self.pending {
            if now.since(pending.issued_at) < self.window {
                return false;
            }
            self.pending = None;
            self.backoff = (self.backoff * 2).min(self.backoff_cap);
        }
        match self.last_attempt {
            None => true,
            Some(at) => now.since(at) >= self.backoff,
        }
    }

    /// Open a fresh exchange toward `target` and return its public half
    /// for the wire.
    pub fn begin(&mut self, now: Timestamp, target: NodeId) -> [u8; 32] {
        let exchange = EpochExchange::initiate();
        let public = exchange.public_bytes();
        self.last_attempt = Some(now);
        self.pending = Some(PendingRequest {
            exchange,
            target,
            issued_at: now,
        });
        public
    }

    /// Whom the in-flight request was addressed to.
    ///
    /// A response is only acceptable from exactly this identifier.
    pub fn pending_target(&self) -> Option<NodeId> {
        self.pending.as_ref().map(|p| p.target)
    }

    /// Surrender the in-flight exchange half to open a response.
    ///
    /// One-shot: a second caller gets nothing, so a replayed response
    /// cannot be opened twice.
    pub fn take_pending(&mut self) -> Option<EpochExchange> {
        self.pending.take().map(|p| p.exchange)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Reset the cadence after a successfully adopted response.
    pub fn succeed(&mut self) {
        self.pending = None;
        self.last_attempt = None;
        self.backoff = self.window;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACING: Duration = Duration::from_secs(2);
    const WINDOW: Duration = Duration::from_secs(2);
    const CAP: Duration = Duration::from_secs(30);

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_limiter_refuses_inside_window() {
        let mut limiter = RequestLimiter::new(SPACING);
        let id = NodeId::new(1);

        assert!(limiter.allow(id, ts(100)));
        assert!(!limiter.allow(id, ts(101)));
        assert!(limiter.allow(id, ts(102)));
    }

    #[test]
    fn test_limiter_tracks_identifiers_independently() {
        let mut limiter = RequestLimiter::new(SPACING);

        assert!(limiter.allow(NodeId::new(1), ts(100)));
        assert!(limiter.allow(NodeId::new(2), ts(100)));
        assert!(!limiter.allow(NodeId::new(1), ts(101)));
    }

    #[test]
    fn test_limiter_prune_drops_idle_entries() {
        let mut limiter = RequestLimiter::new(SPACING);
        limiter.allow(NodeId::new(1), ts(100));
        limiter.allow(NodeId::new(2), ts(130));

        limiter.prune(ts(140), Duration::from_secs(20));
        assert_eq!(limiter.len(), 1);
        // Pruned entries release their slot entirely.
        assert!(limiter.allow(NodeId::new(1), ts(140)));
    }

    #[test]
    fn test_throttle_first_attempt_is_immediate() {
        let mut throttle = ResyncThrottle::new(WINDOW, CAP);
        assert!(throttle.may_attempt(ts(100)));
    }

    #[test]
    fn test_throttle_blocks_while_window_open() {
        let mut throttle = ResyncThrottle::new(WINDOW, CAP);
        throttle.begin(ts(100), NodeId::new(9));

        assert!(throttle.has_pending());
        assert!(!throttle.may_attempt(ts(101)));
    }

    #[test]
    fn test_throttle_backoff_doubles_after_lapsed_window() {
        let mut throttle = ResyncThrottle::new(WINDOW, CAP);
        throttle.begin(ts(100), NodeId::new(9));

        // Window lapses at 102; backoff is now 4s from the attempt.
        assert!(!throttle.may_attempt(ts(102)));
        assert!(!throttle.has_pending());
        assert!(!throttle.may_attempt(ts(103)));
        assert!(throttle.may_attempt(ts(104)));

        throttle.begin(ts(104), NodeId::new(9));
        // Next spacing doubles again to 8s.
        assert!(!throttle.may_attempt(ts(108)));
        assert!(throttle.may_attempt(ts(112)));
    }

    #[test]
    fn test_throttle_backoff_saturates_at_cap() {
        let mut throttle = ResyncThrottle::new(WINDOW, Duration::from_secs(4));
        let mut now = ts(100);
        for _ in 0..6 {
            while !throttle.may_attempt(now) {
                now = now + Duration::from_secs(1);
            }
            throttle.begin(now, NodeId::new(9));
        }
        // Spacing never exceeds the cap no matter how many failures.
        throttle.may_attempt(now + WINDOW);
        assert!(throttle.may_attempt(now + Duration::from_secs(4)));
    }

    #[test]
    fn test_take_pending_is_one_shot() {
        let mut throttle = ResyncThrottle::new(WINDOW, CAP);
        throttle.begin(ts(100), NodeId::new(9));

        assert!(throttle.take_pending().is_some());
        assert!(throttle.take_pending().is_none());
    }

    #[test]
    fn test_pending_target_follows_in_flight_request() {
        let mut throttle = ResyncThrottle::new(WINDOW, CAP);
        assert_eq!(throttle.pending_target(), None);

        throttle.begin(ts(100), NodeId::new(7));
        assert_eq!(throttle.pending_target(), Some(NodeId::new(7)));

        throttle.take_pending();
        assert_eq!(throttle.pending_target(), None);
    }

    #[test]
    fn test_success_resets_cadence() {
        let mut throttle = ResyncThrottle::new(WINDOW, CAP);
        throttle.begin(ts(100), NodeId::new(9));
        throttle.may_attempt(ts(102));
        throttle.begin(ts(104), NodeId::new(9));

        throttle.take_pending();
        throttle.succeed();
        assert!(throttle.may_attempt(ts(104)));
    }
}
