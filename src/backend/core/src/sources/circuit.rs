//! Auth-failure circuit breaker for source connections.
//!
//! Tracks consecutive credential failures per connection. When a connection
//! crosses the threshold, the sync processor deactivates it so we stop
//! hammering a dead credential; reconnecting (outside this service) flips it
//! back on.

use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Per-connection consecutive auth-failure counter.
pub struct AuthCircuitBreaker {
    failures: RwLock<HashMap<Uuid, u32>>,
    threshold: u32,
}

impl AuthCircuitBreaker {
    /// Create a breaker that trips after `threshold` consecutive failures.
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: RwLock::new(HashMap::new()),
            threshold: threshold.max(1),
        }
    }

    /// Record an auth failure for a connection.
    ///
    /// Returns `true` when the connection has now crossed the threshold and
    /// should be deactivated.
    pub fn record_failure(&self, connection_id: Uuid) -> bool {
        let mut failures = self.failures.write();
        let count = failures.entry(connection_id).or_insert(0);
        *count += 1;

        let tripped = *count >= self.threshold;
        if tripped {
            tracing::warn!(
                connection_id = %connection_id,
                failures = *count,
                threshold = self.threshold,
                "Auth circuit breaker tripped"
            );
        }
        tripped
    }

    /// Record a successful token acquisition, clearing the failure streak.
    pub fn record_success(&self, connection_id: Uuid) {
        self.failures.write().remove(&connection_id);
    }

    /// Clear state for a connection (after deactivation).
    pub fn reset(&self, connection_id: Uuid) {
        self.failures.write().remove(&connection_id);
    }

    /// Current consecutive failure count for a connection.
    pub fn failure_count(&self, connection_id: Uuid) -> u32 {
        self.failures.read().get(&connection_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_at_threshold() {
        let breaker = AuthCircuitBreaker::new(3);
        let conn = Uuid::new_v4();

        assert!(!breaker.record_failure(conn));
        assert!(!breaker.record_failure(conn));
        assert!(breaker.record_failure(conn));
    }

    #[test]
    fn test_success_resets_streak() {
        let breaker = AuthCircuitBreaker::new(2);
        let conn = Uuid::new_v4();

        assert!(!breaker.record_failure(conn));
        breaker.record_success(conn);
        assert_eq!(breaker.failure_count(conn), 0);

        // Streak starts over
        assert!(!breaker.record_failure(conn));
        assert!(breaker.record_failure(conn));
    }

    #[test]
    fn test_connections_are_isolated() {
        let breaker = AuthCircuitBreaker::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        breaker.record_failure(a);
        breaker.record_failure(a);
        assert_eq!(breaker.failure_count(a), 2);
        assert_eq!(breaker.failure_count(b), 0);
    }

    #[test]
    fn test_threshold_floor() {
        // A zero threshold would trip on the first success path; clamp to 1
        let breaker = AuthCircuitBreaker::new(0);
        let conn = Uuid::new_v4();
        assert!(breaker.record_failure(conn));
    }
}
