use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Point-in-time view of a connection pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub pool_id: u64,

    // Sizing
    pub capacity: usize,
    pub init_size: usize,
    pub max_idle_ms: u64,

    // Current state
    pub total: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub connecting: usize,
    pub waiting: usize,
    pub closed: bool,

    // Lifetime counters
    pub created: u64,
    pub destroyed: u64,
    pub acquired: u64,
    pub acquire_timeouts: u64,
    pub dial_failures: u64,
    pub reaped: u64,
    pub discarded: u64,
    pub invalid_releases: u64,

    pub timestamp: DateTime<Utc>,
}

impl PoolStatus {
    // Share of capacity currently used, in-flight dials included
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.total + self.connecting) as f64 / self.capacity as f64
    }

    // One-line summary for INFO logs
    pub fn summary(&self) -> String {
        format!(
            "pool {}: {}/{} live ({} idle, {} busy, {} dialing, {} waiting)",
            self.pool_id,
            self.total,
            self.capacity,
            self.idle,
            self.checked_out,
            self.connecting,
            self.waiting
        )
    }
}

// Outcome of one pooled RPC unit of work, for debug logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    pub uuid: String,
    pub connection_id: u64,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub discarded: bool,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(total: usize, connecting: usize, capacity: usize) -> PoolStatus {
        PoolStatus {
            pool_id: 7,
            capacity,
            init_size: 0,
            max_idle_ms: 1000,
            total,
            idle: total,
            checked_out: 0,
            connecting,
            waiting: 0,
            closed: false,
            created: 0,
            destroyed: 0,
            acquired: 0,
            acquire_timeouts: 0,
            dial_failures: 0,
            reaped: 0,
            discarded: 0,
            invalid_releases: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_utilization() {
        assert_eq!(status(2, 1, 4).utilization(), 0.75);
        assert_eq!(status(0, 0, 0).utilization(), 0.0);
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            status(3, 0, 8).summary(),
            "pool 7: 3/8 live (3 idle, 0 busy, 0 dialing, 0 waiting)"
        );
    }

    #[test]
    fn test_status_serializes_to_json() {
        let json = serde_json::to_value(status(1, 0, 2)).unwrap();
        assert_eq!(json["pool_id"], 7);
        assert_eq!(json["capacity"], 2);
        assert_eq!(json["closed"], false);
    }
}
