use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ledger row linking an order to the agent it was dispatched to.
///
/// Rows are append-only. Capacity accounting only considers rows whose
/// `assigned_at` falls inside the trailing window; older rows remain in
/// the ledger but stop counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub order_ref: String,
    pub agent_id: i64,
    pub assigned_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(order_ref: &str, agent_id: i64, assigned_at: DateTime<Utc>) -> Self {
        Self {
            order_ref: order_ref.to_string(),
            agent_id,
            assigned_at,
        }
    }

    /// True when the row still counts against a window starting at `since`.
    pub fn counts_since(&self, since: DateTime<Utc>) -> bool {
        self.assigned_at >= since
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_counts_since_window_boundary() {
        let now = Utc::now();
        let row = Assignment::new("ORD-1", 1, now - Duration::minutes(30));

        // A row exactly at the window start still counts.
        assert!(row.counts_since(now - Duration::minutes(30)));
        assert!(!row.counts_since(now - Duration::minutes(29)));
    }
}
