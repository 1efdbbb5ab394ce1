use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Agent, Assignment};
use crate::error::Result;

/// Read access to the orders the engine may dispatch.
///
/// Order creation lives in the ordering system; the engine only checks
/// existence before assigning.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn exists(&self, order_ref: &str) -> Result<bool>;
}

/// Read access to the delivery agent fleet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// All agents in ascending id order. Selection is first-fit over this
    /// ordering, so implementations must keep it stable.
    async fn all(&self) -> Result<Vec<Agent>>;

    async fn get(&self, agent_id: i64) -> Result<Option<Agent>>;
}

/// Append-only record of order-to-agent assignments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssignmentLedger: Send + Sync {
    /// Number of assignments for `agent_id` with `assigned_at >= since`.
    async fn count_since(&self, agent_id: i64, since: DateTime<Utc>) -> Result<i64>;

    /// The assignment recorded for `order_ref`, if any.
    async fn get_for_order(&self, order_ref: &str) -> Result<Option<Assignment>>;

    async fn exists_for_order(&self, order_ref: &str) -> Result<bool> {
        Ok(self.get_for_order(order_ref).await?.is_some())
    }

    /// Records a new assignment row. Rows are never updated or deleted.
    async fn append(&self, order_ref: &str, agent_id: i64, assigned_at: DateTime<Utc>)
        -> Result<()>;
}
