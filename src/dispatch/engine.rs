//! Order assignment under per-order and per-agent critical sections.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::dispatch::availability::{Availability, AvailabilityEvaluator};
use crate::domain::Agent;
use crate::error::{DrayError, LedgerError, Result};
use crate::store::traits::{AgentStore, AssignmentLedger, OrderLookup};

/// Result of one assignment attempt.
///
/// A closed set so callers handle every case. Storage and lock failures
/// arrive as [`DispatchOutcome::StorageFailure`] instead of an error type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Assigned { agent: Agent },
    OrderNotFound { order_ref: String },
    AlreadyAssigned { agent: Agent },
    NoAvailableAgent,
    StorageFailure { reason: String },
}

impl DispatchOutcome {
    pub fn is_assigned(&self) -> bool {
        matches!(self, DispatchOutcome::Assigned { .. })
    }

    /// Caller-facing reply line.
    pub fn message(&self) -> String {
        match self {
            DispatchOutcome::Assigned { agent } => {
                format!("Order assigned to {}", agent.name)
            }
            DispatchOutcome::OrderNotFound { order_ref } => {
                format!("No order found with reference {}", order_ref)
            }
            DispatchOutcome::AlreadyAssigned { agent } => {
                format!("Order is already assigned to {}", agent.name)
            }
            DispatchOutcome::NoAvailableAgent => {
                "No delivery agent is available right now. Try again later.".to_string()
            }
            DispatchOutcome::StorageFailure { reason } => {
                format!("Assignment could not be recorded: {}", reason)
            }
        }
    }
}

/// Assigns orders to the first free agent.
///
/// Besides the stores it only needs a clock; all locking is in-process,
/// keyed by order reference and by agent id.
pub struct DispatchEngine {
    orders: Arc<dyn OrderLookup>,
    agents: Arc<dyn AgentStore>,
    ledger: Arc<dyn AssignmentLedger>,
    clock: Arc<dyn Clock>,
    evaluator: AvailabilityEvaluator,
    order_locks: DashMap<String, Arc<Mutex<()>>>,
    agent_locks: DashMap<i64, Arc<Mutex<()>>>,
    lock_timeout: StdDuration,
}

impl DispatchEngine {
    pub fn new(
        orders: Arc<dyn OrderLookup>,
        agents: Arc<dyn AgentStore>,
        ledger: Arc<dyn AssignmentLedger>,
        clock: Arc<dyn Clock>,
        config: &DispatchConfig,
    ) -> Self {
        let evaluator = AvailabilityEvaluator::new(
            agents.clone(),
            ledger.clone(),
            clock.clone(),
            Duration::minutes(config.window_minutes),
        );

        Self {
            orders,
            agents,
            ledger,
            clock,
            evaluator,
            order_locks: DashMap::new(),
            agent_locks: DashMap::new(),
            lock_timeout: StdDuration::from_millis(config.lock_timeout_ms),
        }
    }

    pub fn evaluator(&self) -> &AvailabilityEvaluator {
        &self.evaluator
    }

    /// First agent, in ascending id order, free to take another order.
    ///
    /// Read-only preview; `assign` re-evaluates under the agent lock
    /// before committing.
    pub async fn find_available(&self) -> Result<Option<Agent>> {
        for agent in self.agents.all().await? {
            if self.evaluator.is_free(agent.id).await?.is_free() {
                return Ok(Some(agent));
            }
        }
        Ok(None)
    }

    /// Assigns `order_ref` to the first free agent.
    ///
    /// Never returns an error: storage and lock failures fold into
    /// [`DispatchOutcome::StorageFailure`] so the outcome set stays closed.
    pub async fn assign(&self, order_ref: &str) -> DispatchOutcome {
        let dispatch_id = Uuid::new_v4();
        let outcome = match self.try_assign(order_ref, dispatch_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%dispatch_id, order_ref, error = %e, "Dispatch aborted by storage failure");
                DispatchOutcome::StorageFailure {
                    reason: e.to_string(),
                }
            }
        };

        // try_assign has dropped its guard and clone by now; evict the
        // entry unless a concurrent call for this order still holds one,
        // so the map does not grow with distinct order references.
        self.order_locks
            .remove_if(order_ref, |_, lock| Arc::strong_count(lock) == 1);

        outcome
    }

    async fn try_assign(&self, order_ref: &str, dispatch_id: Uuid) -> Result<DispatchOutcome> {
        if !self.orders.exists(order_ref).await? {
            debug!(%dispatch_id, order_ref, "Order does not exist");
            return Ok(DispatchOutcome::OrderNotFound {
                order_ref: order_ref.to_string(),
            });
        }

        // Serialize all work on this order so concurrent calls agree on
        // exactly one winner.
        let order_lock = self.order_lock(order_ref);
        let _order_guard = self.acquire(&order_lock, "order", order_ref).await?;

        if let Some(existing) = self.ledger.get_for_order(order_ref).await? {
            let agent = self
                .agents
                .get(existing.agent_id)
                .await?
                .ok_or(LedgerError::UnknownAgent {
                    agent_id: existing.agent_id,
                })?;
            debug!(%dispatch_id, order_ref, agent_id = agent.id, "Order already assigned");
            return Ok(DispatchOutcome::AlreadyAssigned { agent });
        }

        for agent in self.agents.all().await? {
            let agent_lock = self.agent_lock(agent.id);
            let _agent_guard = self
                .acquire(&agent_lock, "agent", &agent.id.to_string())
                .await?;

            // Re-evaluate under the lock: a concurrent commit may have
            // taken the last slot since any earlier read.
            match self.evaluator.is_free(agent.id).await? {
                Availability::Free { active, capacity } => {
                    let assigned_at = self.clock.now();
                    self.ledger.append(order_ref, agent.id, assigned_at).await?;
                    info!(
                        %dispatch_id,
                        order_ref,
                        agent_id = agent.id,
                        agent = %agent.name,
                        active = active + 1,
                        capacity,
                        "Order assigned"
                    );
                    return Ok(DispatchOutcome::Assigned { agent });
                }
                Availability::Busy(reason) => {
                    debug!(%dispatch_id, order_ref, agent_id = agent.id, %reason, "Agent busy");
                }
            }
        }

        debug!(%dispatch_id, order_ref, "No agent has free capacity");
        Ok(DispatchOutcome::NoAvailableAgent)
    }

    fn order_lock(&self, order_ref: &str) -> Arc<Mutex<()>> {
        self.order_locks
            .entry(order_ref.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    // Agent entries are never evicted; the map stays bounded by the fleet.
    fn agent_lock(&self, agent_id: i64) -> Arc<Mutex<()>> {
        self.agent_locks
            .entry(agent_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    async fn acquire<'a>(
        &self,
        lock: &'a Mutex<()>,
        scope: &'static str,
        key: &str,
    ) -> Result<MutexGuard<'a, ()>> {
        timeout(self.lock_timeout, lock.lock())
            .await
            .map_err(|_| DrayError::LockTimeout {
                scope,
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::domain::{Assignment, Order};
    use crate::store::traits::{MockAgentStore, MockAssignmentLedger, MockOrderLookup};
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn test_agent(id: i64, capacity: i32) -> Agent {
        Agent::new(id, &format!("Courier {}", id), capacity)
    }

    fn engine(
        orders: MockOrderLookup,
        agents: MockAgentStore,
        ledger: MockAssignmentLedger,
    ) -> DispatchEngine {
        DispatchEngine::new(
            Arc::new(orders),
            Arc::new(agents),
            Arc::new(ledger),
            Arc::new(SystemClock),
            &DispatchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_missing_order_short_circuits() {
        let mut orders = MockOrderLookup::new();
        orders.expect_exists().returning(|_| Ok(false));

        // No expectations on agents or the ledger: any call would panic,
        // which proves nothing is read or written past the first check.
        let engine = engine(orders, MockAgentStore::new(), MockAssignmentLedger::new());

        match engine.assign("ORD-404").await {
            DispatchOutcome::OrderNotFound { order_ref } => assert_eq!(order_ref, "ORD-404"),
            other => panic!("Expected OrderNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_order_names_existing_agent() {
        let mut orders = MockOrderLookup::new();
        orders.expect_exists().returning(|_| Ok(true));

        let agent = test_agent(2, 4);
        let mut agents = MockAgentStore::new();
        let for_get = agent.clone();
        agents.expect_get().returning(move |_| Ok(Some(for_get.clone())));

        let mut ledger = MockAssignmentLedger::new();
        ledger
            .expect_get_for_order()
            .returning(|_| Ok(Some(Assignment::new("ORD-1", 2, Utc::now()))));

        let engine = engine(orders, agents, ledger);

        match engine.assign("ORD-1").await {
            DispatchOutcome::AlreadyAssigned { agent } => assert_eq!(agent.id, 2),
            other => panic!("Expected AlreadyAssigned, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_append_failure_surfaces_as_storage_failure() {
        let mut orders = MockOrderLookup::new();
        orders.expect_exists().returning(|_| Ok(true));

        let agent = test_agent(1, 2);
        let mut agents = MockAgentStore::new();
        let for_all = agent.clone();
        agents.expect_all().returning(move || Ok(vec![for_all.clone()]));
        let for_get = agent.clone();
        agents.expect_get().returning(move |_| Ok(Some(for_get.clone())));

        let mut ledger = MockAssignmentLedger::new();
        ledger.expect_get_for_order().returning(|_| Ok(None));
        ledger.expect_count_since().returning(|_, _| Ok(0));
        ledger
            .expect_append()
            .times(1)
            .returning(|_, _, _| Err(DrayError::Database(sqlx::Error::PoolTimedOut)));

        let engine = engine(orders, agents, ledger);

        match engine.assign("ORD-1").await {
            DispatchOutcome::StorageFailure { reason } => {
                assert!(reason.contains("Database error"), "reason was: {}", reason);
            }
            other => panic!("Expected StorageFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lost_capacity_race_falls_through_to_next_agent() {
        let mut orders = MockOrderLookup::new();
        orders.expect_exists().returning(|_| Ok(true));

        let fleet = vec![test_agent(1, 1), test_agent(2, 1)];
        let mut agents = MockAgentStore::new();
        let for_all = fleet.clone();
        agents.expect_all().returning(move || Ok(for_all.clone()));
        let for_get = fleet.clone();
        agents
            .expect_get()
            .returning(move |id| Ok(for_get.iter().find(|a| a.id == id).cloned()));

        // Agent 1 already holds its single slot; agent 2 is open.
        let mut ledger = MockAssignmentLedger::new();
        ledger.expect_get_for_order().returning(|_| Ok(None));
        ledger
            .expect_count_since()
            .returning(|agent_id, _| Ok(if agent_id == 1 { 1 } else { 0 }));
        ledger
            .expect_append()
            .withf(|order_ref, agent_id, _| order_ref == "ORD-7" && *agent_id == 2)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let engine = engine(orders, agents, ledger);

        match engine.assign("ORD-7").await {
            DispatchOutcome::Assigned { agent } => assert_eq!(agent.id, 2),
            other => panic!("Expected Assigned to agent 2, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_order_lock_entries_are_evicted_after_dispatch() {
        let store = Arc::new(MemoryStore::new());
        store.add_agent(test_agent(1, 2)).await;
        store.add_order(Order::new("ORD-1", None)).await;

        let engine = DispatchEngine::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(SystemClock),
            &DispatchConfig::default(),
        );

        assert!(engine.assign("ORD-1").await.is_assigned());
        assert!(engine.order_locks.is_empty());

        // Duplicate and unknown orders release their entries too.
        engine.assign("ORD-1").await;
        engine.assign("ORD-404").await;
        assert!(engine.order_locks.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_row_with_unknown_agent_is_a_storage_failure() {
        let mut orders = MockOrderLookup::new();
        orders.expect_exists().returning(|_| Ok(true));

        let mut agents = MockAgentStore::new();
        agents.expect_get().returning(|_| Ok(None));

        let mut ledger = MockAssignmentLedger::new();
        ledger
            .expect_get_for_order()
            .returning(|_| Ok(Some(Assignment::new("ORD-1", 9, Utc::now()))));

        let engine = engine(orders, agents, ledger);

        match engine.assign("ORD-1").await {
            DispatchOutcome::StorageFailure { reason } => {
                assert!(reason.contains("unknown agent 9"), "reason was: {}", reason);
            }
            other => panic!("Expected StorageFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_outcome_messages() {
        let agent = test_agent(1, 2);

        assert_eq!(
            DispatchOutcome::Assigned {
                agent: agent.clone()
            }
            .message(),
            "Order assigned to Courier 1"
        );
        assert_eq!(
            DispatchOutcome::OrderNotFound {
                order_ref: "ORD-404".to_string()
            }
            .message(),
            "No order found with reference ORD-404"
        );
        assert_eq!(
            DispatchOutcome::AlreadyAssigned { agent }.message(),
            "Order is already assigned to Courier 1"
        );
        assert!(DispatchOutcome::NoAvailableAgent.message().contains("Try again later"));
    }
}
