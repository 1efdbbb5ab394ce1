use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{Agent, Assignment, Order};
use crate::error::{LedgerError, Result};
use crate::store::traits::{AgentStore, AssignmentLedger, OrderLookup};

/// In-memory implementation of the storage traits.
///
/// Backs tests and doubles as the reference implementation of the trait
/// contracts. Agents live in a BTreeMap so enumeration comes out in
/// ascending id order without an explicit sort.
#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<String, Order>>,
    agents: RwLock<BTreeMap<i64, Agent>>,
    assignments: RwLock<Vec<Assignment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_order(&self, order: Order) {
        self.orders
            .write()
            .await
            .insert(order.reference.clone(), order);
    }

    pub async fn add_agent(&self, agent: Agent) {
        self.agents.write().await.insert(agent.id, agent);
    }

    /// Snapshot of every ledger row, oldest first.
    pub async fn assignments(&self) -> Vec<Assignment> {
        self.assignments.read().await.clone()
    }

    /// Drops all state. Test helper.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
        self.agents.write().await.clear();
        self.assignments.write().await.clear();
    }
}

#[async_trait]
impl OrderLookup for MemoryStore {
    async fn exists(&self, order_ref: &str) -> Result<bool> {
        Ok(self.orders.read().await.contains_key(order_ref))
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn all(&self) -> Result<Vec<Agent>> {
        Ok(self.agents.read().await.values().cloned().collect())
    }

    async fn get(&self, agent_id: i64) -> Result<Option<Agent>> {
        Ok(self.agents.read().await.get(&agent_id).cloned())
    }
}

#[async_trait]
impl AssignmentLedger for MemoryStore {
    async fn count_since(&self, agent_id: i64, since: DateTime<Utc>) -> Result<i64> {
        let count = self
            .assignments
            .read()
            .await
            .iter()
            .filter(|row| row.agent_id == agent_id && row.counts_since(since))
            .count();
        Ok(count as i64)
    }

    async fn get_for_order(&self, order_ref: &str) -> Result<Option<Assignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .find(|row| row.order_ref == order_ref)
            .cloned())
    }

    async fn append(&self, order_ref: &str, agent_id: i64, assigned_at: DateTime<Utc>) -> Result<()> {
        let mut assignments = self.assignments.write().await;
        if assignments.iter().any(|row| row.order_ref == order_ref) {
            return Err(LedgerError::DuplicateAssignment {
                order_ref: order_ref.to_string(),
            }
            .into());
        }
        assignments.push(Assignment::new(order_ref, agent_id, assigned_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_append_rejects_duplicate_order_ref() {
        let store = MemoryStore::new();
        assert_ok!(store.append("ORD-1", 1, Utc::now()).await);
        assert_err!(store.append("ORD-1", 2, Utc::now()).await);
        assert_eq!(store.assignments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_count_since_filters_by_agent_and_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert_ok!(store.append("ORD-1", 1, now - Duration::minutes(40)).await);
        assert_ok!(store.append("ORD-2", 1, now - Duration::minutes(10)).await);
        assert_ok!(store.append("ORD-3", 2, now - Duration::minutes(10)).await);

        let since = now - Duration::minutes(30);
        assert_eq!(store.count_since(1, since).await.unwrap(), 1);
        assert_eq!(store.count_since(2, since).await.unwrap(), 1);
        assert_eq!(store.count_since(3, since).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_agents_enumerate_in_ascending_id_order() {
        let store = MemoryStore::new();
        store.add_agent(Agent::new(3, "Courier C", 5)).await;
        store.add_agent(Agent::new(1, "Courier A", 2)).await;
        store.add_agent(Agent::new(2, "Courier B", 4)).await;

        let ids: Vec<i64> = store.all().await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_exists_for_order_uses_ledger_rows() {
        let store = MemoryStore::new();
        assert!(!store.exists_for_order("ORD-1").await.unwrap());

        assert_ok!(store.append("ORD-1", 1, Utc::now()).await);
        assert!(store.exists_for_order("ORD-1").await.unwrap());

        let row = store.get_for_order("ORD-1").await.unwrap().unwrap();
        assert_eq!(row.agent_id, 1);
    }

    #[tokio::test]
    async fn test_clear_drops_all_state() {
        let store = MemoryStore::new();
        store.add_agent(Agent::new(1, "Courier A", 2)).await;
        store.add_order(Order::new("ORD-1", None)).await;
        assert_ok!(store.append("ORD-1", 1, Utc::now()).await);

        store.clear().await;

        assert!(store.all().await.unwrap().is_empty());
        assert!(!store.exists("ORD-1").await.unwrap());
        assert!(store.assignments().await.is_empty());
        let since = Utc::now() - Duration::minutes(30);
        assert_eq!(store.count_since(1, since).await.unwrap(), 0);
    }
}
