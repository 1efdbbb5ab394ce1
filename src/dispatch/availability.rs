//! Free/busy evaluation from windowed ledger counts.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::store::traits::{AgentStore, AssignmentLedger};

/// Verdict for a single agent at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Free { active: i64, capacity: i32 },
    Busy(BusyReason),
}

impl Availability {
    pub fn is_free(&self) -> bool {
        matches!(self, Availability::Free { .. })
    }

    pub fn is_busy(&self) -> bool {
        !self.is_free()
    }
}

/// Why an agent cannot take another order right now.
#[derive(Debug, Clone, PartialEq)]
pub enum BusyReason {
    AgentNotFound,
    AtCapacity { active: i64, capacity: i32 },
}

impl std::fmt::Display for BusyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusyReason::AgentNotFound => write!(f, "agent not found"),
            BusyReason::AtCapacity { active, capacity } => {
                write!(f, "at capacity: {} of {} in window", active, capacity)
            }
        }
    }
}

/// Computes free/busy for agents from the assignment ledger.
///
/// Reads only; commits happen in the dispatch engine under its locks.
pub struct AvailabilityEvaluator {
    agents: Arc<dyn AgentStore>,
    ledger: Arc<dyn AssignmentLedger>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl AvailabilityEvaluator {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        ledger: Arc<dyn AssignmentLedger>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            agents,
            ledger,
            clock,
            window,
        }
    }

    /// Start of the trailing window as of now.
    pub fn window_start(&self) -> DateTime<Utc> {
        self.clock.now() - self.window
    }

    /// Whether the agent can take another order right now.
    ///
    /// An unknown agent id is busy with [`BusyReason::AgentNotFound`]
    /// rather than an error; dispatch treats it as never eligible.
    pub async fn is_free(&self, agent_id: i64) -> Result<Availability> {
        let Some(agent) = self.agents.get(agent_id).await? else {
            return Ok(Availability::Busy(BusyReason::AgentNotFound));
        };

        let active = self.ledger.count_since(agent.id, self.window_start()).await?;

        if active < agent.capacity as i64 {
            Ok(Availability::Free {
                active,
                capacity: agent.capacity,
            })
        } else {
            debug!(
                agent_id = agent.id,
                active,
                capacity = agent.capacity,
                "Agent at capacity"
            );
            Ok(Availability::Busy(BusyReason::AtCapacity {
                active,
                capacity: agent.capacity,
            }))
        }
    }
}
