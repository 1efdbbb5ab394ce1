use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery agent as provisioned externally.
///
/// `id` drives the first-fit selection order; `capacity` is the maximum
/// number of in-window assignments the agent may carry at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub capacity: i32,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: i64, name: &str, capacity: i32) -> Self {
        Self {
            id,
            name: name.to_string(),
            capacity,
            created_at: Utc::now(),
        }
    }
}
