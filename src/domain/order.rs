use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order awaiting dispatch, created by the ordering system.
///
/// The engine identifies orders by `reference` and never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub reference: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(reference: &str, details: Option<&str>) -> Self {
        Self {
            reference: reference.to_string(),
            details: details.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}
