pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use dispatch::{
    Availability, AvailabilityEvaluator, BusyReason, DispatchEngine, DispatchOutcome,
};
pub use domain::{Agent, Assignment, Order};
pub use error::{DrayError, LedgerError, Result};
pub use store::{AgentStore, AssignmentLedger, MemoryStore, OrderLookup, PostgresStore};
