pub mod availability;
pub mod engine;

pub use availability::{Availability, AvailabilityEvaluator, BusyReason};
pub use engine::{DispatchEngine, DispatchOutcome};
