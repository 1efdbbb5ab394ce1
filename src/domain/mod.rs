pub mod agent;
pub mod assignment;
pub mod order;

pub use agent::*;
pub use assignment::*;
pub use order::*;
