//! Exploration driver and coverage tracking.

pub mod coverage;
pub mod driver;

pub use coverage::Coverage;
pub use driver::Engine;
