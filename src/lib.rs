//! Core engines for a practice-test platform: grading of attempt
//! submissions and composition of exam question orderings, with Postgres
//! repositories behind narrow store traits.

pub mod core;
pub mod db;
pub mod errors;
pub mod repositories;
pub mod schemas;
pub mod services;
pub mod stores;

#[cfg(test)]
mod test_support;

pub use errors::EngineError;
pub use services::composition::CompositionEngine;
pub use services::grading::GradingEngine;
pub use services::scaling::{LinearScale, ScalePolicy};
