//! Active session tracking and handover

mod active;
mod hot_swap;

pub use active::ActiveSession;
pub use hot_swap::run_hot_swap;
