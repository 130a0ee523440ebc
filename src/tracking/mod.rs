pub mod commands;
pub mod controller;
pub mod dwell;
pub mod events;

pub use controller::{SessionEnd, SessionTracker};
pub use dwell::validate_dwell_batch;
pub use events::EventBatch;
