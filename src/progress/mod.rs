pub mod commands;
pub mod recorder;

pub use recorder::ProgressRecorder;
