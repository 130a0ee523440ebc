pub mod accumulator;
pub mod commands;
pub mod config;
pub mod engagement;

pub use accumulator::ScoreAccumulator;
pub use config::EngagementWeights;
pub use engagement::engagement_score;
