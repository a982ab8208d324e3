// Spike detection components
pub mod runner; // periodic polling task: batch -> evaluate -> fire
pub mod spike; // pure per-batch keyword evaluation

pub use runner::SpikeRunner;
pub use spike::{KeywordSpikeDetector, KeywordWindow, TriggerDecision};
