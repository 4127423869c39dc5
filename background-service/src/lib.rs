//! The harvest and publish stages and the scheduler that drives them.

pub mod harvest;
pub mod publish;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use harvest::{HarvestPipeline, HarvestReport};
pub use publish::{PublishPipeline, PublishReport};
pub use scheduler::{RunState, Scheduler, Stage, StageOutcome, StageSelection, TickAction};
