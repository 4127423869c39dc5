//! Periodic driver for the harvest and publish stages.
//!
//! Each stage has its own timer. A stage never overlaps with itself; a tick
//! that arrives while the previous run is still going is skipped. The two
//! stages may run at the same time.

use crate::harvest::{HarvestPipeline, HarvestReport};
use crate::publish::{PublishPipeline, PublishReport};
use chrono::{DateTime, Utc};
use skyrelay_core::{CoreError, QuerySpec};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Harvest,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Harvest => write!(f, "harvest"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

/// Which stages a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageSelection {
    #[default]
    Both,
    HarvestOnly,
    PublishOnly,
}

impl StageSelection {
    pub fn includes(&self, stage: Stage) -> bool {
        match self {
            StageSelection::Both => true,
            StageSelection::HarvestOnly => stage == Stage::Harvest,
            StageSelection::PublishOnly => stage == Stage::Publish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Start,
    /// The previous run of the stage is still in flight.
    Skip,
}

/// Process-wide scheduler state. Never persisted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunState {
    pub last_harvest_at: Option<DateTime<Utc>>,
    pub last_publish_at: Option<DateTime<Utc>>,
    harvest_in_flight: bool,
    publish_in_flight: bool,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self, stage: Stage) -> bool {
        match stage {
            Stage::Harvest => self.harvest_in_flight,
            Stage::Publish => self.publish_in_flight,
        }
    }

    pub fn last_started(&self, stage: Stage) -> Option<DateTime<Utc>> {
        match stage {
            Stage::Harvest => self.last_harvest_at,
            Stage::Publish => self.last_publish_at,
        }
    }

    /// Decides what a timer firing at `now` does, marking the stage in
    /// flight when it starts.
    pub fn tick(&mut self, stage: Stage, now: DateTime<Utc>) -> TickAction {
        if self.is_in_flight(stage) {
            return TickAction::Skip;
        }
        match stage {
            Stage::Harvest => {
                self.harvest_in_flight = true;
                self.last_harvest_at = Some(now);
            }
            Stage::Publish => {
                self.publish_in_flight = true;
                self.last_publish_at = Some(now);
            }
        }
        TickAction::Start
    }

    pub fn finish(&mut self, stage: Stage) {
        match stage {
            Stage::Harvest => self.harvest_in_flight = false,
            Stage::Publish => self.publish_in_flight = false,
        }
    }

    pub fn any_in_flight(&self) -> bool {
        self.harvest_in_flight || self.publish_in_flight
    }
}

#[derive(Debug)]
pub enum StageOutcome {
    Harvest(HarvestReport),
    Publish(Result<PublishReport, CoreError>),
}

pub struct Scheduler {
    harvest: Arc<HarvestPipeline>,
    publish: Arc<PublishPipeline>,
    queries: Arc<Vec<QuerySpec>>,
    harvest_interval: Duration,
    publish_interval: Duration,
    stages: StageSelection,
}

impl Scheduler {
    pub fn new(
        harvest: Arc<HarvestPipeline>,
        publish: Arc<PublishPipeline>,
        queries: Vec<QuerySpec>,
        harvest_interval: Duration,
        publish_interval: Duration,
    ) -> Self {
        Self {
            harvest,
            publish,
            queries: Arc::new(queries),
            harvest_interval,
            publish_interval,
            stages: StageSelection::Both,
        }
    }

    pub fn with_stages(mut self, stages: StageSelection) -> Self {
        self.stages = stages;
        self
    }

    /// A single harvest pass followed by a single publish pass.
    pub async fn run_once(&self) -> (Option<HarvestReport>, Option<PublishReport>) {
        let harvested = if self.stages.includes(Stage::Harvest) {
            Some(self.harvest.harvest_all(&self.queries).await)
        } else {
            None
        };
        let published = if self.stages.includes(Stage::Publish) {
            match self.publish.publish_pending().await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!("Publish run failed: {}", e);
                    None
                }
            }
        } else {
            None
        };
        (harvested, published)
    }

    fn spawn(&self, stage: Stage) -> JoinHandle<StageOutcome> {
        match stage {
            Stage::Harvest => {
                let pipeline = Arc::clone(&self.harvest);
                let queries = Arc::clone(&self.queries);
                tokio::spawn(async move { StageOutcome::Harvest(pipeline.harvest_all(&queries).await) })
            }
            Stage::Publish => {
                let pipeline = Arc::clone(&self.publish);
                tokio::spawn(async move { StageOutcome::Publish(pipeline.publish_pending().await) })
            }
        }
    }

    fn on_tick(&self, stage: Stage, state: &mut RunState, task: &mut Option<JoinHandle<StageOutcome>>) {
        match state.tick(stage, Utc::now()) {
            TickAction::Start => {
                info!("Starting {} run", stage);
                *task = Some(self.spawn(stage));
            }
            TickAction::Skip => warn!("Previous {} run still in progress, skipping tick", stage),
        }
    }

    /// Runs both timers until `shutdown` resolves, then waits for in-flight
    /// runs to finish. Returns the final state.
    pub async fn run<S>(&self, shutdown: S) -> RunState
    where
        S: Future<Output = ()>,
    {
        let mut state = RunState::new();
        let mut harvest_timer = interval(self.harvest_interval);
        harvest_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut publish_timer = interval(self.publish_interval);
        publish_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut harvest_task: Option<JoinHandle<StageOutcome>> = None;
        let mut publish_task: Option<JoinHandle<StageOutcome>> = None;
        let run_harvest = self.stages.includes(Stage::Harvest);
        let run_publish = self.stages.includes(Stage::Publish);

        info!(
            "Scheduler started (harvest every {:?}, publish every {:?})",
            self.harvest_interval, self.publish_interval
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, waiting for in-flight runs");
                    break;
                }
                _ = harvest_timer.tick(), if run_harvest => {
                    self.on_tick(Stage::Harvest, &mut state, &mut harvest_task);
                }
                _ = publish_timer.tick(), if run_publish => {
                    self.on_tick(Stage::Publish, &mut state, &mut publish_task);
                }
                joined = join_stage(&mut harvest_task), if harvest_task.is_some() => {
                    harvest_task = None;
                    complete(Stage::Harvest, joined, &mut state);
                }
                joined = join_stage(&mut publish_task), if publish_task.is_some() => {
                    publish_task = None;
                    complete(Stage::Publish, joined, &mut state);
                }
            }
        }

        for (stage, task) in [(Stage::Harvest, harvest_task), (Stage::Publish, publish_task)] {
            if let Some(handle) = task {
                complete(stage, handle.await, &mut state);
            }
        }
        info!("Scheduler stopped");
        state
    }
}

async fn join_stage(
    task: &mut Option<JoinHandle<StageOutcome>>,
) -> Result<StageOutcome, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn complete(stage: Stage, joined: Result<StageOutcome, JoinError>, state: &mut RunState) {
    state.finish(stage);
    match joined {
        Ok(StageOutcome::Harvest(report)) => {
            info!("Harvest run done: {} units created", report.created)
        }
        Ok(StageOutcome::Publish(Ok(report))) => {
            info!("Publish run done: {} units published", report.published)
        }
        Ok(StageOutcome::Publish(Err(e))) => error!("Publish run failed: {}", e),
        Err(e) => error!("{} run terminated abnormally: {}", stage, e),
    }
}
