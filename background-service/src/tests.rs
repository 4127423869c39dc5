use crate::scheduler::{RunState, Stage, StageSelection, TickAction};
use chrono::{Duration, TimeZone, Utc};

#[test]
fn test_tick_starts_idle_stage() {
    let mut state = RunState::new();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    assert_eq!(state.tick(Stage::Harvest, now), TickAction::Start);
    assert!(state.is_in_flight(Stage::Harvest));
    assert!(!state.is_in_flight(Stage::Publish));
    assert_eq!(state.last_harvest_at, Some(now));
    assert_eq!(state.last_publish_at, None);
}

#[test]
fn test_overlapping_tick_is_skipped() {
    let mut state = RunState::new();
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    assert_eq!(state.tick(Stage::Harvest, start), TickAction::Start);
    let later = start + Duration::hours(1);
    assert_eq!(state.tick(Stage::Harvest, later), TickAction::Skip);
    // A skipped tick does not move the start time.
    assert_eq!(state.last_started(Stage::Harvest), Some(start));

    state.finish(Stage::Harvest);
    assert_eq!(state.tick(Stage::Harvest, later), TickAction::Start);
    assert_eq!(state.last_started(Stage::Harvest), Some(later));
}

#[test]
fn test_stages_are_independent() {
    let mut state = RunState::new();
    let now = Utc::now();

    assert_eq!(state.tick(Stage::Harvest, now), TickAction::Start);
    assert_eq!(state.tick(Stage::Publish, now), TickAction::Start);
    assert!(state.any_in_flight());

    state.finish(Stage::Harvest);
    assert!(state.is_in_flight(Stage::Publish));
    assert_eq!(state.tick(Stage::Publish, now), TickAction::Skip);

    state.finish(Stage::Publish);
    assert!(!state.any_in_flight());
}

#[test]
fn test_stage_selection() {
    assert!(StageSelection::Both.includes(Stage::Harvest));
    assert!(StageSelection::Both.includes(Stage::Publish));
    assert!(StageSelection::HarvestOnly.includes(Stage::Harvest));
    assert!(!StageSelection::HarvestOnly.includes(Stage::Publish));
    assert!(!StageSelection::PublishOnly.includes(Stage::Harvest));
    assert_eq!(StageSelection::default(), StageSelection::Both);
}

#[test]
fn test_stage_display() {
    assert_eq!(Stage::Harvest.to_string(), "harvest");
    assert_eq!(Stage::Publish.to_string(), "publish");
}
