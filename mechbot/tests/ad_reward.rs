mod common;

use {
    common::{config, World},
    mechbot::{
        catalog::{Catalog, MarkerId},
        config::Config,
        flows::{ad_reward, Flow},
        stage::ExitCode,
    },
    std::time::Duration,
};

fn catalog() -> Catalog {
    Catalog::from_root("/resources")
}

fn at_the_store() -> World {
    let mut world = World::new();
    world.locator.show_all([MarkerId::MainScreen, MarkerId::Store]);
    world
}

#[test]
fn reward_is_claimed_after_the_ad_plays() {
    let mut world = at_the_store();
    world
        .locator
        .show_all([MarkerId::WatchNow, MarkerId::Ok])
        .script(MarkerId::ClaimReward, [0.0, 0.0])
        .show(MarkerId::ClaimReward)
        .script(MarkerId::Ok, [0.0, 0.0]);

    assert_eq!(world.run(Flow::AdReward, &catalog(), &config()), ExitCode::SUCCESS);
    assert_eq!(world.pointer.clicks_on(MarkerId::WatchNow), 1);
    assert_eq!(world.pointer.clicks_on(MarkerId::ClaimReward), 2);
    assert_eq!(world.pointer.clicks_on(MarkerId::Ok), 1);
    assert!(world.clock.sleeps().contains(&Duration::from_secs(16)));
    // The reward is kept; the client is left running.
    assert!(world.client_running());
    assert!(world.processes.signals().is_empty());
}

#[test]
fn late_acknowledgment_after_claim_still_succeeds() {
    let mut world = at_the_store();
    world
        .locator
        .show_all([MarkerId::WatchNow, MarkerId::ClaimReward, MarkerId::Ok])
        .script(MarkerId::Ok, [0.0]);
    let config = Config {
        relaunch_limit: Some(0),
        ..config()
    };

    assert_eq!(world.run(Flow::AdReward, &catalog(), &config), ExitCode::SUCCESS);
    assert_eq!(world.processes.spawned().len(), 1);
    assert_eq!(world.pointer.clicks_on(MarkerId::ClaimReward), 2);
    assert_eq!(world.pointer.clicks_on(MarkerId::Ok), 1);
    assert!(world
        .clock
        .sleeps()
        .contains(&config.timings.confirm_retry_delay));
    assert!(world.client_running());
}

#[test]
fn carousel_is_scrolled_until_an_ad_shows_up() {
    let mut world = at_the_store();
    world
        .locator
        .script(MarkerId::WatchNow, [0.0, 0.0])
        .show_all([MarkerId::WatchNow, MarkerId::ClaimReward, MarkerId::Ok])
        .script(MarkerId::Right, [1.0, 0.0])
        .script(MarkerId::RightPressed, [1.0]);

    assert_eq!(world.run(Flow::AdReward, &catalog(), &config()), ExitCode::SUCCESS);
    assert_eq!(world.pointer.clicks_on(MarkerId::Right), 1);
    assert_eq!(world.pointer.clicks_on(MarkerId::RightPressed), 1);
    assert_eq!(world.locator.query_count(MarkerId::WatchNow), 3);
}

#[test]
fn exhausted_carousel_stops_the_client() {
    let mut world = at_the_store();
    world.locator.script(MarkerId::Right, [1.0, 1.0]);

    assert_eq!(
        world.run(Flow::AdReward, &catalog(), &config()),
        ad_reward::CAROUSEL_EXHAUSTED
    );
    assert_eq!(world.pointer.clicks_on(MarkerId::Right), 2);
    assert_eq!(world.locator.query_count(MarkerId::WatchNow), 3);
    assert_eq!(world.locator.query_count(MarkerId::RightPressed), 1);
    assert!(!world.client_running());
}

#[test]
fn endless_carousel_hits_the_page_limit() {
    let mut world = at_the_store();
    world.locator.show(MarkerId::Right);

    assert_eq!(
        world.run(Flow::AdReward, &catalog(), &config()),
        ad_reward::CAROUSEL_SCAN_LIMIT
    );
    assert_eq!(
        world.pointer.clicks_on(MarkerId::Right),
        config().timings.carousel_pages as usize
    );
    assert!(!world.client_running());
}

#[test]
fn acknowledgment_without_claim_relaunches() {
    let mut world = at_the_store();
    world
        .locator
        .show_all([MarkerId::WatchNow, MarkerId::Ok])
        .script(MarkerId::ClaimReward, [0.0])
        .show(MarkerId::ClaimReward);

    assert_eq!(world.run(Flow::AdReward, &catalog(), &config()), ExitCode::SUCCESS);
    assert_eq!(world.processes.spawned().len(), 2);
    assert_eq!(world.processes.signals(), vec!["terminate 1000".to_string()]);
    assert_eq!(world.pointer.clicks_on(MarkerId::WatchNow), 2);
    assert_eq!(world.pointer.clicks_on(MarkerId::ClaimReward), 2);
}

#[test]
fn watch_error_relaunches_until_the_limit() {
    let mut world = at_the_store();
    world.locator.show_all([MarkerId::WatchNow, MarkerId::WatchError]);
    let config = Config {
        relaunch_limit: Some(1),
        ..config()
    };

    assert_eq!(
        world.run(Flow::AdReward, &catalog(), &config),
        ExitCode::RELAUNCH_LIMIT
    );
    assert_eq!(world.processes.spawned().len(), 2);
    assert!(!world.client_running());
}

#[test]
fn missing_store_relaunches() {
    let mut world = World::new();
    world.locator.show(MarkerId::MainScreen);
    let config = Config {
        relaunch_limit: Some(0),
        ..config()
    };

    assert_eq!(
        world.run(Flow::AdReward, &catalog(), &config),
        ExitCode::RELAUNCH_LIMIT
    );
    assert_eq!(world.locator.query_count(MarkerId::Store), 1);
    assert_eq!(world.locator.query_count(MarkerId::WatchNow), 0);
}
