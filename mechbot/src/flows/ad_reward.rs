use {
    super::{reach_main_menu, required_click, HALF_SECOND, ONE_SECOND, THREE_SECONDS, TWO_SECONDS},
    crate::{
        catalog::MarkerId,
        config::Timings,
        stage::{
            Action, Escalation, ExitCode, GraphError, Probe, RetryPolicy, Stage, StageGraph,
            StageId, Transition,
        },
    },
    std::time::Duration,
};

/// Neither an ad nor a way to scroll further was found.
pub const CAROUSEL_EXHAUSTED: ExitCode = ExitCode(40);
/// Still no ad after scrolling through the configured number of pages.
pub const CAROUSEL_SCAN_LIMIT: ExitCode = ExitCode(41);

pub const STORE: StageId = StageId("store");
pub const FIND_AD: StageId = StageId("find-ad");
pub const SCROLL_CAROUSEL: StageId = StageId("scroll-carousel");
pub const AWAIT_CLAIM: StageId = StageId("await-claim");
pub const CONFIRM_REWARD: StageId = StageId("confirm-reward");

pub fn graph(timings: &Timings) -> Result<StageGraph, GraphError> {
    let scroll = |marker: MarkerId| Probe::new(marker, Action::click(TWO_SECONDS), Transition::Goto(FIND_AD));
    // An acknowledgment without a claim means the ad failed to play.
    let failed_ad = |marker: MarkerId, action: Action| {
        Probe::new(marker, action, Transition::Escalate(Escalation::Relaunch))
    };

    StageGraph::builder(super::DISMISS_CLOSE)
        .stages(reach_main_menu(timings, STORE))
        .stage(required_click(STORE, MarkerId::Store, THREE_SECONDS, FIND_AD, Escalation::Relaunch))
        .stage(Stage::detect(
            FIND_AD,
            vec![Probe::new(
                MarkerId::WatchNow,
                Action::click(ONE_SECOND),
                Transition::Goto(AWAIT_CLAIM),
            )],
            RetryPolicy::BestEffort(Transition::Goto(SCROLL_CAROUSEL)),
        ))
        .stage(
            Stage::detect(
                SCROLL_CAROUSEL,
                vec![scroll(MarkerId::Right), scroll(MarkerId::RightPressed)],
                RetryPolicy::ZeroTolerance(Escalation::Exit(CAROUSEL_EXHAUSTED)),
            )
            .visit_limit(
                timings.carousel_pages,
                Escalation::Exit(CAROUSEL_SCAN_LIMIT),
            ),
        )
        .stage(Stage::detect(
            AWAIT_CLAIM,
            vec![
                Probe::new(
                    MarkerId::ClaimReward,
                    Action::clicks([HALF_SECOND, TWO_SECONDS]).with_dwell(timings.ad_dwell),
                    Transition::Goto(CONFIRM_REWARD),
                ),
                failed_ad(MarkerId::Ok, Action::click(ONE_SECOND)),
                failed_ad(MarkerId::WatchError, Action::observe(Duration::ZERO)),
            ],
            RetryPolicy::Poll {
                delay: timings.claim_poll,
            },
        ))
        .stage(Stage::detect(
            CONFIRM_REWARD,
            vec![Probe::new(
                MarkerId::Ok,
                Action::click(ONE_SECOND),
                Transition::Finish { stop_target: false },
            )],
            RetryPolicy::Bounded {
                limit: timings.confirm_retries,
                delay: timings.confirm_retry_delay,
                resume: CONFIRM_REWARD,
                escalation: Escalation::Relaunch,
            },
        ))
        .build()
}
