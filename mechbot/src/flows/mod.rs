pub mod ad_reward;
pub mod grind;

use {
    crate::{
        catalog::MarkerId,
        config::Timings,
        stage::{Action, Escalation, GraphError, Probe, RetryPolicy, Stage, StageGraph, StageId, Transition},
    },
    std::time::Duration,
};

pub const HALF_SECOND: Duration = Duration::from_millis(500);
pub const ONE_SECOND: Duration = Duration::from_secs(1);
pub const TWO_SECONDS: Duration = Duration::from_secs(2);
pub const THREE_SECONDS: Duration = Duration::from_secs(3);
pub const FIVE_SECONDS: Duration = Duration::from_secs(5);

pub const DISMISS_CLOSE: StageId = StageId("dismiss-close");
pub const DISMISS_X: StageId = StageId("dismiss-x");
pub const MAIN_MENU: StageId = StageId("main-menu");

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, clap::ValueEnum)]
#[strum(serialize_all = "kebab-case")]
pub enum Flow {
    Grind,
    AdReward,
}

impl Flow {
    pub fn graph(self, timings: &Timings) -> Result<StageGraph, GraphError> {
        match self {
            Flow::Grind => grind::graph(timings),
            Flow::AdReward => ad_reward::graph(timings),
        }
    }
}

/// Clicks `marker` if it is on screen, then goes to `next` either way.
pub(crate) fn optional_click(id: StageId, marker: MarkerId, settle: Duration, next: StageId) -> Stage {
    Stage::detect(
        id,
        vec![Probe::new(marker, Action::click(settle), Transition::Goto(next))],
        RetryPolicy::BestEffort(Transition::Goto(next)),
    )
}

/// Clicks `marker` and goes to `next`; escalates if it is not on screen.
pub(crate) fn required_click(
    id: StageId,
    marker: MarkerId,
    settle: Duration,
    next: StageId,
    escalation: Escalation,
) -> Stage {
    Stage::detect(
        id,
        vec![Probe::new(marker, Action::click(settle), Transition::Goto(next))],
        RetryPolicy::ZeroTolerance(escalation),
    )
}

/// Startup dialogs are closed until the main menu shows up. Waiting for the
/// menu is bounded; the client is relaunched once the bound is exceeded.
pub(crate) fn reach_main_menu(timings: &Timings, next: StageId) -> [Stage; 3] {
    [
        optional_click(DISMISS_CLOSE, MarkerId::Close, TWO_SECONDS, DISMISS_X),
        optional_click(DISMISS_X, MarkerId::X, TWO_SECONDS, MAIN_MENU),
        Stage::detect(
            MAIN_MENU,
            vec![Probe::new(
                MarkerId::MainScreen,
                Action::observe(TWO_SECONDS),
                Transition::Goto(next),
            )],
            RetryPolicy::Bounded {
                limit: timings.main_menu_retries,
                delay: timings.main_menu_retry_delay,
                resume: DISMISS_CLOSE,
                escalation: Escalation::Relaunch,
            },
        ),
    ]
}
