use {
    super::{
        optional_click, reach_main_menu, required_click, FIVE_SECONDS, HALF_SECOND, ONE_SECOND,
        THREE_SECONDS, TWO_SECONDS,
    },
    crate::{
        catalog::MarkerId,
        config::Timings,
        stage::{
            Action, Escalation, ExitCode, GraphError, MarkerRef, Probe, RetryPolicy, RunFlag,
            Stage, StageGraph, StageId, Transition,
        },
    },
    std::time::Duration,
};

pub const WORKSHOP_MISSING: ExitCode = ExitCode(10);
pub const TEAMS_MISSING: ExitCode = ExitCode(11);
pub const TEAM_ENTRY_MISSING: ExitCode = ExitCode(12);
pub const SELECT_MISSING: ExitCode = ExitCode(13);
pub const BACK_MISSING: ExitCode = ExitCode(14);
pub const CAMPAIGN_MISSING: ExitCode = ExitCode(20);
pub const RESTORATION_MISSING: ExitCode = ExitCode(21);
pub const TARGET_MISSING: ExitCode = ExitCode(30);
pub const BATTLE_MISSING: ExitCode = ExitCode(31);

pub const TEAM_GATE: StageId = StageId("team-gate");
pub const WORKSHOP: StageId = StageId("workshop");
pub const WORKSHOP_POPUP: StageId = StageId("workshop-popup");
pub const TEAMS: StageId = StageId("teams");
pub const TEAM_ENTRY: StageId = StageId("team-entry");
pub const SELECT: StageId = StageId("select-team");
pub const BACK: StageId = StageId("back");
pub const CAMPAIGN: StageId = StageId("campaign");
pub const RESTORATION: StageId = StageId("restoration-of-earth");
pub const TARGET: StageId = StageId("target");
pub const DIFFICULTY: StageId = StageId("difficulty");
pub const BATTLE: StageId = StageId("battle");
pub const FUEL_CHECK: StageId = StageId("fuel-check");
pub const SPEED: StageId = StageId("speed");
pub const AUTO: StageId = StageId("auto");
pub const AWAIT_OUTCOME: StageId = StageId("await-outcome");
pub const VICTORY_CONTINUE: StageId = StageId("victory-continue");
pub const CLAIM_REWARDS: StageId = StageId("claim-rewards");
pub const CLAIM_CONFIRM: StageId = StageId("claim-confirm");
pub const ABORT_CONTINUE: StageId = StageId("abort-continue");
pub const ABORT_DISMISS: StageId = StageId("abort-dismiss");
pub const LOOP_DISMISS: StageId = StageId("loop-dismiss");

fn exit(code: ExitCode) -> Escalation {
    Escalation::Exit(code)
}

/// Out of fuel: the grind is over and the client is closed.
fn out_of_fuel() -> Probe {
    Probe::new(
        MarkerId::NotEnoughFuel,
        Action::observe(Duration::ZERO),
        Transition::Finish { stop_target: true },
    )
}

pub fn graph(timings: &Timings) -> Result<StageGraph, GraphError> {
    StageGraph::builder(super::DISMISS_CLOSE)
        .stages(reach_main_menu(timings, TEAM_GATE))
        .stage(Stage::gate(TEAM_GATE, RunFlag::TeamConfigured, WORKSHOP, CAMPAIGN))
        // Team setup, once per run.
        .stage(required_click(WORKSHOP, MarkerId::Workshop, TWO_SECONDS, WORKSHOP_POPUP, exit(WORKSHOP_MISSING)))
        .stage(optional_click(WORKSHOP_POPUP, MarkerId::X, TWO_SECONDS, TEAMS))
        .stage(required_click(TEAMS, MarkerId::Teams, ONE_SECOND, TEAM_ENTRY, exit(TEAMS_MISSING)))
        .stage(required_click(TEAM_ENTRY, MarkerId::SmacMoney, ONE_SECOND, SELECT, exit(TEAM_ENTRY_MISSING)))
        .stage(required_click(SELECT, MarkerId::Select, TWO_SECONDS, BACK, exit(SELECT_MISSING)))
        .stage(required_click(BACK, MarkerId::Back, TWO_SECONDS, CAMPAIGN, exit(BACK_MISSING)))
        // Campaign navigation.
        .stage(required_click(CAMPAIGN, MarkerId::Campaign, TWO_SECONDS, RESTORATION, exit(CAMPAIGN_MISSING)))
        .stage(required_click(
            RESTORATION,
            MarkerId::RestorationOfEarth,
            TWO_SECONDS,
            TARGET,
            exit(RESTORATION_MISSING),
        ))
        // Battle loop.
        .stage(required_click(TARGET, MarkerId::Od8, ONE_SECOND, DIFFICULTY, exit(TARGET_MISSING)))
        .stage(Stage::detect(
            DIFFICULTY,
            vec![Probe::new(
                MarkerRef::Difficulty,
                Action::click(HALF_SECOND),
                Transition::Goto(BATTLE),
            )],
            RetryPolicy::BestEffort(Transition::Goto(BATTLE)),
        ))
        .stage(required_click(BATTLE, MarkerId::Battle, TWO_SECONDS, FUEL_CHECK, exit(BATTLE_MISSING)))
        .stage(Stage::detect(
            FUEL_CHECK,
            vec![out_of_fuel()],
            RetryPolicy::BestEffort(Transition::Goto(SPEED)),
        ))
        .stage(optional_click(SPEED, MarkerId::Speed, HALF_SECOND, AUTO))
        .stage(optional_click(AUTO, MarkerId::Auto, HALF_SECOND, AWAIT_OUTCOME))
        .stage(Stage::detect(
            AWAIT_OUTCOME,
            vec![
                out_of_fuel(),
                Probe::new(
                    MarkerId::Victory,
                    Action::click(THREE_SECONDS),
                    Transition::Goto(VICTORY_CONTINUE),
                ),
                Probe::new(
                    MarkerId::Abort,
                    Action::click(THREE_SECONDS),
                    Transition::Goto(ABORT_CONTINUE),
                ),
            ],
            RetryPolicy::Poll {
                delay: timings.battle_poll,
            },
        ))
        .stage(optional_click(VICTORY_CONTINUE, MarkerId::Continue, TWO_SECONDS, CLAIM_REWARDS))
        .stage(Stage::detect(
            CLAIM_REWARDS,
            vec![Probe::new(
                MarkerId::ClaimRewards,
                Action::clicks([FIVE_SECONDS, HALF_SECOND, TWO_SECONDS]),
                Transition::Goto(CLAIM_CONFIRM),
            )],
            RetryPolicy::BestEffort(Transition::Goto(LOOP_DISMISS)),
        ))
        .stage(optional_click(CLAIM_CONFIRM, MarkerId::Ok2, TWO_SECONDS, LOOP_DISMISS))
        .stage(optional_click(ABORT_CONTINUE, MarkerId::Continue, TWO_SECONDS, ABORT_DISMISS))
        .stage(optional_click(ABORT_DISMISS, MarkerId::X, TWO_SECONDS, LOOP_DISMISS))
        .stage(optional_click(LOOP_DISMISS, MarkerId::X, TWO_SECONDS, TARGET))
        .build()
}
