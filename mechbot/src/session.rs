use {
    crate::{
        catalog::Catalog,
        clock::Clock,
        config::Config,
        controller::{Controller, RunContext, RunOutcome},
        input::Pointer,
        perception::Locator,
        stage::{ExitCode, StageGraph},
        supervisor::{ProcessControl, Supervisor},
    },
    tracing::{error, info, warn},
};

/// Capabilities a session drives.
pub struct Ports<'a> {
    pub locator: &'a mut dyn Locator,
    pub pointer: &'a mut dyn Pointer,
    pub processes: &'a mut dyn ProcessControl,
    pub clock: &'a dyn Clock,
}

pub struct Session<'a> {
    graph: &'a StageGraph,
    catalog: &'a Catalog,
    config: &'a Config,
    ports: Ports<'a>,
}

impl<'a> Session<'a> {
    pub fn new(
        graph: &'a StageGraph,
        catalog: &'a Catalog,
        config: &'a Config,
        ports: Ports<'a>,
    ) -> Self {
        Self {
            graph,
            catalog,
            config,
            ports,
        }
    }

    fn supervisor(&mut self) -> Supervisor<'_> {
        Supervisor::new(
            &mut *self.ports.processes,
            self.ports.clock,
            self.config.timings.stop_timeout,
            self.config.timings.launch_settle,
        )
    }

    fn stop_target(&mut self) {
        let name = self.config.app_name.clone();
        let report = self.supervisor().ensure_stopped(&name);
        if !report.is_success() {
            warn!("{name:?} may still be running: {report:?}");
        }
    }

    /// Runs the flow, relaunching the client as often as it asks for, and
    /// returns the status the process should exit with.
    ///
    /// The client is always stopped before a relaunch and before any
    /// non-success exit.
    pub fn run(&mut self) -> anyhow::Result<ExitCode> {
        let mut launches = 0u32;
        loop {
            let name = self.config.app_name.clone();
            let report = self.supervisor().ensure_stopped(&name);
            if !report.is_noop() {
                self.ports.clock.sleep(self.config.timings.kill_settle);
            }
            if let Some(limit) = self.config.relaunch_limit {
                if launches > limit {
                    error!("giving up after {limit} relaunch(es)");
                    return Ok(ExitCode::RELAUNCH_LIMIT);
                }
            }

            let path = self.config.app_path.clone();
            if let Err(err) = self.supervisor().launch(&path) {
                error!("{err:?}");
                return Ok(ExitCode::LAUNCH_FAILED);
            }
            launches += 1;

            let mut ctx = RunContext::new(self.graph.initial(), self.config.difficulty);
            let result = Controller::new(
                self.graph,
                self.catalog,
                &mut *self.ports.locator,
                &mut *self.ports.pointer,
                self.ports.clock,
            )
            .run(&mut ctx);
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.stop_target();
                    return Err(anyhow::Error::new(err).context("flow stopped unexpectedly"));
                }
            };

            match outcome {
                RunOutcome::Relaunch => {
                    warn!("restarting the client");
                }
                RunOutcome::Exit(code) => {
                    self.stop_target();
                    error!("exiting with code {code}");
                    return Ok(code);
                }
                RunOutcome::Completed { stop_target } => {
                    if stop_target {
                        self.stop_target();
                    }
                    info!("done");
                    return Ok(ExitCode::SUCCESS);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            catalog::MarkerId,
            stage::{Action, Escalation, Probe, RetryPolicy, Stage, StageId, Transition},
            testing::{FakeProcesses, RecordingPointer, ScriptedLocator, VirtualClock},
        },
        std::{path::PathBuf, time::Duration},
    };

    const ONLY: StageId = StageId("only");

    fn config() -> Config {
        Config {
            app_path: PathBuf::from("/games/Super Mechs.exe"),
            ..Config::default()
        }
    }

    fn one_stage(next: Transition, on_miss: RetryPolicy) -> StageGraph {
        StageGraph::builder(ONLY)
            .stage(Stage::detect(
                ONLY,
                vec![Probe::new(MarkerId::Ok, Action::click(Duration::ZERO), next)],
                on_miss,
            ))
            .build()
            .unwrap()
    }

    struct Fakes {
        locator: ScriptedLocator,
        pointer: RecordingPointer,
        processes: FakeProcesses,
        clock: VirtualClock,
    }

    impl Fakes {
        fn new() -> Self {
            Self {
                locator: ScriptedLocator::new(),
                pointer: RecordingPointer::new(),
                processes: FakeProcesses::new(),
                clock: VirtualClock::new(),
            }
        }

        fn run(&mut self, graph: &StageGraph, config: &Config) -> ExitCode {
            self.run_with(graph, &Catalog::from_root("/resources"), config)
                .unwrap()
        }

        fn run_with(
            &mut self,
            graph: &StageGraph,
            catalog: &Catalog,
            config: &Config,
        ) -> anyhow::Result<ExitCode> {
            Session::new(
                graph,
                catalog,
                config,
                Ports {
                    locator: &mut self.locator,
                    pointer: &mut self.pointer,
                    processes: &mut self.processes,
                    clock: &self.clock,
                },
            )
            .run()
        }
    }

    #[test]
    fn stale_client_is_stopped_before_launch() {
        let graph = one_stage(
            Transition::Finish { stop_target: false },
            RetryPolicy::ZeroTolerance(Escalation::Relaunch),
        );
        let mut fakes = Fakes::new();
        fakes.processes.add("Super Mechs.exe", 5);
        fakes.locator.show(MarkerId::Ok);

        assert_eq!(fakes.run(&graph, &config()), ExitCode::SUCCESS);
        assert_eq!(fakes.processes.signals(), vec!["terminate 5".to_string()]);
        assert_eq!(fakes.processes.spawned().len(), 1);
        // Kill settle, launch settle.
        assert_eq!(
            fakes.clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(13), Duration::ZERO]
        );
        // The client stays up after a completion that does not ask to stop it.
        assert_eq!(fakes.processes.find("Super Mechs.exe").len(), 1);
    }

    #[test]
    fn declared_failure_stops_client_and_exits() {
        let graph = one_stage(
            Transition::Finish { stop_target: true },
            RetryPolicy::ZeroTolerance(Escalation::Exit(ExitCode(20))),
        );
        let mut fakes = Fakes::new();

        assert_eq!(fakes.run(&graph, &config()), ExitCode(20));
        assert_eq!(fakes.processes.spawned().len(), 1);
        assert!(fakes.processes.running_pids().is_empty());
    }

    #[test]
    fn relaunch_starts_a_fresh_run() {
        let graph = one_stage(
            Transition::Finish { stop_target: true },
            RetryPolicy::ZeroTolerance(Escalation::Relaunch),
        );
        let mut fakes = Fakes::new();
        fakes.locator.script(MarkerId::Ok, [0.0, 0.0]).show(MarkerId::Ok);

        assert_eq!(fakes.run(&graph, &config()), ExitCode::SUCCESS);
        assert_eq!(fakes.processes.spawned().len(), 3);
        assert!(fakes.processes.running_pids().is_empty());
        assert_eq!(
            fakes.processes.signals(),
            vec![
                "terminate 1000".to_string(),
                "terminate 1001".to_string(),
                "terminate 1002".to_string(),
            ]
        );
    }

    #[test]
    fn relaunch_limit_is_enforced() {
        let graph = one_stage(
            Transition::Finish { stop_target: true },
            RetryPolicy::ZeroTolerance(Escalation::Relaunch),
        );
        let mut fakes = Fakes::new();
        let config = Config {
            relaunch_limit: Some(2),
            ..config()
        };

        assert_eq!(fakes.run(&graph, &config), ExitCode::RELAUNCH_LIMIT);
        assert_eq!(fakes.processes.spawned().len(), 3);
        assert!(fakes.processes.running_pids().is_empty());
    }

    #[test]
    fn launch_failure_has_its_own_code() {
        let graph = one_stage(
            Transition::Finish { stop_target: true },
            RetryPolicy::ZeroTolerance(Escalation::Relaunch),
        );
        let mut fakes = Fakes::new();
        fakes.processes.fail_spawns();

        assert_eq!(fakes.run(&graph, &config()), ExitCode::LAUNCH_FAILED);
        assert!(fakes.locator.queries().is_empty());
    }

    #[test]
    fn controller_failure_stops_client() {
        let graph = one_stage(
            Transition::Finish { stop_target: true },
            RetryPolicy::ZeroTolerance(Escalation::Relaunch),
        );
        let catalog = Catalog::from_root("/resources").without(MarkerId::Ok);
        let mut fakes = Fakes::new();
        fakes.locator.show(MarkerId::Ok);

        let err = fakes.run_with(&graph, &catalog, &config()).unwrap_err();
        assert!(err.to_string().contains("flow stopped unexpectedly"));
        assert_eq!(fakes.processes.spawned().len(), 1);
        assert!(fakes.processes.running_pids().is_empty());
        assert!(fakes.locator.queries().is_empty());
    }
}
