use {
    mechbot::{
        catalog::Catalog,
        config::Config,
        flows::Flow,
        perception::Locator,
        session::{Ports, Session},
        stage::ExitCode,
        testing::{FakeProcesses, RecordingPointer, ScriptedLocator, VirtualClock},
    },
    std::path::PathBuf,
};

pub const APP_NAME: &str = "Super Mechs.exe";

pub fn config() -> Config {
    Config {
        app_path: PathBuf::from("/home/pilot/AppData/Local/SuperMechs/Super Mechs.exe"),
        ..Config::default()
    }
}

/// Everything a session touches, observable after the run.
pub struct World<L = ScriptedLocator> {
    pub locator: L,
    pub pointer: RecordingPointer,
    pub processes: FakeProcesses,
    pub clock: VirtualClock,
}

impl World {
    pub fn new() -> Self {
        Self::with_locator(ScriptedLocator::new())
    }
}

impl<L: Locator> World<L> {
    pub fn with_locator(locator: L) -> Self {
        Self {
            locator,
            pointer: RecordingPointer::new(),
            processes: FakeProcesses::new(),
            clock: VirtualClock::new(),
        }
    }

    pub fn run(&mut self, flow: Flow, catalog: &Catalog, config: &Config) -> ExitCode {
        let graph = flow.graph(&config.timings).unwrap();
        Session::new(
            &graph,
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
        .unwrap()
    }

    pub fn client_running(&mut self) -> bool {
        use mechbot::supervisor::ProcessControl;
        !self.processes.find(APP_NAME).is_empty()
    }
}
