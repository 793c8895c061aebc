pub mod catalog;
pub mod clock;
pub mod config;
pub mod controller;
pub mod flows;
pub mod input;
pub mod matching;
pub mod perception;
pub mod session;
pub mod stage;
pub mod supervisor;
pub mod testing;

pub use crate::{
    catalog::{Catalog, Marker, MarkerId, Threshold},
    config::{Config, Difficulty},
    controller::{Controller, RunContext, RunOutcome},
    flows::Flow,
    perception::{Locator, MatchResult, Perception, Point},
    session::{Ports, Session},
    stage::{ExitCode, StageGraph},
    supervisor::{Supervisor, SystemProcesses},
};
