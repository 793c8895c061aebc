use {
    crate::clock::Clock,
    anyhow::Context as _,
    std::{path::Path, process::Command, time::Duration},
    sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System},
    thiserror::Error,
    tracing::{debug, info, warn},
};

/// Interval between checks whether a terminated process has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub name: String,
    pub pid: u32,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process has already exited")]
    Gone,
    #[error("the system refused to signal the process")]
    Refused,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub trait ProcessControl {
    /// Running processes whose name equals `name`, ignoring ASCII case.
    fn find(&mut self, name: &str) -> Vec<ProcessHandle>;
    /// Asks the process to exit on its own.
    fn terminate(&mut self, process: &ProcessHandle) -> Result<(), ProcessError>;
    /// Ends the process without its cooperation.
    fn kill(&mut self, process: &ProcessHandle) -> Result<(), ProcessError>;
    fn is_running(&mut self, process: &ProcessHandle) -> bool;
    /// Starts the executable detached from this process and returns its pid.
    fn spawn(&mut self, path: &Path) -> anyhow::Result<u32>;
}

/// Process table of the local machine.
pub struct SystemProcesses {
    system: System,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn refresh_one(&mut self, pid: Pid) -> Option<&sysinfo::Process> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .filter(|process| process.status() != ProcessStatus::Zombie)
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SystemProcesses {
    fn find(&mut self, name: &str) -> Vec<ProcessHandle> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let mut found: Vec<_> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| process.status() != ProcessStatus::Zombie)
            .filter_map(|(pid, process)| {
                let process_name = process.name().to_string_lossy();
                process_name
                    .eq_ignore_ascii_case(name)
                    .then(|| ProcessHandle {
                        name: process_name.into_owned(),
                        pid: pid.as_u32(),
                    })
            })
            .collect();
        found.sort_by_key(|process| process.pid);
        found
    }

    fn terminate(&mut self, process: &ProcessHandle) -> Result<(), ProcessError> {
        let target = self
            .refresh_one(Pid::from_u32(process.pid))
            .ok_or(ProcessError::Gone)?;
        match target.kill_with(Signal::Term) {
            Some(true) => Ok(()),
            Some(false) => Err(ProcessError::Refused),
            // No graceful signal on this platform.
            None => {
                debug!(pid = process.pid, "graceful termination unsupported, killing");
                if target.kill() {
                    Ok(())
                } else {
                    Err(ProcessError::Refused)
                }
            }
        }
    }

    fn kill(&mut self, process: &ProcessHandle) -> Result<(), ProcessError> {
        let target = self
            .refresh_one(Pid::from_u32(process.pid))
            .ok_or(ProcessError::Gone)?;
        if target.kill() {
            Ok(())
        } else {
            Err(ProcessError::Refused)
        }
    }

    fn is_running(&mut self, process: &ProcessHandle) -> bool {
        self.refresh_one(Pid::from_u32(process.pid)).is_some()
    }

    fn spawn(&mut self, path: &Path) -> anyhow::Result<u32> {
        let mut command = Command::new(path);
        if let Some(dir) = path.parent() {
            command.current_dir(dir);
        }
        let child = command
            .spawn()
            .with_context(|| format!("failed to start {:?}", path))?;
        Ok(child.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReport {
    /// No matching process existed; nothing was done.
    NotRunning,
    Stopped { pids: Vec<u32> },
    /// Some processes could not be stopped even forcefully.
    Incomplete {
        stopped: Vec<u32>,
        survivors: Vec<u32>,
    },
}

impl StopReport {
    pub fn is_noop(&self) -> bool {
        matches!(self, StopReport::NotRunning)
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, StopReport::Incomplete { .. })
    }
}

pub struct Supervisor<'a> {
    processes: &'a mut dyn ProcessControl,
    clock: &'a dyn Clock,
    stop_timeout: Duration,
    launch_settle: Duration,
}

impl<'a> Supervisor<'a> {
    pub fn new(
        processes: &'a mut dyn ProcessControl,
        clock: &'a dyn Clock,
        stop_timeout: Duration,
        launch_settle: Duration,
    ) -> Self {
        Self {
            processes,
            clock,
            stop_timeout,
            launch_settle,
        }
    }

    /// Stops every process named `name`.
    ///
    /// Each one is asked to exit and given `stop_timeout` to do so before it is
    /// killed. Faults on individual processes are logged and never abort the
    /// sweep.
    pub fn ensure_stopped(&mut self, name: &str) -> StopReport {
        let found = self.processes.find(name);
        if found.is_empty() {
            debug!("no instances of {name:?} are running");
            return StopReport::NotRunning;
        }
        let mut stopped = Vec::new();
        let mut survivors = Vec::new();
        for process in &found {
            if self.stop_one(process) {
                stopped.push(process.pid);
            } else {
                survivors.push(process.pid);
            }
        }
        if survivors.is_empty() {
            info!(
                "terminated {} instance(s) of {name:?}: {stopped:?}",
                stopped.len()
            );
            StopReport::Stopped { pids: stopped }
        } else {
            warn!("failed to terminate {name:?} with pid(s) {survivors:?}");
            StopReport::Incomplete { stopped, survivors }
        }
    }

    fn stop_one(&mut self, process: &ProcessHandle) -> bool {
        match self.processes.terminate(process) {
            Ok(()) => {}
            Err(ProcessError::Gone) => return true,
            Err(err) => warn!(pid = process.pid, "failed to terminate {:?}: {err}", process.name),
        }
        if self.wait_for_exit(process, self.stop_timeout) {
            return true;
        }
        warn!(
            pid = process.pid,
            "{:?} hasn't exited (waited for {:?}), killing",
            process.name,
            self.stop_timeout
        );
        match self.processes.kill(process) {
            Ok(()) | Err(ProcessError::Gone) => {}
            Err(err) => warn!(pid = process.pid, "failed to kill {:?}: {err}", process.name),
        }
        self.wait_for_exit(process, EXIT_POLL_INTERVAL)
    }

    fn wait_for_exit(&mut self, process: &ProcessHandle, timeout: Duration) -> bool {
        let mut waited = Duration::ZERO;
        loop {
            if !self.processes.is_running(process) {
                return true;
            }
            if waited >= timeout {
                return false;
            }
            self.clock.sleep(EXIT_POLL_INTERVAL);
            waited += EXIT_POLL_INTERVAL;
        }
    }

    /// Starts the client and waits for it to initialize.
    pub fn launch(&mut self, path: &Path) -> anyhow::Result<u32> {
        info!("opening {:?}", path);
        let pid = self.processes.spawn(path)?;
        debug!(pid, "waiting {:?} for the client to load", self.launch_settle);
        self.clock.sleep(self.launch_settle);
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{FakeProcesses, VirtualClock},
    };

    const NAME: &str = "Super Mechs.exe";

    fn supervisor<'a>(processes: &'a mut FakeProcesses, clock: &'a VirtualClock) -> Supervisor<'a> {
        Supervisor::new(
            processes,
            clock,
            Duration::from_secs(5),
            Duration::from_secs(13),
        )
    }

    #[test]
    fn stopping_absent_process_is_a_noop() {
        let mut processes = FakeProcesses::new();
        processes.add("explorer.exe", 1);
        let clock = VirtualClock::new();

        let report = supervisor(&mut processes, &clock).ensure_stopped(NAME);
        assert_eq!(report, StopReport::NotRunning);
        assert!(report.is_noop());
        assert!(processes.signals().is_empty());
        assert_eq!(clock.elapsed(), Duration::ZERO);

        let again = supervisor(&mut processes, &clock).ensure_stopped(NAME);
        assert_eq!(again, StopReport::NotRunning);
    }

    #[test]
    fn cooperative_process_is_terminated_without_kill() {
        let mut processes = FakeProcesses::new();
        processes.add(NAME, 42);
        let clock = VirtualClock::new();

        let report = supervisor(&mut processes, &clock).ensure_stopped("super mechs.EXE");
        assert_eq!(report, StopReport::Stopped { pids: vec![42] });
        assert_eq!(processes.signals(), vec!["terminate 42".to_string()]);
        assert!(processes.find(NAME).is_empty());
    }

    #[test]
    fn stubborn_process_is_killed_after_timeout() {
        let mut processes = FakeProcesses::new();
        processes.add_stubborn(NAME, 7);
        let clock = VirtualClock::new();

        let report = supervisor(&mut processes, &clock).ensure_stopped(NAME);
        assert_eq!(report, StopReport::Stopped { pids: vec![7] });
        assert_eq!(
            processes.signals(),
            vec!["terminate 7".to_string(), "kill 7".to_string()]
        );
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn unkillable_process_is_reported() {
        let mut processes = FakeProcesses::new();
        processes.add_unkillable(NAME, 9);
        processes.add(NAME, 10);
        let clock = VirtualClock::new();

        let report = supervisor(&mut processes, &clock).ensure_stopped(NAME);
        assert_eq!(
            report,
            StopReport::Incomplete {
                stopped: vec![10],
                survivors: vec![9],
            }
        );
        assert!(!report.is_success());
    }

    #[test]
    fn launch_spawns_and_settles() {
        let mut processes = FakeProcesses::new();
        let clock = VirtualClock::new();

        let pid = supervisor(&mut processes, &clock)
            .launch(Path::new("C:/game/Super Mechs.exe"))
            .unwrap();
        assert_eq!(processes.find(NAME).len(), 1);
        assert_eq!(processes.find(NAME)[0].pid, pid);
        assert_eq!(clock.elapsed(), Duration::from_secs(13));
    }

    #[test]
    fn launch_failure_is_an_error() {
        let mut processes = FakeProcesses::new();
        processes.fail_spawns();
        let clock = VirtualClock::new();

        assert!(supervisor(&mut processes, &clock)
            .launch(Path::new("missing.exe"))
            .is_err());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}
