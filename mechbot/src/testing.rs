use {
    crate::{
        catalog::{Marker, MarkerId},
        clock::Clock,
        input::Pointer,
        perception::{Locator, MatchResult, Point},
        supervisor::{ProcessControl, ProcessError, ProcessHandle},
    },
    anyhow::bail,
    std::{
        cell::{Cell, RefCell},
        collections::{BTreeMap, VecDeque},
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Clock that only records how long the caller asked to wait.
#[derive(Debug, Default)]
pub struct VirtualClock {
    elapsed: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for VirtualClock {
    fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Screen whose content is described per marker as confidences.
///
/// Scripted confidences are consumed one per query before falling back to
/// the persistent ones; markers never shown report 0.
#[derive(Debug, Default)]
pub struct ScriptedLocator {
    shown: BTreeMap<MarkerId, f32>,
    scripts: BTreeMap<MarkerId, VecDeque<f32>>,
    queries: Vec<MarkerId>,
}

impl ScriptedLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, marker: MarkerId) -> &mut Self {
        self.show_with(marker, 1.0)
    }

    pub fn show_all(&mut self, markers: impl IntoIterator<Item = MarkerId>) -> &mut Self {
        for marker in markers {
            self.show(marker);
        }
        self
    }

    pub fn show_with(&mut self, marker: MarkerId, confidence: f32) -> &mut Self {
        self.shown.insert(marker, confidence);
        self
    }

    pub fn hide(&mut self, marker: MarkerId) -> &mut Self {
        self.shown.remove(&marker);
        self
    }

    /// Queues confidences returned by the next queries for `marker`.
    pub fn script(&mut self, marker: MarkerId, confidences: impl IntoIterator<Item = f32>) -> &mut Self {
        self.scripts.entry(marker).or_default().extend(confidences);
        self
    }

    pub fn queries(&self) -> &[MarkerId] {
        &self.queries
    }

    pub fn query_count(&self, marker: MarkerId) -> usize {
        self.queries.iter().filter(|&&query| query == marker).count()
    }

    /// Where a found marker is reported; distinct per marker.
    pub fn position_of(marker: MarkerId) -> Point {
        Point::new(100 + 10 * marker as i32, 50)
    }
}

impl Locator for ScriptedLocator {
    fn locate(&mut self, marker: &Marker) -> MatchResult {
        self.queries.push(marker.id);
        let confidence = self
            .scripts
            .get_mut(&marker.id)
            .and_then(|script| script.pop_front())
            .or_else(|| self.shown.get(&marker.id).copied())
            .unwrap_or(0.0);
        MatchResult {
            location: marker
                .threshold
                .accepts(confidence)
                .then(|| Self::position_of(marker.id)),
            confidence,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingPointer {
    clicks: Vec<Point>,
    broken: bool,
}

impl RecordingPointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent click fails.
    pub fn broken() -> Self {
        Self {
            clicks: Vec::new(),
            broken: true,
        }
    }

    pub fn clicks(&self) -> &[Point] {
        &self.clicks
    }

    pub fn clicks_on(&self, marker: MarkerId) -> usize {
        let at = ScriptedLocator::position_of(marker);
        self.clicks.iter().filter(|&&click| click == at).count()
    }
}

impl Pointer for RecordingPointer {
    fn click(&mut self, at: Point) -> anyhow::Result<()> {
        if self.broken {
            bail!("input device unavailable");
        }
        self.clicks.push(at);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Temper {
    /// Exits when asked.
    Cooperative,
    /// Ignores termination requests, dies when killed.
    Stubborn,
    /// Survives everything.
    Unkillable,
}

#[derive(Debug)]
struct FakeProcess {
    name: String,
    pid: u32,
    temper: Temper,
}

/// Process table kept in memory.
#[derive(Debug)]
pub struct FakeProcesses {
    running: Vec<FakeProcess>,
    signals: Vec<String>,
    spawned: Vec<PathBuf>,
    next_pid: u32,
    spawn_fails: bool,
}

impl Default for FakeProcesses {
    fn default() -> Self {
        Self {
            running: Vec::new(),
            signals: Vec::new(),
            spawned: Vec::new(),
            next_pid: 1000,
            spawn_fails: false,
        }
    }
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: &str, pid: u32, temper: Temper) {
        self.running.push(FakeProcess {
            name: name.into(),
            pid,
            temper,
        });
    }

    pub fn add(&mut self, name: &str, pid: u32) {
        self.insert(name, pid, Temper::Cooperative);
    }

    pub fn add_stubborn(&mut self, name: &str, pid: u32) {
        self.insert(name, pid, Temper::Stubborn);
    }

    pub fn add_unkillable(&mut self, name: &str, pid: u32) {
        self.insert(name, pid, Temper::Unkillable);
    }

    pub fn fail_spawns(&mut self) {
        self.spawn_fails = true;
    }

    /// Termination requests and kills, in order, as `"terminate <pid>"` / `"kill <pid>"`.
    pub fn signals(&self) -> Vec<String> {
        self.signals.clone()
    }

    pub fn spawned(&self) -> &[PathBuf] {
        &self.spawned
    }

    pub fn running_pids(&self) -> Vec<u32> {
        self.running.iter().map(|process| process.pid).collect()
    }

    fn position(&self, process: &ProcessHandle) -> Option<usize> {
        self.running.iter().position(|p| p.pid == process.pid)
    }
}

impl ProcessControl for FakeProcesses {
    fn find(&mut self, name: &str) -> Vec<ProcessHandle> {
        let mut found: Vec<_> = self
            .running
            .iter()
            .filter(|process| process.name.eq_ignore_ascii_case(name))
            .map(|process| ProcessHandle {
                name: process.name.clone(),
                pid: process.pid,
            })
            .collect();
        found.sort_by_key(|process| process.pid);
        found
    }

    fn terminate(&mut self, process: &ProcessHandle) -> Result<(), ProcessError> {
        self.signals.push(format!("terminate {}", process.pid));
        let index = self.position(process).ok_or(ProcessError::Gone)?;
        if self.running[index].temper == Temper::Cooperative {
            self.running.remove(index);
        }
        Ok(())
    }

    fn kill(&mut self, process: &ProcessHandle) -> Result<(), ProcessError> {
        self.signals.push(format!("kill {}", process.pid));
        let index = self.position(process).ok_or(ProcessError::Gone)?;
        if self.running[index].temper == Temper::Unkillable {
            return Err(ProcessError::Refused);
        }
        self.running.remove(index);
        Ok(())
    }

    fn is_running(&mut self, process: &ProcessHandle) -> bool {
        self.position(process).is_some()
    }

    fn spawn(&mut self, path: &Path) -> anyhow::Result<u32> {
        if self.spawn_fails {
            bail!("failed to start {:?}", path);
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pid = self.next_pid;
        self.next_pid += 1;
        self.insert(&name, pid, Temper::Cooperative);
        self.spawned.push(path.to_path_buf());
        Ok(pid)
    }
}
