use {
    crate::catalog::{MarkerId, Threshold},
    derive_more::Display,
    std::{
        collections::{BTreeMap, BTreeSet},
        time::Duration,
    },
    thiserror::Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct StageId(pub &'static str);

/// Per-run flags; every run starts with none of them set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum RunFlag {
    TeamConfigured,
}

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct ExitCode(pub u8);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const LAUNCH_FAILED: ExitCode = ExitCode(2);
    pub const RELAUNCH_LIMIT: ExitCode = ExitCode(3);

    pub fn code(self) -> i32 {
        self.0.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerRef {
    Fixed(MarkerId),
    /// Marker of the difficulty configured for the run.
    Difficulty,
}

impl From<MarkerId> for MarkerRef {
    fn from(id: MarkerId) -> Self {
        MarkerRef::Fixed(id)
    }
}

/// What to do with a detected marker.
///
/// The dwell is waited out first. Then the matched point is clicked once per
/// settle delay, each click followed by its delay.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Action {
    pub dwell: Duration,
    pub settles: Vec<Duration>,
}

impl Action {
    pub fn click(settle: Duration) -> Self {
        Self::clicks([settle])
    }

    pub fn clicks(settles: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            dwell: Duration::ZERO,
            settles: settles.into_iter().collect(),
        }
    }

    /// No click, only a pause.
    pub fn observe(settle: Duration) -> Self {
        Self {
            dwell: settle,
            settles: Vec::new(),
        }
    }

    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    pub fn click_count(&self) -> usize {
        self.settles.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Stop the client and end the run with this status.
    Exit(ExitCode),
    /// Stop the client, start it again and restart the flow with a fresh run.
    Relaunch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Goto(StageId),
    /// The flow is done. `stop_target` tells whether the client is stopped
    /// afterwards.
    Finish { stop_target: bool },
    Escalate(Escalation),
}

/// Reaction of a detect stage when none of its probes matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// The markers are optional; carry on.
    BestEffort(Transition),
    /// Wait and resume up to `limit` times, escalate on the next miss.
    Bounded {
        limit: u32,
        delay: Duration,
        resume: StageId,
        escalation: Escalation,
    },
    /// Wait and test the same stage again, forever.
    Poll { delay: Duration },
    /// Escalate on the first miss.
    ZeroTolerance(Escalation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub marker: MarkerRef,
    /// Replaces the catalog threshold of the marker for this probe.
    pub threshold: Option<Threshold>,
    pub action: Action,
    pub next: Transition,
}

impl Probe {
    pub fn new(marker: impl Into<MarkerRef>, action: Action, next: Transition) -> Self {
        Self {
            marker: marker.into(),
            threshold: None,
            action,
            next,
        }
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageKind {
    Detect {
        probes: Vec<Probe>,
        on_miss: RetryPolicy,
    },
    /// Goes to `first` and sets `flag` if the flag is not set yet, to `then`
    /// otherwise.
    Gate {
        flag: RunFlag,
        first: StageId,
        then: StageId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitLimit {
    pub max: u32,
    pub escalation: Escalation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub id: StageId,
    pub kind: StageKind,
    /// Bounds how many times a single run may enter the stage.
    pub visit_limit: Option<VisitLimit>,
}

impl Stage {
    pub fn detect(id: StageId, probes: Vec<Probe>, on_miss: RetryPolicy) -> Self {
        Self {
            id,
            kind: StageKind::Detect { probes, on_miss },
            visit_limit: None,
        }
    }

    pub fn gate(id: StageId, flag: RunFlag, first: StageId, then: StageId) -> Self {
        Self {
            id,
            kind: StageKind::Gate { flag, first, then },
            visit_limit: None,
        }
    }

    pub fn visit_limit(mut self, max: u32, escalation: Escalation) -> Self {
        self.visit_limit = Some(VisitLimit { max, escalation });
        self
    }

    /// Whether the stage waits or is bounded, so that a loop through it
    /// cannot spin without end.
    pub fn is_guarded(&self) -> bool {
        self.visit_limit.is_some()
            || matches!(
                self.kind,
                StageKind::Detect {
                    on_miss: RetryPolicy::Poll { .. } | RetryPolicy::Bounded { .. },
                    ..
                }
            )
    }

    /// Stages this one can hand control to, in declaration order, without
    /// duplicates.
    pub fn successors(&self) -> Vec<StageId> {
        let mut targets = Vec::new();
        match &self.kind {
            StageKind::Detect { probes, on_miss } => {
                for probe in probes {
                    if let Transition::Goto(target) = probe.next {
                        targets.push(target);
                    }
                }
                match *on_miss {
                    RetryPolicy::BestEffort(Transition::Goto(target)) => targets.push(target),
                    RetryPolicy::Bounded { resume, .. } => targets.push(resume),
                    RetryPolicy::Poll { .. } => targets.push(self.id),
                    RetryPolicy::BestEffort(_) | RetryPolicy::ZeroTolerance(_) => {}
                }
            }
            StageKind::Gate { first, then, .. } => {
                targets.push(*first);
                targets.push(*then);
            }
        }
        let mut seen = BTreeSet::new();
        targets.retain(|target| seen.insert(*target));
        targets
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("stage {0} is declared more than once")]
    DuplicateStage(StageId),
    #[error("initial stage {0} is not declared")]
    UnknownInitial(StageId),
    #[error("stage {from} refers to undeclared stage {to}")]
    UnknownStage { from: StageId, to: StageId },
    #[error("detect stage {0} has no probes")]
    NoProbes(StageId),
    #[error("stage {0} cannot be reached from the initial stage")]
    Unreachable(StageId),
    #[error("stage {0} is on a loop with no polling, retry bound or visit limit")]
    UnguardedCycle(StageId),
}

/// Validated flow graph.
#[derive(Debug, Clone)]
pub struct StageGraph {
    initial: StageId,
    stages: BTreeMap<StageId, Stage>,
}

impl StageGraph {
    pub fn builder(initial: StageId) -> StageGraphBuilder {
        StageGraphBuilder {
            initial,
            stages: Vec::new(),
        }
    }

    pub fn initial(&self) -> StageId {
        self.initial
    }

    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(&id)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.values()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Declared edges out of `id`; empty for unknown stages.
    pub fn successors(&self, id: StageId) -> Vec<StageId> {
        self.get(id).map(Stage::successors).unwrap_or_default()
    }

    /// Every marker some probe of the graph may test.
    pub fn markers(&self) -> BTreeSet<MarkerRef> {
        self.stages
            .values()
            .filter_map(|stage| match &stage.kind {
                StageKind::Detect { probes, .. } => Some(probes),
                StageKind::Gate { .. } => None,
            })
            .flatten()
            .map(|probe| probe.marker)
            .collect()
    }
}

pub struct StageGraphBuilder {
    initial: StageId,
    stages: Vec<Stage>,
}

impl StageGraphBuilder {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn build(self) -> Result<StageGraph, GraphError> {
        let mut stages = BTreeMap::new();
        for stage in self.stages {
            if let StageKind::Detect { probes, .. } = &stage.kind {
                if probes.is_empty() {
                    return Err(GraphError::NoProbes(stage.id));
                }
            }
            let id = stage.id;
            if stages.insert(id, stage).is_some() {
                return Err(GraphError::DuplicateStage(id));
            }
        }
        if !stages.contains_key(&self.initial) {
            return Err(GraphError::UnknownInitial(self.initial));
        }
        for stage in stages.values() {
            if let Some(to) = stage
                .successors()
                .into_iter()
                .find(|to| !stages.contains_key(to))
            {
                return Err(GraphError::UnknownStage { from: stage.id, to });
            }
        }

        let mut reached = BTreeSet::from([self.initial]);
        let mut pending = vec![self.initial];
        while let Some(id) = pending.pop() {
            for next in stages[&id].successors() {
                if reached.insert(next) {
                    pending.push(next);
                }
            }
        }
        if let Some(id) = stages.keys().find(|id| !reached.contains(id)) {
            return Err(GraphError::Unreachable(*id));
        }
        if let Some(id) = unguarded_cycle(&stages) {
            return Err(GraphError::UnguardedCycle(id));
        }

        Ok(StageGraph {
            initial: self.initial,
            stages,
        })
    }
}

/// A stage on some cycle made only of unguarded stages, if there is one.
fn unguarded_cycle(stages: &BTreeMap<StageId, Stage>) -> Option<StageId> {
    let unguarded = |id: &StageId| stages.get(id).is_some_and(|stage| !stage.is_guarded());
    let mut done = BTreeSet::new();
    for &start in stages.keys().filter(|id| unguarded(id)) {
        if done.contains(&start) {
            continue;
        }
        let mut on_path = BTreeSet::from([start]);
        let mut stack = vec![(start, stages[&start].successors().into_iter())];
        while let Some((id, successors)) = stack.last_mut() {
            let id = *id;
            match successors.find(|to| unguarded(to)) {
                Some(to) if on_path.contains(&to) => return Some(to),
                Some(to) if done.contains(&to) => {}
                Some(to) => {
                    on_path.insert(to);
                    stack.push((to, stages[&to].successors().into_iter()));
                }
                None => {
                    on_path.remove(&id);
                    done.insert(id);
                    stack.pop();
                }
            }
        }
    }
    None
}
