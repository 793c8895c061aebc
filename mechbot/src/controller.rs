use {
    crate::{
        catalog::{Catalog, Marker, MarkerId},
        clock::Clock,
        config::Difficulty,
        input::Pointer,
        perception::{Locator, Point},
        stage::{
            Action, Escalation, ExitCode, MarkerRef, Probe, RetryPolicy, RunFlag, Stage,
            StageGraph, StageId, StageKind, Transition,
        },
    },
    std::collections::{BTreeMap, BTreeSet},
    thiserror::Error,
    tracing::{debug, error, info, warn},
};

/// Mutable state of one run. Dropped when the run ends or the client is
/// relaunched, so one-time flags and counters never outlive a run.
#[derive(Debug, Clone)]
pub struct RunContext {
    stage: StageId,
    difficulty: Difficulty,
    flags: BTreeSet<RunFlag>,
    misses: BTreeMap<StageId, u32>,
    visits: BTreeMap<StageId, u32>,
}

impl RunContext {
    pub fn new(initial: StageId, difficulty: Difficulty) -> Self {
        Self {
            stage: initial,
            difficulty,
            flags: BTreeSet::new(),
            misses: BTreeMap::new(),
            visits: BTreeMap::from([(initial, 1)]),
        }
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn has_flag(&self, flag: RunFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Consecutive misses of a bounded-retry stage since its last match.
    pub fn misses(&self, stage: StageId) -> u32 {
        self.misses.get(&stage).copied().unwrap_or(0)
    }

    /// Times the run has entered `stage`.
    pub fn visits(&self, stage: StageId) -> u32 {
        self.visits.get(&stage).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { stop_target: bool },
    Exit(ExitCode),
    Relaunch,
}

impl From<Escalation> for RunOutcome {
    fn from(escalation: Escalation) -> Self {
        match escalation {
            Escalation::Exit(code) => RunOutcome::Exit(code),
            Escalation::Relaunch => RunOutcome::Relaunch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("run is at undeclared stage {0}")]
    UnknownStage(StageId),
    #[error("marker {0} is not in the catalog")]
    MissingMarker(MarkerId),
}

pub struct Controller<'a> {
    graph: &'a StageGraph,
    catalog: &'a Catalog,
    locator: &'a mut dyn Locator,
    pointer: &'a mut dyn Pointer,
    clock: &'a dyn Clock,
}

impl<'a> Controller<'a> {
    pub fn new(
        graph: &'a StageGraph,
        catalog: &'a Catalog,
        locator: &'a mut dyn Locator,
        pointer: &'a mut dyn Pointer,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            graph,
            catalog,
            locator,
            pointer,
            clock,
        }
    }

    /// Runs stages until the flow finishes or escalates.
    pub fn run(&mut self, ctx: &mut RunContext) -> Result<RunOutcome, ControllerError> {
        loop {
            if let Some(outcome) = self.step(ctx)? {
                info!("run ended: {outcome:?}");
                return Ok(outcome);
            }
        }
    }

    /// Evaluates the current stage once.
    ///
    /// Returns `None` if the run goes on, possibly at another stage.
    pub fn step(&mut self, ctx: &mut RunContext) -> Result<Option<RunOutcome>, ControllerError> {
        let graph = self.graph;
        let stage = graph
            .get(ctx.stage)
            .ok_or(ControllerError::UnknownStage(ctx.stage))?;
        match &stage.kind {
            StageKind::Gate { flag, first, then } => {
                let target = if ctx.flags.insert(*flag) {
                    debug!(stage = %stage.id, "{flag} not set yet, setting it");
                    *first
                } else {
                    debug!(stage = %stage.id, "{flag} already set");
                    *then
                };
                Ok(self.enter(ctx, target))
            }
            StageKind::Detect { probes, on_miss } => {
                for probe in probes {
                    let marker = self.resolve(probe, ctx)?;
                    let result = self.locator.locate(&marker);
                    let Some(point) = result.location else {
                        continue;
                    };
                    info!(stage = %stage.id, "{} detected at {point}", marker.id);
                    ctx.misses.remove(&stage.id);
                    if let Err(err) = self.perform(&probe.action, point) {
                        error!(stage = %stage.id, "failed to click {}: {err:?}", marker.id);
                        return Ok(Some(RunOutcome::Relaunch));
                    }
                    return Ok(self.follow(ctx, stage, probe.next));
                }
                Ok(self.miss(ctx, stage, *on_miss))
            }
        }
    }

    fn resolve(&self, probe: &Probe, ctx: &RunContext) -> Result<Marker, ControllerError> {
        let id = match probe.marker {
            MarkerRef::Fixed(id) => id,
            MarkerRef::Difficulty => ctx.difficulty.marker(),
        };
        let marker = self
            .catalog
            .get(id)
            .ok_or(ControllerError::MissingMarker(id))?;
        Ok(match probe.threshold {
            Some(threshold) => marker.with_threshold(threshold),
            None => marker.clone(),
        })
    }

    fn perform(&mut self, action: &Action, point: Point) -> anyhow::Result<()> {
        if !action.dwell.is_zero() {
            debug!("waiting {:?}", action.dwell);
            self.clock.sleep(action.dwell);
        }
        for settle in &action.settles {
            self.pointer.click(point)?;
            self.clock.sleep(*settle);
        }
        Ok(())
    }

    fn follow(
        &mut self,
        ctx: &mut RunContext,
        stage: &Stage,
        transition: Transition,
    ) -> Option<RunOutcome> {
        match transition {
            Transition::Goto(target) => self.enter(ctx, target),
            Transition::Finish { stop_target } => {
                info!(stage = %stage.id, "flow finished");
                Some(RunOutcome::Completed { stop_target })
            }
            Transition::Escalate(escalation) => {
                warn!(stage = %stage.id, "escalating: {escalation:?}");
                Some(escalation.into())
            }
        }
    }

    fn miss(
        &mut self,
        ctx: &mut RunContext,
        stage: &Stage,
        policy: RetryPolicy,
    ) -> Option<RunOutcome> {
        match policy {
            RetryPolicy::BestEffort(transition) => {
                debug!(stage = %stage.id, "nothing detected, moving on");
                self.follow(ctx, stage, transition)
            }
            RetryPolicy::Bounded {
                limit,
                delay,
                resume,
                escalation,
            } => {
                let misses = ctx.misses.entry(stage.id).or_default();
                *misses += 1;
                if *misses > limit {
                    error!(
                        stage = %stage.id,
                        "nothing detected after {limit} retries, escalating: {escalation:?}"
                    );
                    ctx.misses.remove(&stage.id);
                    return Some(escalation.into());
                }
                debug!(
                    stage = %stage.id,
                    "nothing detected ({}/{limit}), retrying in {delay:?}",
                    *misses
                );
                self.clock.sleep(delay);
                self.enter(ctx, resume)
            }
            RetryPolicy::Poll { delay } => {
                debug!(stage = %stage.id, "still waiting, next check in {delay:?}");
                self.clock.sleep(delay);
                None
            }
            RetryPolicy::ZeroTolerance(escalation) => {
                error!(stage = %stage.id, "required marker not found, escalating: {escalation:?}");
                Some(escalation.into())
            }
        }
    }

    fn enter(&mut self, ctx: &mut RunContext, target: StageId) -> Option<RunOutcome> {
        if target == ctx.stage {
            return None;
        }
        let visits = ctx.visits.entry(target).or_default();
        *visits += 1;
        if let Some(limit) = self.graph.get(target).and_then(|stage| stage.visit_limit) {
            if *visits > limit.max {
                error!(
                    stage = %target,
                    "entered {} times, escalating: {:?}",
                    limit.max,
                    limit.escalation
                );
                return Some(limit.escalation.into());
            }
        }
        debug!("{} -> {}", ctx.stage, target);
        ctx.stage = target;
        None
    }
}
