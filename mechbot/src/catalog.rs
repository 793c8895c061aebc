use {
    anyhow::{bail, Context as _},
    serde::Serialize,
    std::{
        collections::BTreeMap,
        env,
        path::{Path, PathBuf},
        str::FromStr,
    },
    strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr},
    thiserror::Error,
    tracing::{debug, info, warn},
};

/// Overrides the resource root lookup.
pub const RESOURCES_ENV_VAR: &str = "MECHBOT_RESOURCES";
const RESOURCES_DIR_NAME: &str = "resources";
const TEMPLATE_EXTENSION: &str = "png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerCategory {
    /// Clickable controls.
    #[strum(serialize = "buttons")]
    Button,
    /// Whole screens or large panels that identify a state.
    #[strum(serialize = "screens")]
    Screen,
}

impl MarkerCategory {
    pub fn dir_name(self) -> &'static str {
        match self {
            MarkerCategory::Button => "buttons",
            MarkerCategory::Screen => "screens",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum MarkerId {
    #[strum(serialize = "ABORT")]
    Abort,
    #[strum(serialize = "AUTO")]
    Auto,
    #[strum(serialize = "BACK")]
    Back,
    #[strum(serialize = "BATTLE")]
    Battle,
    #[strum(serialize = "CAMPAIGN")]
    Campaign,
    #[strum(serialize = "CLAIM REWARD")]
    ClaimReward,
    #[strum(serialize = "CLOSE")]
    Close,
    #[strum(serialize = "CONTINUE")]
    Continue,
    #[strum(serialize = "HARD")]
    Hard,
    #[strum(serialize = "INSANE")]
    Insane,
    #[strum(serialize = "OD8")]
    Od8,
    #[strum(serialize = "OK")]
    Ok,
    #[strum(serialize = "OK2")]
    Ok2,
    #[strum(serialize = "RIGHT")]
    Right,
    #[strum(serialize = "RIGHT PRESSED")]
    RightPressed,
    #[strum(serialize = "SELECT")]
    Select,
    #[strum(serialize = "SMAC-MONEY")]
    SmacMoney,
    #[strum(serialize = "SPEED")]
    Speed,
    #[strum(serialize = "STORE")]
    Store,
    #[strum(serialize = "TEAMS")]
    Teams,
    #[strum(serialize = "WATCH NOW")]
    WatchNow,
    #[strum(serialize = "WORKSHOP")]
    Workshop,
    #[strum(serialize = "X")]
    X,
    #[strum(serialize = "ClaimRewards")]
    ClaimRewards,
    #[strum(serialize = "MainScreen")]
    MainScreen,
    #[strum(serialize = "NotEnoughFuel")]
    NotEnoughFuel,
    #[strum(serialize = "RestorationOfEarth")]
    RestorationOfEarth,
    #[strum(serialize = "Victory")]
    Victory,
    #[strum(serialize = "WatchError")]
    WatchError,
}

impl MarkerId {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn category(self) -> MarkerCategory {
        match self {
            MarkerId::ClaimRewards
            | MarkerId::MainScreen
            | MarkerId::NotEnoughFuel
            | MarkerId::RestorationOfEarth
            | MarkerId::Victory
            | MarkerId::WatchError => MarkerCategory::Screen,
            _ => MarkerCategory::Button,
        }
    }

    /// Thresholds tuned against the stock client. The difficulty buttons differ
    /// only slightly between their selected and unselected looks, hence the
    /// stricter values.
    pub fn default_threshold(self) -> Threshold {
        match self {
            MarkerId::Hard => Threshold::EXACT,
            MarkerId::Insane | MarkerId::Auto => Threshold::STRICT,
            _ => Threshold::DEFAULT,
        }
    }

    /// Template path relative to the resource root.
    pub fn relative_path(self) -> PathBuf {
        Path::new(self.category().dir_name())
            .join(format!("{}.{}", self.name(), TEMPLATE_EXTENSION))
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("match threshold {0} is outside of (0, 1]")]
pub struct InvalidThreshold(pub f32);

/// Minimal correlation score in (0, 1] that counts as a match.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, derive_more::Display)]
pub struct Threshold(f32);

impl Threshold {
    pub const DEFAULT: Threshold = Threshold(0.8);
    pub const STRICT: Threshold = Threshold(0.95);
    pub const EXACT: Threshold = Threshold(1.0);

    pub fn new(value: f32) -> Result<Self, InvalidThreshold> {
        if value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(InvalidThreshold(value))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn accepts(self, confidence: f32) -> bool {
        confidence >= self.0
    }
}

impl TryFrom<f32> for Threshold {
    type Error = InvalidThreshold;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: MarkerId,
    pub template: PathBuf,
    pub threshold: Threshold,
}

impl Marker {
    pub fn with_threshold(&self, threshold: Threshold) -> Self {
        Self {
            threshold,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    markers: BTreeMap<MarkerId, Marker>,
}

impl Catalog {
    /// Builds the marker table under `root`.
    ///
    /// `overrides` maps marker names (as in the template file names) to
    /// thresholds. Unknown names and out-of-range values are rejected; missing
    /// template files are only reported.
    pub fn load(root: impl Into<PathBuf>, overrides: &BTreeMap<String, f32>) -> anyhow::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("resource root {:?} is not a directory", root);
        }
        for category in [MarkerCategory::Button, MarkerCategory::Screen] {
            let dir = root.join(category.dir_name());
            if !dir.is_dir() {
                warn!("{} directory is missing: {:?}", category, dir);
            }
        }

        let mut thresholds = BTreeMap::new();
        for (name, value) in overrides {
            let id = MarkerId::from_str(name)
                .with_context(|| format!("unknown marker in threshold overrides: {name:?}"))?;
            let threshold = Threshold::new(*value)
                .with_context(|| format!("invalid threshold override for {id}"))?;
            thresholds.insert(id, threshold);
        }

        let catalog = Self::with_thresholds(root, &thresholds);
        let missing = catalog.missing();
        if missing.is_empty() {
            debug!("all {} marker templates are present", catalog.markers.len());
        } else {
            warn!(
                "{} marker template(s) missing under {:?}, they will never match: {}",
                missing.len(),
                catalog.root,
                itertools::join(&missing, ", "),
            );
        }
        Ok(catalog)
    }

    /// Marker table under `root` with default thresholds, without looking at
    /// the filesystem.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self::with_thresholds(root.into(), &BTreeMap::new())
    }

    fn with_thresholds(root: PathBuf, thresholds: &BTreeMap<MarkerId, Threshold>) -> Self {
        let markers = MarkerId::iter()
            .map(|id| {
                let marker = Marker {
                    id,
                    template: root.join(id.relative_path()),
                    threshold: thresholds
                        .get(&id)
                        .copied()
                        .unwrap_or_else(|| id.default_threshold()),
                };
                (id, marker)
            })
            .collect();
        Self { root, markers }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    #[cfg(test)]
    pub(crate) fn without(mut self, id: MarkerId) -> Self {
        self.markers.remove(&id);
        self
    }

    /// Markers whose template file does not exist.
    pub fn missing(&self) -> Vec<MarkerId> {
        self.markers
            .values()
            .filter(|marker| !marker.template.is_file())
            .map(|marker| marker.id)
            .collect()
    }
}

/// Locates the resource root once at startup.
///
/// Checked in order: the `MECHBOT_RESOURCES` variable, `resources` next to the
/// executable (packaged layout), `resources` in the crate directory (running
/// from a source checkout).
pub fn resolve_resource_root() -> anyhow::Result<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(var) = env::var_os(RESOURCES_ENV_VAR) {
        candidates.push(PathBuf::from(var));
    }
    match env::current_exe() {
        Ok(exe) => {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join(RESOURCES_DIR_NAME));
            }
        }
        Err(err) => warn!("failed to get current executable path: {err}"),
    }
    candidates.push(Path::new(env!("CARGO_MANIFEST_DIR")).join(RESOURCES_DIR_NAME));
    first_existing_dir(&candidates)
}

fn first_existing_dir(candidates: &[PathBuf]) -> anyhow::Result<PathBuf> {
    for candidate in candidates {
        if candidate.is_dir() {
            info!("using resources from {:?}", candidate);
            return Ok(candidate.clone());
        }
        debug!("no resources at {:?}", candidate);
    }
    bail!("resource directory not found, tried: {:?}", candidates)
}
