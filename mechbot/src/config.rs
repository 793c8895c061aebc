use {
    crate::catalog::MarkerId,
    anyhow::Context as _,
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, path::Path, path::PathBuf, time::Duration},
    strum::{Display, EnumString},
};

pub const APP_NAME: &str = "Super Mechs.exe";

/// Campaign difficulty picked before every battle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Hard,
    #[default]
    Insane,
}

impl Difficulty {
    pub fn marker(self) -> MarkerId {
        match self {
            Difficulty::Hard => MarkerId::Hard,
            Difficulty::Insane => MarkerId::Insane,
        }
    }
}

/// Delays and bounds tuned against the stock client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timings {
    /// Wait after starting the client before the first query.
    #[serde(with = "seconds")]
    pub launch_settle: Duration,
    /// Wait after stopping a running client before starting a new one.
    #[serde(with = "seconds")]
    pub kill_settle: Duration,
    /// How long a terminated client may take to exit before it is killed.
    #[serde(with = "seconds")]
    pub stop_timeout: Duration,
    pub main_menu_retries: u32,
    #[serde(with = "seconds")]
    pub main_menu_retry_delay: Duration,
    #[serde(with = "seconds")]
    pub battle_poll: Duration,
    /// Time the advertisement takes to play before the reward can be claimed.
    #[serde(with = "seconds")]
    pub ad_dwell: Duration,
    #[serde(with = "seconds")]
    pub claim_poll: Duration,
    pub confirm_retries: u32,
    #[serde(with = "seconds")]
    pub confirm_retry_delay: Duration,
    /// Carousel pages scrolled before giving up on finding an ad.
    pub carousel_pages: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            launch_settle: Duration::from_secs(13),
            kill_settle: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            main_menu_retries: 24,
            main_menu_retry_delay: Duration::from_secs(5),
            battle_poll: Duration::from_secs(5),
            ad_dwell: Duration::from_secs(16),
            claim_poll: Duration::from_secs(2),
            confirm_retries: 3,
            confirm_retry_delay: Duration::from_secs(5),
            carousel_pages: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Process name of the client.
    pub app_name: String,
    /// Executable started on every (re)launch.
    pub app_path: PathBuf,
    pub difficulty: Difficulty,
    pub verbose: bool,
    /// Relaunches allowed per invocation; unlimited if absent.
    pub relaunch_limit: Option<u32>,
    /// Marker name to match threshold.
    pub thresholds: BTreeMap<String, f32>,
    pub timings: Timings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.into(),
            app_path: default_app_path(APP_NAME),
            difficulty: Difficulty::default(),
            verbose: true,
            relaunch_limit: None,
            thresholds: BTreeMap::new(),
            timings: Timings::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs_err::read_to_string(path)?;
        serde_json::from_str(&text).with_context(|| format!("invalid config file {:?}", path))
    }
}

/// Per-user install location of the client.
fn default_app_path(app_name: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join("AppData")
        .join("Local")
        .join("SuperMechs")
        .join(app_name)
}

/// Durations as fractional seconds.
mod seconds {
    use {
        serde::{de::Error as _, Deserialize, Deserializer, Serializer},
        std::time::Duration,
    };

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
