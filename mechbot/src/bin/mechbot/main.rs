use {
    anyhow::Context as _,
    clap::{Parser, Subcommand},
    mechbot::{
        catalog::{self, Catalog},
        clock::ThreadClock,
        config::{Config, Difficulty},
        flows::Flow,
        perception::Perception,
        session::{Ports, Session},
        stage::{ExitCode, MarkerRef},
        supervisor::SystemProcesses,
    },
    mechbot_desktop::Desktop,
    std::{path::PathBuf, process},
    tracing::info,
    tracing_subscriber::{filter::LevelFilter, EnvFilter},
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// JSON file overriding the built-in configuration.
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    #[clap(long, global = true, value_enum, ignore_case = true)]
    difficulty: Option<Difficulty>,
    /// Log every query and transition.
    #[clap(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    #[clap(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fight the campaign mission until the fuel runs out.
    Grind,
    /// Watch a rewarded ad in the store and claim the reward.
    AdReward,
    /// Print the effective configuration as JSON.
    Config,
    /// List marker templates and the flows that use them.
    Markers,
}

fn main() {
    match run() {
        Ok(code) => process::exit(code.code()),
        Err(err) => {
            eprintln!("error: {err:?}");
            process::exit(1);
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(difficulty) = args.difficulty {
        config.difficulty = difficulty;
    }
    if args.verbose {
        config.verbose = true;
    } else if args.quiet {
        config.verbose = false;
    }

    let level = if config.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env()?,
        )
        .init();

    match args.command {
        Command::Grind => run_flow(Flow::Grind, &config),
        Command::AdReward => run_flow(Flow::AdReward, &config),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Markers => {
            list_markers(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_catalog(config: &Config) -> anyhow::Result<Catalog> {
    let root = catalog::resolve_resource_root()?;
    Catalog::load(root, &config.thresholds)
}

fn run_flow(flow: Flow, config: &Config) -> anyhow::Result<ExitCode> {
    let graph = flow
        .graph(&config.timings)
        .with_context(|| format!("invalid {flow} flow"))?;
    let catalog = load_catalog(config)?;
    let desktop = Desktop::new()?;
    let mut perception = Perception::desktop(desktop.clone());
    let mut pointer = desktop;
    let mut processes = SystemProcesses::new();
    let clock = ThreadClock;

    info!(
        "running {flow} flow on {:?} at {} difficulty",
        config.app_path, config.difficulty
    );
    Session::new(
        &graph,
        &catalog,
        config,
        Ports {
            locator: &mut perception,
            pointer: &mut pointer,
            processes: &mut processes,
            clock: &clock,
        },
    )
    .run()
}

fn list_markers(config: &Config) -> anyhow::Result<()> {
    let catalog = load_catalog(config)?;
    let mut graphs = Vec::new();
    for flow in [Flow::Grind, Flow::AdReward] {
        graphs.push((flow, flow.graph(&config.timings)?.markers()));
    }
    let difficulty_marker = config.difficulty.marker();

    let missing = catalog.missing();
    println!("resources: {:?}", catalog.root());
    for marker in catalog.iter() {
        let used_by = graphs
            .iter()
            .filter(|(_, markers)| {
                markers.contains(&MarkerRef::Fixed(marker.id))
                    || (marker.id == difficulty_marker && markers.contains(&MarkerRef::Difficulty))
            })
            .map(|(flow, _)| flow.to_string())
            .collect::<Vec<_>>();
        println!(
            "{:<20} {:<8} {:<5} {:<8} {}",
            marker.id.name(),
            marker.id.category(),
            marker.threshold,
            if missing.contains(&marker.id) { "MISSING" } else { "ok" },
            itertools::join(&used_by, ", "),
        );
    }
    println!(
        "{} of {} templates missing",
        missing.len(),
        catalog.iter().count()
    );
    Ok(())
}
