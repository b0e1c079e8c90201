use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use stratum::{AggregatedFrame, DisplayTime, DisplayTransform, Rect, Scene};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "stratum", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate every step of a scene and print the aggregated frames as JSON.
    Aggregate(AggregateArgs),
    /// Load and validate a scene without aggregating it.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct AggregateArgs {
    /// Input scene JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Rotation or flip applied to the output (none, flip_horizontal, flip_vertical,
    /// rotate90, rotate180, rotate270).
    #[arg(long, default_value = "none")]
    display_transform: DisplayTransform,

    /// Extra output area to redraw, as x,y,w,h.
    #[arg(long)]
    target_damage: Option<Rect>,

    /// Aggregations per scene step. Repeats see no new frames.
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Output JSON path. Defaults to stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input scene JSON.
    #[arg(long)]
    scene: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Aggregate(args) => cmd_aggregate(args),
        Command::Validate(args) => cmd_validate(args),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_scene(path: &Path) -> anyhow::Result<Scene> {
    Scene::from_path(path).with_context(|| format!("load scene '{}'", path.display()))
}

fn cmd_aggregate(args: AggregateArgs) -> anyhow::Result<()> {
    if args.repeat == 0 {
        anyhow::bail!("--repeat must be at least 1");
    }
    let scene = read_scene(&args.scene)?;
    let mut manager = scene.build_manager()?;
    let mut aggregator = scene.build_aggregator()?;
    let target_damage = args.target_damage.unwrap_or_default();

    let mut frames: Vec<AggregatedFrame> = Vec::new();
    for step in 0..scene.steps() {
        scene.submit_step(&mut manager, step)?;
        for _ in 0..args.repeat {
            let display_time = DisplayTime::from_millis(16 * frames.len() as u64);
            let frame = aggregator.aggregate(
                &mut manager,
                scene.root,
                display_time,
                args.display_transform,
                target_damage,
            );
            let stats = aggregator.last_stats();
            tracing::info!(
                step,
                passes = frame.render_pass_list.len(),
                prewalked = stats.prewalked_surface_count,
                copied = stats.copied_surface_count,
                "aggregated"
            );
            frames.push(frame);
        }
    }

    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir '{}'", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("create output '{}'", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &frames)
                .with_context(|| "serialize aggregated frames")?;
            writer.flush()?;
            eprintln!("wrote {} frame(s) to {}", frames.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &frames)
                .with_context(|| "serialize aggregated frames")?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let scene = read_scene(&args.scene)?;
    eprintln!(
        "ok: {} surface(s), {} step(s)",
        scene.surfaces.len(),
        scene.steps()
    );
    Ok(())
}
