use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ved", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the composite picture at one instant.
    Frame(FrameArgs),
    /// Record a time range into a media file (requires `ffmpeg` on PATH).
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Instant in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Output image path; the format follows the extension.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output media path.
    #[arg(long)]
    out: PathBuf,

    /// Frame rate, either `30` or `30000/1001`.
    #[arg(long, default_value = "30", value_parser = parse_fps)]
    fps: ved::Fps,

    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,

    /// First instant in seconds.
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Last instant in seconds (inclusive). Defaults to the project's duration.
    #[arg(long)]
    end: Option<f64>,

    /// Container passed to the encoder as `-f`.
    #[arg(long)]
    format: Option<String>,

    /// Fail instead of replacing an existing output.
    #[arg(long)]
    no_overwrite: bool,

    /// Kill the encoder after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Extra encoder flags, after `--`.
    #[arg(last = true)]
    encoder_args: Vec<String>,
}

fn parse_fps(s: &str) -> Result<ved::Fps, String> {
    let (num, den) = match s.split_once('/') {
        Some((n, d)) => (n.trim(), d.trim()),
        None => (s.trim(), "1"),
    };
    let num = num.parse::<u32>().map_err(|e| format!("bad fps numerator: {e}"))?;
    let den = den.parse::<u32>().map_err(|e| format!("bad fps denominator: {e}"))?;
    ved::Fps::new(num, den).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("VED_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn load_timeline(path: &Path) -> anyhow::Result<ved::Timeline> {
    let project = ved::ProjectFile::from_path(path)?;
    let assets_root = path.parent().unwrap_or_else(|| Path::new("."));
    let timeline = project
        .build(assets_root)
        .with_context(|| format!("build project '{}'", path.display()))?;
    Ok(timeline)
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let mut timeline = load_timeline(&args.in_path)?;
    timeline
        .screenshot(args.time, ved::ScreenshotTarget::Path(&args.out))
        .with_context(|| format!("write image '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut timeline = load_timeline(&args.in_path)?;

    let mux = ved::MuxOptions {
        format: args.format,
        extra_args: args.encoder_args,
        overwrite: !args.no_overwrite,
        timeout: args.timeout_secs.map(std::time::Duration::from_secs),
        ..ved::MuxOptions::default()
    };
    let opts = ved::RecordOpts::default()
        .with_range(args.start, args.end)
        .with_rates(args.fps, args.sample_rate)
        .with_mux(mux);

    let stats = timeline.record(&opts, ved::OutputTarget::Path(&args.out))?;

    eprintln!(
        "wrote {} ({} frames, {} audio streams)",
        args.out.display(),
        stats.frames,
        stats.audio_streams
    );
    Ok(())
}
