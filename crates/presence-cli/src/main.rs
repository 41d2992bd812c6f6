use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use presence_core::{DetectionState, PresenceEvent};
use presence_engine::EngineConfig;
use tracing_subscriber::EnvFilter;

mod replay;

#[derive(Parser)]
#[command(name = "presence", version, about = "Face presence and head-turn liveness tools")]
struct Cli {
    /// TOML config file; defaults come from PRESENCE_* environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded detection trace through the engine.
    Replay(ReplayArgs),
    /// Detector model asset commands.
    #[command(subcommand)]
    Model(ModelCommand),
}

#[derive(Args)]
struct ReplayArgs {
    /// JSON trace file.
    trace: PathBuf,
    /// Override the sampling period in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,
    /// Print events and the final state as JSON lines.
    #[arg(long)]
    json: bool,
    /// Exit non-zero unless a present, head-turning face was observed.
    #[arg(long)]
    require_liveness: bool,
}

#[derive(Subcommand)]
enum ModelCommand {
    /// Check that the detector model is present and intact.
    Verify {
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Expected SHA-256 (hex). Overrides the configured pin.
        #[arg(long)]
        sha256: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => {
            let config = EngineConfig::from_env();
            config.validate()?;
            config
        }
    };

    match cli.command {
        Command::Replay(args) => run_replay(args, config).await,
        Command::Model(ModelCommand::Verify { model_dir, sha256 }) => {
            let model_dir = model_dir.unwrap_or(config.model_dir);
            let sha256 = sha256.or(config.model_sha256);
            run_model_verify(model_dir, sha256)
        }
    }
}

async fn run_replay(args: ReplayArgs, mut config: EngineConfig) -> Result<()> {
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
    }
    let trace = replay::Trace::from_path(&args.trace)?;

    let json = args.json;
    let outcome = replay::replay(trace, config, |event| print_event(event, json)).await?;
    print_state(&outcome.state, json)?;

    if outcome.interrupted {
        bail!("replay interrupted");
    }
    if args.require_liveness && !outcome.state.is_verified() {
        bail!("liveness not confirmed");
    }
    Ok(())
}

fn print_event(event: &PresenceEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        PresenceEvent::FaceConfirmed { face } => println!(
            "face confirmed: [{}, {}, {}, {}, {}]",
            face.x, face.y, face.w, face.h, face.confidence
        ),
        PresenceEvent::FaceLost => println!("face lost"),
        PresenceEvent::HeadTurnConfirmed { range_px } => {
            println!("head turn confirmed: {range_px:.1}px sweep")
        }
    }
    Ok(())
}

fn print_state(state: &DetectionState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
        return Ok(());
    }
    let verdict = match (state.face_detected, state.head_turn_detected) {
        (true, true) => "live face",
        (true, false) => "face present, no head turn",
        (false, true) => "head turn seen, face since lost",
        (false, false) => "no face",
    };
    println!("verdict: {verdict}");
    if let Some(face) = &state.current_face {
        println!(
            "last face: [{}, {}, {}, {}, {}]",
            face.x, face.y, face.w, face.h, face.confidence
        );
    }
    if let Some(error) = &state.error {
        println!("error: {error}");
    }
    Ok(())
}

fn run_model_verify(model_dir: PathBuf, sha256: Option<String>) -> Result<()> {
    let model = &presence_models::DETECTOR_MODEL;
    let verified = presence_models::verify_model_dir(&model_dir, sha256.as_deref())
        .with_context(|| {
            format!(
                "detector model check failed; expected {} ({}) from {}",
                model.name, model.size_display, model.url
            )
        })?;

    println!("model:  {}", verified.path.display());
    println!("size:   {} bytes", verified.size_bytes);
    println!("sha256: {}", verified.sha256);
    if sha256.is_none() {
        println!("note:   no checksum pinned; set PRESENCE_MODEL_SHA256 to enforce this digest");
    }
    Ok(())
}
