use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::json;
use splitcube_coordinator::{
    AppConfig, Coordinator, CoordinatorStats, DisplaySource, run_fixed_rate,
};
use splitcube_geometry::CUBE;
use splitcube_physics::{PhysicsRequest, PhysicsWorker};
use splitcube_protocol::{Envelope, TracingSink, Worker};
use splitcube_render::{
    CommandLog, RecordingSurface, RenderRequest, RenderWorker, Surface, SurfaceHandle, SurfaceSize,
};
use splitcube_render_wgpu::OffscreenSurface;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "splitcube-cli", about = "Headless splitcube runner")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Record GPU calls in memory
    Recording,
    /// Render into an offscreen wgpu texture
    Wgpu,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, geometry and effective configuration
    Info,
    /// Run a fixed-rate session and print the final statistics as JSON
    Run {
        /// Number of ticks to run
        #[arg(short, long, default_value = "120")]
        ticks: u64,
        /// Tick rate in Hz (defaults to the configured rate)
        #[arg(short, long)]
        rate: Option<f64>,
        #[arg(short, long, value_enum, default_value = "recording")]
        backend: Backend,
        #[arg(long, default_value = "800")]
        width: u32,
        #[arg(long, default_value = "600")]
        height: u32,
    },
    /// Replay worker messages from a JSON-lines file, printing every reply
    Script {
        /// One `{"to": "physics"|"render", "type": ..., "payload": ...}` per line
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Recipient {
    Physics,
    Render,
}

#[derive(Deserialize)]
struct ScriptLine {
    to: Recipient,
    #[serde(flatten)]
    envelope: Envelope,
}

#[derive(Serialize)]
struct ReplyLine {
    from: Recipient,
    #[serde(flatten)]
    envelope: Envelope,
}

fn run_session<S: Surface>(
    config: &AppConfig,
    surface: S,
    ticks: u64,
    rate: f64,
) -> Result<CoordinatorStats> {
    let physics = splitcube_physics::spawn(config.simulation)?;
    let render = splitcube_render::spawn::<S>(config.pipeline)?;
    let mut coordinator = Coordinator::new(physics, render, TracingSink, config.coordinator);
    coordinator.start(DisplaySource::Transferable(surface), Instant::now())?;

    let stop = AtomicBool::new(false);
    let result = run_fixed_rate(&mut coordinator, Some(ticks), rate, &stop);
    let stats = coordinator.shutdown()?;
    result?;
    Ok(stats)
}

fn replay(config: &AppConfig, text: &str) -> Result<Vec<ReplyLine>> {
    let mut physics = PhysicsWorker::new(config.simulation);
    let mut render = RenderWorker::<RecordingSurface>::new(config.pipeline);
    let mut logs = Vec::new();
    let mut out = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let ScriptLine { to, envelope } = serde_json::from_str(line)
            .with_context(|| format!("line {}: not a script message", number + 1))?;

        let replies = match to {
            Recipient::Physics => PhysicsRequest::from_envelope(&envelope).map(|request| {
                let mut replies = Vec::new();
                physics.handle(request, &mut replies);
                replies.iter().map(|r| r.to_envelope()).collect::<Vec<_>>()
            }),
            Recipient::Render => RenderRequest::from_envelope(&envelope, |size| {
                let surface = RecordingSurface::new(size);
                logs.push(surface.log());
                SurfaceHandle::Owned(surface)
            })
            .map(|request| {
                let mut replies = Vec::new();
                render.handle(request, &mut replies);
                replies.iter().map(|r| r.to_envelope()).collect::<Vec<_>>()
            }),
        };

        match replies {
            Ok(envelopes) => {
                for envelope in envelopes {
                    out.push(ReplyLine { from: to, envelope });
                }
            }
            Err(e) => {
                tracing::warn!(line = number + 1, "request rejected: {e}");
                out.push(ReplyLine {
                    from: to,
                    envelope: Envelope::new("error", json!({ "message": e.to_string() })),
                });
            }
        }
    }

    let draws: Vec<u32> = logs.iter().flat_map(CommandLog::draws).collect();
    out.push(ReplyLine {
        from: Recipient::Render,
        envelope: Envelope::new("draws", json!({ "indexCounts": draws })),
    });
    Ok(out)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("splitcube-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "geometry: {} indices, {} position bytes, {} color bytes, {} index bytes",
                CUBE.index_count(),
                CUBE.position_bytes().len(),
                CUBE.color_bytes().len(),
                CUBE.index_bytes().len()
            );
            print!("{}", config.to_yaml()?);
        }
        Commands::Run {
            ticks,
            rate,
            backend,
            width,
            height,
        } => {
            let size = SurfaceSize::new(width, height);
            let rate = rate.unwrap_or(config.coordinator.tick_rate_hz);
            let stats = match backend {
                Backend::Recording => {
                    run_session(&config, RecordingSurface::new(size), ticks, rate)?
                }
                Backend::Wgpu => run_session(&config, OffscreenSurface::new(size), ticks, rate)?,
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Script { file } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            for reply in replay(&config, &text)? {
                println!("{}", serde_json::to_string(&reply)?);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_replay_mirrors_the_worker_protocol() {
        let script = r#"
# physics first
{"to":"physics","type":"init"}
{"to":"physics","type":"updateState","payload":{"tick":1,"deltaTime":0.5}}
{"to":"render","type":"init","payload":{"surface":{"width":64,"height":64}}}
{"to":"render","type":"renderScene","payload":{"frame":1,"sceneData":{"cubeRotationY":0.39}}}
{"to":"render","type":"renderScene","payload":{"sceneData":{}}}
{"to":"physics","type":"explode"}
"#;
        let replies = replay(&AppConfig::default(), script).unwrap();
        let kinds: Vec<_> = replies
            .iter()
            .map(|r| (r.from, r.envelope.kind.as_str()))
            .collect();

        assert_eq!(kinds[0], (Recipient::Physics, "status"));
        assert_eq!(kinds[1], (Recipient::Physics, "physicsUpdate"));
        let angle = replies[1]
            .envelope
            .field("state.cubeRotationY")
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((angle - 0.5 * std::f64::consts::FRAC_PI_4).abs() < 1e-9);

        assert!(kinds.contains(&(Recipient::Render, "ready")));
        assert!(kinds.contains(&(Recipient::Render, "frameDone")));
        assert_eq!(kinds[kinds.len() - 3], (Recipient::Render, "error"));
        assert_eq!(kinds[kinds.len() - 2], (Recipient::Physics, "error"));

        let draws = replies.last().unwrap();
        assert_eq!(draws.envelope.kind, "draws");
        assert_eq!(draws.envelope.payload["indexCounts"], json!([36]));
    }

    #[test]
    fn malformed_script_line_is_reported_with_its_number() {
        let script = "{\"to\":\"gpu\",\"type\":\"init\"}";
        let err = replay(&AppConfig::default(), script).err().unwrap();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn recording_session_renders_frames() {
        let config = AppConfig::default();
        let surface = RecordingSurface::new(SurfaceSize::new(32, 32));
        let stats = run_session(&config, surface, 5, 500.0).unwrap();
        assert_eq!(stats.ticks, 5);
        assert!(stats.frames_rendered >= 1);
        assert_eq!(stats.frames_rendered + stats.frames_skipped, 5);
    }
}
