//! Replay recorded frames and inputs through a session and print one JSON
//! record per tick.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use log::info;
#[cfg(not(feature = "tracing"))]
use log::LevelFilter;
use vplane::fx::{Activation, NodeId};
use vplane::replay::{run_replay, ReplayError, ReplayScript};
use vplane::{EffectKind, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "vplane-replay")]
#[command(about = "Replay a scripted frame sequence through a virtual-plane session")]
struct Cli {
    /// Replay script (JSON).
    #[arg(short, long)]
    script: PathBuf,
    /// Session configuration (JSON); defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Write tick records here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Override the initially selected effect.
    #[arg(long)]
    effect: Option<EffectKind>,
    /// Seed the particle generator.
    #[arg(long)]
    seed: Option<u64>,
    /// off, error, warn, info, debug or trace.
    #[arg(long, default_value = "warn")]
    log_level: String,
    /// Emit JSON log lines (with the `tracing` feature).
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    #[cfg(not(feature = "tracing"))]
    {
        let level: LevelFilter = cli
            .log_level
            .parse()
            .map_err(|_| format!("unknown log level '{}'", cli.log_level))?;
        vplane::core::init_with_level(level)?;
    }
    #[cfg(feature = "tracing")]
    vplane::core::init_tracing(cli.json_logs);

    run(cli)
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip(cli)))]
fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(effect) = cli.effect {
        config.effect = effect;
    }
    if cli.seed.is_some() {
        config.effects.seed = cli.seed;
    }

    let script = ReplayScript::load(&cli.script)?;
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut activations = 0usize;
    let mut hook = |node: NodeId, a: Activation| {
        activations += 1;
        info!("{node} activated (intensity {:.2}, volume {:.2})", a.intensity, a.volume);
    };
    let session = run_replay(config, &script, &mut hook, |summary| {
        serde_json::to_writer(&mut out, &summary)?;
        writeln!(out)?;
        Ok::<(), ReplayError>(())
    })?;
    out.flush()?;

    info!(
        "replayed {} steps, {} activations, plane active: {}",
        script.steps.len(),
        activations,
        session.calibrator().is_calibrated()
    );
    Ok(())
}
