//! Stepwise demo runner
//!
//! Loads a program file and runs it against the simulated device, logging every
//! event. While running, `pause`, `resume` and `stop` lines on stdin control the
//! program; Ctrl-C stops it.
//!
//! ```bash
//! stepwise demo.txt --tick-ms 100
//! RUST_LOG=debug stepwise demo.json
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stepwise::{
    load_program, MacroState, ProgramEvent, ProgramSequencer, SequencerConfig, SimConfig,
    SimulatedDevice,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "stepwise")]
#[command(about = "Run a command program against a simulated device", long_about = None)]
struct Cli {
    /// Program file: one command per line, or a JSON array of {"cmd", "params"}
    script: PathBuf,

    /// Sequencer tick period
    #[arg(long, default_value = "200")]
    tick_ms: u64,

    /// Simulated device reply delay
    #[arg(long, default_value = "100")]
    reply_delay_ms: u64,

    /// Simulated device status refresh period
    #[arg(long, default_value = "500")]
    status_poll_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let program = load_program(&cli.script)
        .with_context(|| format!("Failed to load program {}", cli.script.display()))?;
    info!(
        "[MAIN] Loaded {} commands from {}",
        program.len(),
        cli.script.display()
    );
    for (index, command) in program.iter().enumerate() {
        debug!("[MAIN]   {}: {} {:?}", index, command.name, command.params);
    }

    let device = Arc::new(SimulatedDevice::new(SimConfig {
        reply_delay: Duration::from_millis(cli.reply_delay_ms),
        status_poll_period: Duration::from_millis(cli.status_poll_ms),
        ..Default::default()
    }));

    let config = SequencerConfig {
        tick_period: Duration::from_millis(cli.tick_ms),
        ..Default::default()
    };
    let sequencer = ProgramSequencer::new(device, config);
    let mut events = sequencer.subscribe_all();

    sequencer.run(Some(program)).await;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    ProgramEvent::ProgramCounter(pc) => info!("[MAIN] Program counter: {}", pc),
                    ProgramEvent::MicroState { state, .. } => debug!("[MAIN] Micro-state: {}", state),
                    ProgramEvent::Program(program) => debug!("[MAIN] Program: {} commands", program.len()),
                    ProgramEvent::State { state, error } => {
                        info!("[MAIN] State: {}", state);
                        if let Some(err) = error {
                            error!("[MAIN] Program failed: {}", err);
                            return Err(anyhow!("program halted: {}", err));
                        }
                        if state == MacroState::Stopped {
                            break;
                        }
                    }
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => handle_input(&sequencer, line.trim()).await,
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("[MAIN] Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("[MAIN] Interrupted, stopping");
                sequencer.stop().await;
                break;
            }
        }
    }

    let snapshot = sequencer.snapshot().await;
    info!(
        "[MAIN] Finished: state={} micro_state={}",
        snapshot.state, snapshot.micro_state
    );
    Ok(())
}

async fn handle_input(sequencer: &ProgramSequencer, input: &str) {
    match input {
        "pause" => sequencer.pause().await,
        "resume" => sequencer.resume().await,
        "stop" => sequencer.stop().await,
        "" => {}
        other => warn!("[MAIN] Unknown input '{}' (pause, resume, stop)", other),
    }
}
