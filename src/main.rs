use motion_conductor::conductor::Conductor;
use motion_conductor::console_display;
use motion_conductor::data_logger;
use motion_conductor::osc_output;
use motion_conductor::simulator;
use motion_conductor::synth::{ChannelSynth, NullSynth, SynthBackend, SynthCommand};
use motion_conductor::tuning::Tuning;
use motion_conductor::types::*;

use clap::Parser;
use crossbeam_channel::{bounded, unbounded};
use log::info;
use std::path::PathBuf;
use std::thread;

#[derive(Parser)]
#[command(name = "motion-conductor")]
#[command(about = "Real-time motion-to-music conductor")]
struct Cli {
    /// Run the input simulator (no sensors required)
    #[arg(long, default_value_t = true)]
    simulate: bool,

    /// Simulator performance: "basic", "tempo", or "still"
    #[arg(long, default_value = "basic")]
    demo: String,

    /// Simulator sample rate (Hz)
    #[arg(long, default_value_t = 60)]
    sensor_rate: u32,

    /// Enable OSC output to an external synthesis renderer
    #[arg(long)]
    osc: bool,

    /// OSC target address
    #[arg(long, default_value = "127.0.0.1:9000")]
    osc_target: String,

    /// Enable console display (terminal dashboard)
    #[arg(long)]
    console: bool,

    /// Console refresh rate (Hz)
    #[arg(long, default_value_t = 10)]
    display_hz: u32,

    /// Enable session snapshot logging
    #[arg(long)]
    log_data: bool,

    /// Output directory for logged sessions
    #[arg(long, default_value = "./sessions")]
    output_dir: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let tuning = Tuning::default();
    let clock = SessionClock::new();

    info!("═══════════════════════════════════════════════");
    info!("  MOTION CONDUCTOR v{}", env!("CARGO_PKG_VERSION"));
    info!("  Input: {}", if cli.simulate { format!("simulator ({})", cli.demo) } else { "external".into() });
    if cli.osc {
        info!("  Synth: OSC → {}", cli.osc_target);
    } else {
        info!("  Synth: none (state engine only)");
    }
    info!("═══════════════════════════════════════════════");

    // Channel: inputs → conductor
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);

    // Channels: conductor → snapshot consumers
    let mut snapshot_txs: Vec<crossbeam_channel::Sender<Snapshot>> = Vec::new();

    let mut handles = Vec::new();

    // ─── Console display ────────────────────────────────────────────
    if cli.console {
        let (tx, rx) = bounded::<Snapshot>(256);
        snapshot_txs.push(tx);
        let hz = cli.display_hz;
        handles.push(
            thread::Builder::new()
                .name("display".into())
                .spawn(move || {
                    console_display::ConsoleDisplay::new(rx, hz).run();
                })
                .expect("spawn display thread"),
        );
    }

    // ─── Data logger ────────────────────────────────────────────────
    if cli.log_data {
        let (tx, rx) = bounded::<Snapshot>(4096);
        snapshot_txs.push(tx);
        let output_dir = cli.output_dir.clone();
        let t = tuning.clone();
        handles.push(
            thread::Builder::new()
                .name("logger".into())
                .spawn(move || {
                    data_logger::DataLogger::new(rx, &output_dir, t).run();
                })
                .expect("spawn logger thread"),
        );
    }

    // ─── Synth backend + OSC output ─────────────────────────────────
    // The conductor core is identical either way; without --osc it talks
    // to the null backend and remains a pure state engine.
    let synth: Box<dyn SynthBackend> = if cli.osc {
        let (cmd_tx, cmd_rx) = unbounded::<SynthCommand>();
        let (snap_tx, snap_rx) = bounded::<Snapshot>(1024);
        snapshot_txs.push(snap_tx);
        let target = cli.osc_target.clone();
        handles.push(
            thread::Builder::new()
                .name("osc".into())
                .spawn(move || {
                    osc_output::OscOutput::new(cmd_rx, snap_rx, target).run();
                })
                .expect("spawn osc thread"),
        );
        Box::new(ChannelSynth::new(cmd_tx, tuning.schedule_epsilon_ms))
    } else {
        Box::new(NullSynth)
    };

    // ─── Conductor ──────────────────────────────────────────────────
    let cond_clock = clock.clone();
    let cond_tuning = tuning.clone();
    handles.push(
        thread::Builder::new()
            .name("conductor".into())
            .spawn(move || {
                Conductor::new(input_rx, snapshot_txs, synth, cond_clock, cond_tuning).run();
            })
            .expect("spawn conductor thread"),
    );

    // ─── Input source ───────────────────────────────────────────────
    // Without the simulator the binary still runs: the conductor idles on
    // an open channel, ready for an external source to be wired in.
    if cli.simulate {
        info!("Starting simulator...");
        let sim_clock = clock.clone();
        let sim_tx = input_tx.clone();
        let rate = cli.sensor_rate;
        let demo = cli.demo.clone();
        handles.push(
            thread::Builder::new()
                .name("simulator".into())
                .spawn(move || {
                    simulator::Simulator::new(sim_clock, sim_tx, rate).run(&demo);
                })
                .expect("spawn simulator thread"),
        );
    }

    info!("Running. Press Ctrl+C to stop.");
    for h in handles {
        let _ = h.join();
    }
}
