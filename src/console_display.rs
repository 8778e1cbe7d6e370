use crate::types::Snapshot;
use crossbeam_channel::Receiver;
use std::io::{self, Write};

/// Renders a live ASCII dashboard of the conductor state.
pub struct ConsoleDisplay {
    rx: Receiver<Snapshot>,
    update_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<Snapshot>, update_hz: u32) -> Self {
        Self { rx, update_hz }
    }

    pub fn run(&self) {
        let skip = if self.update_hz == 0 {
            6
        } else {
            (60 / self.update_hz).max(1) as u64
        };
        let mut count: u64 = 0;
        let mut stdout = io::stdout();

        for snap in self.rx.iter() {
            count += 1;
            if count % skip != 0 {
                continue;
            }

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");

            println!("╔══════════════════════════════════════════════════════════╗");
            println!("║  MOTION CONDUCTOR — Live Monitor                        ║");
            println!("╠══════════════════════════════════════════════════════════╣");

            let secs = snap.t_ms / 1000.0;
            println!("║  Time: {:>7.1}s   Arc: {:<12} Pattern: {:<10}  ║", secs, snap.arc_phase, snap.pattern.to_string());
            println!("║                                                          ║");

            println!("║  Energy:     {} {:>4.0}%          ║", make_bar(snap.energy, 30), snap.energy * 100.0);
            println!("║  Tension:    {} {:>4.0}%          ║", make_bar(snap.tension, 30), snap.tension * 100.0);
            println!("║  Expression: {} {:>4.0}%          ║", make_bar(snap.expression_depth, 30), snap.expression_depth * 100.0);
            println!("║  Density:    {} {:>4.0}%          ║", make_bar(snap.rhythmic_density, 30), snap.rhythmic_density * 100.0);
            println!("║                                                          ║");

            println!(
                "║  Root: {:>6.1} Hz (+{:.2} st)   Momentum: {:<10}     ║",
                snap.harmonic_root_hz, snap.root_semitone_offset, snap.momentum.to_string()
            );
            let bpm = if snap.detected_bpm > 0.5 {
                format!("{:.0}", snap.detected_bpm)
            } else {
                "---".to_string()
            };
            println!(
                "║  Tempo: {:>5.1} bpm  (tapped: {:>4})                      ║",
                snap.tempo_bpm, bpm
            );

            println!("║                                                          ║");
            if snap.groove_running {
                println!("║  Groove: {} ║", make_step_row(snap.groove_step, 16));
            } else {
                println!("║  Groove: (quiet)                                         ║");
            }
            println!(
                "║  Void: {:<13} {} {:>4.0}%       ║",
                snap.void_phase,
                make_bar(snap.void_depth, 20),
                snap.void_depth * 100.0
            );

            println!("╚══════════════════════════════════════════════════════════╝");
            let _ = stdout.flush();
        }
    }
}

fn make_bar(val: f64, width: usize) -> String {
    let filled = (val.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

fn make_step_row(current: usize, steps: usize) -> String {
    let mut row = String::new();
    for i in 0..steps {
        row.push(if i == current { '●' } else { '○' });
        row.push(' ');
    }
    while row.chars().count() < 48 {
        row.push(' ');
    }
    row.chars().take(48).collect()
}
