use crate::tuning::Tuning;
use crate::types::Snapshot;
use crossbeam_channel::Receiver;
use log::{error, info};
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Writes one JSONL line per snapshot into a timestamped session
/// directory, plus a manifest describing the tuning in effect and final
/// session stats.
pub struct DataLogger {
    rx: Receiver<Snapshot>,
    session_dir: PathBuf,
    tuning: Tuning,
}

impl DataLogger {
    pub fn new(rx: Receiver<Snapshot>, output_dir: &Path, tuning: Tuning) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let session_dir = output_dir.join(format!("session_{}", timestamp));
        if let Err(e) = fs::create_dir_all(&session_dir) {
            error!("Failed to create session dir: {}", e);
        }
        Self {
            rx,
            session_dir,
            tuning,
        }
    }

    /// Run the logger. Blocks the calling thread.
    pub fn run(&self) {
        info!("Data logger → {:?}", self.session_dir);
        self.write_manifest();

        let snapshots_path = self.session_dir.join("snapshots.jsonl");
        let file = match File::create(&snapshots_path) {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to create snapshot log: {}", e);
                return;
            }
        };
        let mut writer = BufWriter::new(file);
        let mut count: u64 = 0;
        let mut peak_energy = 0.0f64;

        for snap in self.rx.iter() {
            if snap.energy > peak_energy {
                peak_energy = snap.energy;
            }
            if let Ok(line) = serde_json::to_string(&snap) {
                let _ = writeln!(writer, "{}", line);
            }
            count += 1;
            if count % 1000 == 0 {
                let _ = writer.flush();
                info!("Logged {} snapshots", count);
            }
        }
        let _ = writer.flush();

        let stats = json!({
            "total_snapshots": count,
            "peak_energy": peak_energy,
        });
        let stats_path = self.session_dir.join("stats.json");
        if let Ok(body) = serde_json::to_string_pretty(&stats) {
            fs::write(&stats_path, body)
                .unwrap_or_else(|e| error!("Failed to write stats: {}", e));
        }

        info!("Session saved: {} snapshots → {:?}", count, self.session_dir);
    }

    fn write_manifest(&self) {
        let t = &self.tuning;
        let manifest = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "system": "motion-conductor",
            "tick_hz": crate::types::TICK_HZ,
            "tuning": {
                "motion_window": t.motion_window,
                "motion_smoothing": t.motion_smoothing,
                "tension_smoothing": t.tension_smoothing,
                "root_semitone_cap": t.root_semitone_cap,
                "base_root_hz": t.base_root_hz,
                "arc_dwell_ms": [
                    t.awakening_dwell_ms,
                    t.discovery_dwell_ms,
                    t.flow_dwell_ms,
                    t.peak_dwell_ms,
                ],
                "arc_entry_energy": [
                    t.discovery_entry_energy,
                    t.flow_entry_energy,
                    t.peak_entry_energy,
                ],
                "swing": t.swing,
                "duck_dip": t.duck_dip,
                "duck_release_ms": t.duck_release_ms,
                "tempo_range_bpm": [t.tempo_min_bpm, t.tempo_max_bpm],
                "groove_hysteresis": [t.groove_stop_energy, t.groove_start_energy],
            },
        });

        let path = self.session_dir.join("manifest.json");
        if let Ok(body) = serde_json::to_string_pretty(&manifest) {
            fs::write(&path, body).unwrap_or_else(|e| error!("Failed to write manifest: {}", e));
        }
    }
}
