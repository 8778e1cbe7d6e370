use crate::synth::{ParamTarget, SynthBackend, SynthCommand, VoiceKind};
use crate::tuning::Tuning;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Graded stillness states, deepening with continued absence of motion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VoidPhase {
    Present,
    Settling,
    Deep,
    Transcendent,
}

impl fmt::Display for VoidPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoidPhase::Present => "present",
            VoidPhase::Settling => "settling",
            VoidPhase::Deep => "deep",
            VoidPhase::Transcendent => "transcendent",
        };
        write!(f, "{}", s)
    }
}

const DRONE_VOICES: u32 = 3;
const DRONE_BASE_ID: u32 = 8000;
const OVERTONE_ID: u32 = 8100;

/// Hysteretic depth state machine entered when motion stays absent.
///
/// Sustained sub-threshold motion enters SETTLING, allocating a small set
/// of detuned low drone voices whose filter is modulated by a slow breath
/// oscillator. Depth grows monotonically while the stillness persists and
/// phase labels follow the depth thresholds. Motion above threshold drains
/// the depth back down; only at zero does the layer return to PRESENT and
/// tear the voices down.
///
/// The extra overtone voice rides its own hysteresis band (on above 0.9,
/// off below 0.8): it joins near full depth and leaves partway through the
/// drain, well before the drones do, so it doesn't churn at the boundary.
pub struct VoidLayer {
    pub phase: VoidPhase,
    pub depth: f64,
    pub breath_phase: f64,
    still_since_ms: Option<f64>,
    voices_active: bool,
    overtone_active: bool,
    tuning: Tuning,
}

impl VoidLayer {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            phase: VoidPhase::Present,
            depth: 0.0,
            breath_phase: 0.0,
            still_since_ms: None,
            voices_active: false,
            overtone_active: false,
            tuning: tuning.clone(),
        }
    }

    /// Per-tick update with the current smoothed motion level.
    pub fn update(
        &mut self,
        now_ms: f64,
        dt_ms: f64,
        motion_level: f64,
        root_hz: f64,
        synth: &mut dyn SynthBackend,
    ) {
        let t = self.tuning.clone();

        if motion_level >= t.void_motion_threshold {
            self.still_since_ms = None;
            if self.depth <= 0.0 {
                self.set_phase(VoidPhase::Present);
                return;
            }
            // Motion drains the depth rather than zeroing it, so the
            // overtone leaves through its hysteresis gap before the
            // drones are released.
            self.depth = (self.depth - t.void_drain_rate * dt_ms / 1000.0).max(0.0);
            self.update_overtone(now_ms, root_hz, synth);
            if self.depth <= 0.0 {
                info!("void: motion returned, leaving {}", self.phase);
                self.set_phase(VoidPhase::Present);
                self.teardown(now_ms, synth);
            } else {
                self.set_phase(self.phase_for_depth());
            }
            return;
        }

        let since = *self.still_since_ms.get_or_insert(now_ms);
        let still_for = now_ms - since;

        if self.phase == VoidPhase::Present {
            if still_for >= t.void_settle_ms {
                self.set_phase(VoidPhase::Settling);
                self.allocate_voices(now_ms, root_hz, synth);
            } else {
                return; // not yet settled enough to begin
            }
        }

        // Depth only ever grows while the stillness lasts.
        self.depth = (self.depth + t.void_depth_rate * dt_ms / 1000.0).clamp(0.0, 1.0);
        self.breath_phase = (self.breath_phase + t.breath_rate) % std::f64::consts::TAU;
        self.set_phase(self.phase_for_depth());

        // Breath-modulated filter sweep on the drone bus. The retarget
        // supersedes the previous ramp; nothing is ever cancelled.
        if self.voices_active {
            let cutoff = 120.0 + 80.0 * self.depth + 40.0 * self.breath_phase.sin();
            synth.send(
                SynthCommand::Ramp {
                    target: ParamTarget::FilterCutoff,
                    value: cutoff,
                    duration_ms: dt_ms.max(1.0),
                    at_ms: now_ms + 1.0,
                },
                now_ms,
            );
        }

        self.update_overtone(now_ms, root_hz, synth);
    }

    /// Overtone hysteresis band: in above the on-threshold, out below the
    /// off-threshold, nothing in between.
    fn update_overtone(&mut self, now_ms: f64, root_hz: f64, synth: &mut dyn SynthBackend) {
        let t = &self.tuning;
        if !self.overtone_active && self.depth > t.void_overtone_on {
            debug!("void: overtone voice in at depth {:.2}", self.depth);
            self.overtone_active = true;
            synth.send(
                SynthCommand::StartVoice {
                    kind: VoiceKind::VoidOvertone,
                    id: OVERTONE_ID,
                    freq_hz: root_hz * 3.0,
                    at_ms: now_ms + 1.0,
                },
                now_ms,
            );
        } else if self.overtone_active && self.depth < t.void_overtone_off {
            debug!("void: overtone voice out at depth {:.2}", self.depth);
            self.overtone_active = false;
            synth.send(
                SynthCommand::StopVoice {
                    id: OVERTONE_ID,
                    at_ms: now_ms + 1.0,
                },
                now_ms,
            );
        }
    }

    fn phase_for_depth(&self) -> VoidPhase {
        if self.depth >= self.tuning.void_transcendent_depth {
            VoidPhase::Transcendent
        } else if self.depth >= self.tuning.void_deep_depth {
            VoidPhase::Deep
        } else {
            VoidPhase::Settling
        }
    }

    fn set_phase(&mut self, phase: VoidPhase) {
        if phase != self.phase {
            info!("void: {} → {} (depth {:.2})", self.phase, phase, self.depth);
            self.phase = phase;
        }
    }

    /// Detuned low drones around the current harmonic root.
    fn allocate_voices(&mut self, now_ms: f64, root_hz: f64, synth: &mut dyn SynthBackend) {
        if self.voices_active {
            return;
        }
        self.voices_active = true;
        let detune = [1.0, 1.003, 0.996];
        for i in 0..DRONE_VOICES {
            synth.send(
                SynthCommand::StartVoice {
                    kind: VoiceKind::VoidDrone,
                    id: DRONE_BASE_ID + i,
                    freq_hz: root_hz * 0.5 * detune[i as usize],
                    at_ms: now_ms + 1.0,
                },
                now_ms,
            );
        }
    }

    fn teardown(&mut self, now_ms: f64, synth: &mut dyn SynthBackend) {
        if !self.voices_active {
            return;
        }
        self.voices_active = false;
        for i in 0..DRONE_VOICES {
            synth.send(
                SynthCommand::StopVoice {
                    id: DRONE_BASE_ID + i,
                    at_ms: now_ms + 1.0,
                },
                now_ms,
            );
        }
        if self.overtone_active {
            self.overtone_active = false;
            synth.send(
                SynthCommand::StopVoice {
                    id: OVERTONE_ID,
                    at_ms: now_ms + 1.0,
                },
                now_ms,
            );
        }
    }
}
