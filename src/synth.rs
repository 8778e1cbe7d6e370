use crate::dispatch::ResponseRecipe;
use crossbeam_channel::Sender;
use log::trace;
use serde::{Deserialize, Serialize};

/// Continuously-controlled parameters the core may retarget. A new ramp
/// supersedes any prior target; individual scheduled events are never
/// cancelled once posted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParamTarget {
    /// Ambient-bus gain (the duck target)
    AmbientGain,
    FilterCutoff,
    ReverbAmount,
    VoiceFrequency,
}

/// Named voice families the synthesis collaborator knows how to build.
/// The core addresses them by kind only; it owns no recipe details.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VoiceKind {
    VoidDrone,
    VoidOvertone,
    GrooveTexture,
}

/// One-directional, fire-and-forget requests to the synthesis collaborator.
/// Every command carries an explicit timestamp; the core never blocks on
/// the audio clock and never schedules at or before "now".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SynthCommand {
    /// Percussive trigger at a velocity, scheduled ahead of playback
    Trigger {
        instrument: usize,
        velocity: f64,
        at_ms: f64,
    },
    /// Duck the ambient bus: drop to `dip` at `at_ms`, recover linearly
    /// over `release_ms`
    Duck {
        dip: f64,
        release_ms: f64,
        at_ms: f64,
    },
    /// Smoothed ramp of a parameter to a value over a duration
    Ramp {
        target: ParamTarget,
        value: f64,
        duration_ms: f64,
        at_ms: f64,
    },
    StartVoice {
        kind: VoiceKind,
        id: u32,
        freq_hz: f64,
        at_ms: f64,
    },
    StopVoice {
        id: u32,
        at_ms: f64,
    },
    /// A full gesture-response recipe, parameterized and ready to render
    Play { recipe: ResponseRecipe, at_ms: f64 },
}

impl SynthCommand {
    pub fn at_ms(&self) -> f64 {
        match self {
            SynthCommand::Trigger { at_ms, .. }
            | SynthCommand::Duck { at_ms, .. }
            | SynthCommand::Ramp { at_ms, .. }
            | SynthCommand::StartVoice { at_ms, .. }
            | SynthCommand::StopVoice { at_ms, .. }
            | SynthCommand::Play { at_ms, .. } => *at_ms,
        }
    }

    fn clamp_at(&mut self, floor_ms: f64) {
        match self {
            SynthCommand::Trigger { at_ms, .. }
            | SynthCommand::Duck { at_ms, .. }
            | SynthCommand::Ramp { at_ms, .. }
            | SynthCommand::StartVoice { at_ms, .. }
            | SynthCommand::StopVoice { at_ms, .. }
            | SynthCommand::Play { at_ms, .. } => {
                if *at_ms < floor_ms {
                    *at_ms = floor_ms;
                }
            }
        }
    }
}

/// Capability handle for the synthesis collaborator. The backend may be
/// entirely absent (no audio device, permission denied); [`NullSynth`]
/// stands in so call sites stay unconditional.
pub trait SynthBackend: Send {
    /// Post a command. `now_ms` is the core's monotonic clock; commands
    /// whose timestamp would land at or before now are clamped to
    /// `now + epsilon` rather than dropped, so the groove never gaps.
    fn send(&mut self, cmd: SynthCommand, now_ms: f64);
}

/// No-op backend for when no synthesis collaborator is attached.
/// All internal state keeps updating; only the output disappears.
pub struct NullSynth;

impl SynthBackend for NullSynth {
    fn send(&mut self, _cmd: SynthCommand, _now_ms: f64) {}
}

/// Backend that forwards commands over a channel to whatever renders them
/// (OSC sender, test collector). Sends are fire-and-forget: a gone
/// receiver silently degrades to no output, it never stops the conductor.
pub struct ChannelSynth {
    tx: Sender<SynthCommand>,
    epsilon_ms: f64,
}

impl ChannelSynth {
    pub fn new(tx: Sender<SynthCommand>, epsilon_ms: f64) -> Self {
        Self { tx, epsilon_ms }
    }
}

impl SynthBackend for ChannelSynth {
    fn send(&mut self, mut cmd: SynthCommand, now_ms: f64) {
        if cmd.at_ms() <= now_ms {
            trace!(
                "synth: clamping underrun {:.2}ms behind now",
                now_ms - cmd.at_ms()
            );
            cmd.clamp_at(now_ms + self.epsilon_ms);
        }
        let _ = self.tx.send(cmd);
    }
}
