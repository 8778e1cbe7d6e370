use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Motion input ───────────────────────────────────────────────────────────

/// One raw accelerometer delta: magnitude of change on each axis since the
/// prior sample. Ephemeral — consumed immediately into the smoothed scalar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionSample {
    /// Milliseconds since session start
    pub t_ms: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl MotionSample {
    /// Combined magnitude of the delta across all three axes.
    pub fn magnitude(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy + self.dz * self.dz).sqrt()
    }

    /// A sample with NaN/infinite components is a sensor glitch, not data.
    pub fn is_valid(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite() && self.dz.is_finite()
    }
}

/// Classified movement regime over the recent motion window.
/// Serializes as plain strings for the telemetry consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MotionPattern {
    Still,
    Gentle,
    Rhythmic,
    Vigorous,
    Chaotic,
}

impl fmt::Display for MotionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MotionPattern::Still => "still",
            MotionPattern::Gentle => "gentle",
            MotionPattern::Rhythmic => "rhythmic",
            MotionPattern::Vigorous => "vigorous",
            MotionPattern::Chaotic => "chaotic",
        };
        write!(f, "{}", s)
    }
}

// ─── Gesture and touch input ────────────────────────────────────────────────

/// Discrete gesture shapes identified upstream (short-window shape detector).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GestureLabel {
    Tap,
    Swipe,
    Shake,
    Hold,
    Circle,
    /// Sustained absence of motion. Resets gesture bookkeeping; the void
    /// subsystem owns the musical consequences.
    Stillness,
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GestureLabel::Tap => "tap",
            GestureLabel::Swipe => "swipe",
            GestureLabel::Shake => "shake",
            GestureLabel::Hold => "hold",
            GestureLabel::Circle => "circle",
            GestureLabel::Stillness => "stillness",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GestureEvent {
    pub label: GestureLabel,
    /// 0.0–1.0, from the shape detector's amplitude estimate
    pub intensity: f64,
    pub t_ms: f64,
}

/// Normalized touch/pointer input. Position doubles as a pitch/section map
/// for the dispatcher; presses contribute session energy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TouchEvent {
    /// 0.0–1.0 across the surface
    pub x: f64,
    pub y: f64,
    pub pressed: bool,
    pub t_ms: f64,
}

/// Per-tick hint from the optional prediction collaborator. When that
/// collaborator is absent the conductor never receives one and every
/// prediction-aware branch takes its default path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PredictionHint {
    pub predicted: Option<GestureLabel>,
    /// Confidence in the prediction, 0.0–1.0
    pub confidence: f64,
    /// How surprising the last observed input was, 0.0–1.0
    pub surprise: f64,
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

/// Everything that can arrive from input sources. Events are only ever
/// enqueued here and drained at the start of a tick — never processed
/// inline from an event-handler context.
#[derive(Debug, Clone)]
pub enum InputEvent {
    Motion(MotionSample),
    Touch(TouchEvent),
    Gesture(GestureEvent),
    Prediction(PredictionHint),
}

// ─── Musical direction ──────────────────────────────────────────────────────

/// Coarse classification of where the performance is heading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MomentumDirection {
    Still,
    Building,
    Sustaining,
    Resolving,
}

impl fmt::Display for MomentumDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MomentumDirection::Still => "still",
            MomentumDirection::Building => "building",
            MomentumDirection::Sustaining => "sustaining",
            MomentumDirection::Resolving => "resolving",
        };
        write!(f, "{}", s)
    }
}

// ─── Telemetry snapshot ─────────────────────────────────────────────────────

/// Read-only state snapshot produced once per tick by the conductor.
/// Consumed by the console display, data logger, and OSC output —
/// never written by anything downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub t_ms: f64,
    pub pattern: MotionPattern,
    pub avg_motion: f64,
    pub intensity: f64,
    pub energy: f64,
    pub tension: f64,
    pub harmonic_root_hz: f64,
    pub root_semitone_offset: f64,
    pub momentum: MomentumDirection,
    pub emotional_arc: f64,
    pub expression_depth: f64,
    pub rhythmic_density: f64,
    pub detected_bpm: f64,
    pub arc_phase: String,
    pub void_phase: String,
    pub void_depth: f64,
    pub groove_running: bool,
    pub groove_step: usize,
    pub tempo_bpm: f64,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>8.0}ms  {:>8}  nrg={:.2} tens={:.2} root={:.1}Hz  {:>10}  arc={:<9} void={:.2}  {} {:.0}bpm",
            self.t_ms,
            self.pattern,
            self.energy,
            self.tension,
            self.harmonic_root_hz,
            self.momentum,
            self.arc_phase,
            self.void_depth,
            if self.groove_running { "♩" } else { "·" },
            self.tempo_bpm,
        )
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the conductor session, in milliseconds.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Nominal tick cadence of the conductor loop (display-refresh-ish).
pub const TICK_HZ: u32 = 60;

/// Percussive instruments the groove sequencer knows about.
pub const INSTRUMENT_NAMES: [&str; 4] = ["kick", "snare", "hat", "shaker"];

pub const INSTRUMENT_COUNT: usize = 4;
pub const KICK: usize = 0;
pub const SNARE: usize = 1;
pub const HAT: usize = 2;
pub const SHAKER: usize = 3;
