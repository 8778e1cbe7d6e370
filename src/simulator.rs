use crate::types::{
    GestureEvent, GestureLabel, InputEvent, MotionSample, PredictionHint, SessionClock, TouchEvent,
};
use crossbeam_channel::Sender;
use log::info;
use std::f64::consts::TAU;
use std::thread;
use std::time::Duration;

/// Generates scripted motion, touch, and gesture input that exercises the
/// full conductor pipeline without any sensors attached.
pub struct Simulator {
    clock: SessionClock,
    tx: Sender<InputEvent>,
    rate_hz: u32,
    /// Deterministic phase for pseudo-noise motion texture
    noise_phase: f64,
}

impl Simulator {
    pub fn new(clock: SessionClock, tx: Sender<InputEvent>, rate_hz: u32) -> Self {
        Self {
            clock,
            tx,
            rate_hz,
            noise_phase: 0.0,
        }
    }

    /// Run the named demo performance. Blocks the calling thread.
    pub fn run(&mut self, demo: &str) {
        info!("Simulator starting '{}' performance...", demo);
        let moves = match demo {
            "tempo" => tempo_performance(),
            "still" => stillness_performance(),
            _ => basic_performance(),
        };

        for m in &moves {
            self.execute(m);
        }

        info!("Performance complete. Holding final stillness...");
        loop {
            self.emit_motion(0.02, 1);
        }
    }

    fn execute(&mut self, m: &Move) {
        let tick_ms = 1000.0 / self.rate_hz as f64;
        match m {
            Move::Stillness { ms } => {
                info!("  stillness {}ms", ms);
                let ticks = (*ms as f64 / tick_ms) as u32;
                self.emit_motion(0.02, ticks);
                let _ = self.tx.send(InputEvent::Gesture(GestureEvent {
                    label: GestureLabel::Stillness,
                    intensity: 0.0,
                    t_ms: self.clock.now_ms(),
                }));
            }

            Move::Sway { level, ms } => {
                info!("  sway level={:.1} for {}ms", level, ms);
                let ticks = (*ms as f64 / tick_ms) as u32;
                self.emit_motion(*level, ticks);
            }

            Move::Burst { level, ms } => {
                info!("  burst level={:.1} for {}ms", level, ms);
                let ticks = (*ms as f64 / tick_ms) as u32;
                self.emit_motion(*level, ticks);
            }

            Move::Gesture { label, intensity } => {
                info!("  gesture {}", label);
                let _ = self.tx.send(InputEvent::Gesture(GestureEvent {
                    label: *label,
                    intensity: *intensity,
                    t_ms: self.clock.now_ms(),
                }));
            }

            Move::TapRhythm { count, interval_ms } => {
                info!("  tap rhythm: {} taps at {}ms", count, interval_ms);
                for _ in 0..*count {
                    let _ = self.tx.send(InputEvent::Gesture(GestureEvent {
                        label: GestureLabel::Tap,
                        intensity: 0.6,
                        t_ms: self.clock.now_ms(),
                    }));
                    // Light motion between taps keeps the classifier honest
                    let ticks = (*interval_ms as f64 / tick_ms) as u32;
                    self.emit_motion(0.6, ticks);
                }
            }

            Move::TouchSwell { ms } => {
                info!("  touch swell {}ms", ms);
                let ticks = (*ms as f64 / tick_ms) as u32;
                for i in 0..ticks {
                    let t = i as f64 / ticks.max(1) as f64;
                    let _ = self.tx.send(InputEvent::Touch(TouchEvent {
                        x: 0.2 + 0.6 * t,
                        y: 0.5,
                        pressed: true,
                        t_ms: self.clock.now_ms(),
                    }));
                    self.emit_motion(0.3, 1);
                }
            }

            Move::Hint { surprise } => {
                let _ = self.tx.send(InputEvent::Prediction(PredictionHint {
                    predicted: None,
                    confidence: 0.0,
                    surprise: *surprise,
                }));
            }
        }
    }

    /// Emit `ticks` motion samples around the given level, with a little
    /// sinusoidal wobble so the window statistics look like a hand, not a
    /// square wave.
    fn emit_motion(&mut self, level: f64, ticks: u32) {
        let tick_ms = 1000.0 / self.rate_hz as f64;
        for _ in 0..ticks {
            self.noise_phase = (self.noise_phase + 0.37) % TAU;
            let wobble = 1.0 + 0.3 * self.noise_phase.sin();
            let mag = level * wobble;
            let _ = self.tx.send(InputEvent::Motion(MotionSample {
                t_ms: self.clock.now_ms(),
                dx: mag * 0.6,
                dy: mag * 0.3,
                dz: mag * 0.1,
            }));
            thread::sleep(Duration::from_micros((tick_ms * 1000.0) as u64));
        }
    }
}

// ─── Performance scripts ────────────────────────────────────────────────────

enum Move {
    Stillness { ms: u32 },
    Sway { level: f64, ms: u32 },
    Burst { level: f64, ms: u32 },
    Gesture { label: GestureLabel, intensity: f64 },
    TapRhythm { count: u32, interval_ms: u32 },
    TouchSwell { ms: u32 },
    Hint { surprise: f64 },
}

/// A ~90 second session touring every gesture family: quiet opening,
/// gentle sway, building taps, a vigorous peak, and a long settle.
fn basic_performance() -> Vec<Move> {
    vec![
        Move::Stillness { ms: 2000 },
        Move::TouchSwell { ms: 3000 },
        Move::Sway { level: 0.6, ms: 8000 },
        Move::Gesture { label: GestureLabel::Swipe, intensity: 0.5 },
        Move::Sway { level: 0.7, ms: 5000 },
        Move::Gesture { label: GestureLabel::Circle, intensity: 0.6 },
        Move::TapRhythm { count: 12, interval_ms: 500 },
        Move::Hint { surprise: 0.4 },
        Move::Burst { level: 2.5, ms: 6000 },
        Move::Gesture { label: GestureLabel::Shake, intensity: 0.9 },
        Move::Burst { level: 3.5, ms: 8000 },
        Move::Gesture { label: GestureLabel::Hold, intensity: 0.7 },
        Move::Sway { level: 0.8, ms: 10_000 },
        Move::Gesture { label: GestureLabel::Swipe, intensity: 0.8 },
        Move::Sway { level: 0.4, ms: 10_000 },
        Move::Hint { surprise: 0.1 },
        Move::Stillness { ms: 15_000 },
    ]
}

/// Locks a steady tapped beat, then breaks it, to exercise tempo
/// detection and decay.
fn tempo_performance() -> Vec<Move> {
    vec![
        Move::Sway { level: 0.5, ms: 3000 },
        Move::TapRhythm { count: 16, interval_ms: 500 },
        Move::Sway { level: 0.6, ms: 5000 },
        Move::TapRhythm { count: 16, interval_ms: 500 },
        Move::Burst { level: 2.0, ms: 5000 },
        Move::Stillness { ms: 8000 },
    ]
}

/// Mostly stillness — drives the void layer through its full depth range.
fn stillness_performance() -> Vec<Move> {
    vec![
        Move::Sway { level: 0.6, ms: 4000 },
        Move::Gesture { label: GestureLabel::Tap, intensity: 0.5 },
        Move::Stillness { ms: 20_000 },
        Move::Gesture { label: GestureLabel::Tap, intensity: 0.4 },
        Move::Stillness { ms: 30_000 },
    ]
}
