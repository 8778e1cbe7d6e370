use crate::motion::MotionState;
use crate::tuning::Tuning;
use crate::types::{GestureLabel, MomentumDirection, MotionPattern, PredictionHint, TouchEvent};
use log::trace;
use std::collections::VecDeque;

/// The evolving harmonic/emotional state of the performance.
///
/// Updated exactly once per tick by [`MusicalContext::update`]; read by the
/// gesture dispatcher and the groove sequencer. The unit-interval fields
/// (`tension`, `emotional_arc`, `expression_depth`, `rhythmic_density`)
/// are re-clamped on every update, and the harmonic displacement never
/// exceeds a tritone.
pub struct MusicalContext {
    /// Slow-moving restlessness measure, 0.0–1.0
    pub tension: f64,
    /// Current harmonic root in Hz; drifts around the fixed base
    pub harmonic_root_hz: f64,
    /// Semitone displacement above the base root, 0.0–6.0
    pub root_semitone_offset: f64,
    pub momentum: MomentumDirection,
    pub emotional_arc: f64,
    pub expression_depth: f64,
    pub rhythmic_density: f64,
    /// Detected tap tempo; 0.0 means "no beat detected"
    pub detected_bpm: f64,
    pub last_gesture: Option<GestureLabel>,
    pub gestures_since_stillness: u32,
    /// Most recent touch position, normalized; None until first contact
    pub last_touch: Option<(f64, f64)>,

    /// Last 16 inter-gesture intervals, newest at the back (ms)
    intervals: VecDeque<f64>,
    last_gesture_t_ms: Option<f64>,
    tuning: Tuning,
}

impl MusicalContext {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            tension: 0.0,
            harmonic_root_hz: tuning.base_root_hz,
            root_semitone_offset: 0.0,
            momentum: MomentumDirection::Still,
            emotional_arc: 0.0,
            expression_depth: 0.0,
            rhythmic_density: 0.0,
            detected_bpm: 0.0,
            last_gesture: None,
            gestures_since_stillness: 0,
            last_touch: None,
            intervals: VecDeque::with_capacity(16),
            last_gesture_t_ms: None,
            tuning: tuning.clone(),
        }
    }

    /// Record a discrete gesture for interval bookkeeping. Stillness resets
    /// the counter and breaks the inter-gesture interval chain — a pause
    /// before the next tap shouldn't register as a huge "interval".
    pub fn note_gesture(&mut self, label: GestureLabel, t_ms: f64) {
        if label == GestureLabel::Stillness {
            self.gestures_since_stillness = 0;
            self.last_gesture_t_ms = None;
            return;
        }

        if let Some(prev) = self.last_gesture_t_ms {
            let dt = t_ms - prev;
            if dt > 0.0 {
                if self.intervals.len() == 16 {
                    self.intervals.pop_front();
                }
                self.intervals.push_back(dt);
            }
        }
        self.last_gesture_t_ms = Some(t_ms);
        self.last_gesture = Some(label);
        self.gestures_since_stillness = self.gestures_since_stillness.saturating_add(1);
    }

    /// Record a touch position. The dispatcher reads it back as a pitch
    /// and section map: x selects the register, y windows the scale.
    pub fn note_touch(&mut self, touch: &TouchEvent) {
        self.last_touch = Some((touch.x.clamp(0.0, 1.0), touch.y.clamp(0.0, 1.0)));
    }

    /// Register offset in semitones derived from the touch x-position,
    /// spanning one octave. Zero before the first touch.
    pub fn touch_register(&self) -> f64 {
        self.last_touch.map(|(x, _)| x * 12.0).unwrap_or(0.0)
    }

    /// Per-tick context update. `hint` is the optional prediction
    /// collaborator's signal; absent, tension is driven by harmonic
    /// displacement alone (the non-predictive default branch).
    pub fn update(&mut self, motion: &MotionState, energy: f64, hint: Option<&PredictionHint>) {
        let t = &self.tuning;

        // ── Tension: EMA toward a surprise + harmonic target ──────────
        // The 0.05 factor makes tension resistant to single-frame spikes;
        // the music only gets uneasy when you stay restless.
        let surprise = hint.map(|h| h.surprise).unwrap_or(0.0);
        let harmonic = self.root_semitone_offset / t.root_semitone_cap;
        let target = (surprise * t.tension_surprise_weight
            + harmonic * t.tension_harmonic_weight)
            .clamp(0.0, 1.0);
        self.tension += t.tension_smoothing * (target - self.tension);
        self.tension = self.tension.clamp(0.0, 1.0);

        // ── Harmonic root: drift toward tension * 6 semitones ─────────
        // Full tritone displacement takes sustained high tension over
        // several seconds at the 0.02 drift rate.
        let root_target = self.tension * t.root_semitone_cap;
        self.root_semitone_offset += t.root_smoothing * (root_target - self.root_semitone_offset);
        self.root_semitone_offset = self.root_semitone_offset.clamp(0.0, t.root_semitone_cap);
        self.harmonic_root_hz = t.base_root_hz * 2.0_f64.powf(self.root_semitone_offset / 12.0);

        // ── User tempo detection ──────────────────────────────────────
        self.update_detected_bpm();

        // ── Momentum: pure function of (gestures, energy, tension) ────
        self.momentum = if self.gestures_since_stillness == 0 {
            MomentumDirection::Still
        } else if energy > 0.5 && self.tension > 0.3 {
            MomentumDirection::Building
        } else if energy > 0.3 && self.tension < 0.2 {
            MomentumDirection::Sustaining
        } else if energy < 0.2 {
            MomentumDirection::Resolving
        } else {
            self.momentum // boundary noise — hold the previous direction
        };

        // ── Expressive shading ────────────────────────────────────────
        // Emotional arc follows session energy slowly; expression depth
        // accumulates during gentle, deliberate play and bleeds away
        // otherwise; rhythmic density tracks how beat-like the input is.
        self.emotional_arc += 0.02 * (energy - self.emotional_arc);
        self.emotional_arc = self.emotional_arc.clamp(0.0, 1.0);

        match motion.pattern {
            MotionPattern::Gentle => self.expression_depth += 0.002,
            MotionPattern::Still => {} // holds
            _ => self.expression_depth -= 0.001,
        }
        self.expression_depth = self.expression_depth.clamp(0.0, 1.0);

        let density_target: f64 = match motion.pattern {
            MotionPattern::Still => 0.0,
            MotionPattern::Gentle => 0.2,
            MotionPattern::Rhythmic => 0.7,
            MotionPattern::Vigorous => 0.9,
            MotionPattern::Chaotic => 1.0,
        };
        let density_target = if self.detected_bpm > 0.0 {
            (density_target + 0.2).min(1.0)
        } else {
            density_target
        };
        self.rhythmic_density += 0.05 * (density_target - self.rhythmic_density);
        self.rhythmic_density = self.rhythmic_density.clamp(0.0, 1.0);
    }

    /// If the last 8 intervals are regular (CV < 0.3) with a mean in the
    /// tappable range, lock onto 60000/mean as the performer's beat;
    /// otherwise decay the estimate 5% per tick. The decay never snaps to
    /// zero, so the estimate doesn't chatter at the detection boundary.
    fn update_detected_bpm(&mut self) {
        let t = &self.tuning;
        if self.intervals.len() >= 8 {
            let recent: Vec<f64> = self.intervals.iter().rev().take(8).copied().collect();
            let mean = recent.iter().sum::<f64>() / recent.len() as f64;
            let var =
                recent.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / recent.len() as f64;
            let cv = if mean > 0.0 { var.sqrt() / mean } else { f64::MAX };

            if cv < t.tempo_cv_max
                && mean >= t.tempo_interval_min_ms
                && mean <= t.tempo_interval_max_ms
            {
                let bpm = 60_000.0 / mean;
                if (bpm - self.detected_bpm).abs() > 1.0 {
                    trace!("context: tap tempo locked at {:.1} bpm (cv={:.2})", bpm, cv);
                }
                self.detected_bpm = bpm;
                return;
            }
        }
        self.detected_bpm *= t.tempo_decay;
    }
}
