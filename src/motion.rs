use crate::tuning::Tuning;
use crate::types::{MotionPattern, MotionSample};
use log::trace;
use std::collections::VecDeque;

/// Smooths raw motion deltas and classifies the current movement regime.
///
/// # How it works
///
/// Each raw sample's magnitude is folded into an exponential moving average
/// (heavy on the old value, so single spikes barely register). The smoothed
/// values go into a fixed-capacity ring; classification looks only at that
/// window's mean and mean absolute deviation, so the same window always
/// yields the same pattern.
///
/// # Classification rules
///
/// Ordered threshold rules, evaluated low-to-high, first match wins —
/// no blending between regimes:
///
/// ```text
///   avg < 0.3               → Still
///   avg < 0.8 ∧ mad < 0.5   → Gentle
///   mad < 1.5 ∧ avg ≥ 0.8   → Rhythmic
///   avg > 1.5 ∧ mad < 3     → Vigorous
///   mad ≥ 3                 → Chaotic
/// ```
///
/// Anything that falls through (and any window with fewer than 20 samples)
/// retains the previous pattern.
pub struct MotionState {
    /// EMA-smoothed motion scalar
    motion: f64,
    /// Ring of recent smoothed values
    window: VecDeque<f64>,
    /// Mean of the window, recomputed by classify()
    pub avg_motion: f64,
    /// Mean absolute deviation from avg_motion over the window
    pub intensity: f64,
    pub pattern: MotionPattern,
    tuning: Tuning,
}

impl MotionState {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            motion: 0.0,
            window: VecDeque::with_capacity(tuning.motion_window),
            avg_motion: 0.0,
            intensity: 0.0,
            pattern: MotionPattern::Still,
            tuning: tuning.clone(),
        }
    }

    /// Fold one raw sample into the smoothed scalar and the window.
    /// Invalid (NaN/infinite) samples are dropped, not propagated.
    pub fn ingest(&mut self, sample: &MotionSample) {
        if !sample.is_valid() {
            trace!("motion: dropping invalid sample at t={:.1}", sample.t_ms);
            return;
        }
        let mag = sample.magnitude();
        let s = self.tuning.motion_smoothing;
        self.motion = self.motion * s + mag * (1.0 - s);
        if self.window.len() == self.tuning.motion_window {
            self.window.pop_front();
        }
        self.window.push_back(self.motion);
    }

    /// Current smoothed motion scalar.
    pub fn motion(&self) -> f64 {
        self.motion
    }

    /// Recompute window statistics and the movement pattern.
    /// Called once per tick. With too few samples the previous pattern
    /// is retained and the statistics are left untouched.
    pub fn classify(&mut self) -> MotionPattern {
        if self.window.len() < self.tuning.min_samples_to_classify {
            return self.pattern;
        }

        let n = self.window.len() as f64;
        let avg = self.window.iter().sum::<f64>() / n;
        let mad = self.window.iter().map(|v| (v - avg).abs()).sum::<f64>() / n;
        self.avg_motion = avg;
        self.intensity = mad;

        let t = &self.tuning;
        let next = if avg < t.still_avg_max {
            Some(MotionPattern::Still)
        } else if avg < t.gentle_avg_max && mad < t.gentle_mad_max {
            Some(MotionPattern::Gentle)
        } else if mad < t.rhythmic_mad_max && avg >= t.gentle_avg_max {
            Some(MotionPattern::Rhythmic)
        } else if avg > t.vigorous_avg_min && mad < t.vigorous_mad_max {
            Some(MotionPattern::Vigorous)
        } else if mad >= t.chaotic_mad_min {
            Some(MotionPattern::Chaotic)
        } else {
            None // boundary gap — keep what we had
        };

        if let Some(p) = next {
            if p != self.pattern {
                trace!(
                    "motion: {} → {} (avg={:.2} mad={:.2})",
                    self.pattern,
                    p,
                    avg,
                    mad
                );
            }
            self.pattern = p;
        }
        self.pattern
    }

    /// Session-energy contribution of the current motion level.
    /// Only motion above the floor feeds the arc.
    pub fn energy_contribution(&self) -> f64 {
        if self.motion > self.tuning.energy_motion_floor {
            self.motion * self.tuning.energy_motion_rate
        } else {
            0.0
        }
    }

    /// Number of samples currently buffered.
    pub fn sample_count(&self) -> usize {
        self.window.len()
    }
}
