use crate::tuning::Tuning;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro-phases of a session, ordered. The index only ever moves forward;
/// the terminal fade additionally requires a peak to have been reached and
/// energy to have since fallen away — a rising arc with one allowed descent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArcPhase {
    Awakening,
    Discovery,
    Flow,
    Peak,
    Fade,
}

impl fmt::Display for ArcPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArcPhase::Awakening => "awakening",
            ArcPhase::Discovery => "discovery",
            ArcPhase::Flow => "flow",
            ArcPhase::Peak => "peak",
            ArcPhase::Fade => "fade",
        };
        write!(f, "{}", s)
    }
}

/// What a phase makes available to the rest of the engine. Transitions
/// reconfigure the scale, the reverberant space, the groove base tempo,
/// and whether the sequencer may run at all.
#[derive(Debug, Clone)]
pub struct PhaseProfile {
    /// Scale degrees (semitones above the harmonic root) active this phase
    pub scale: &'static [f64],
    /// Reverberant-space amount handed to the synthesis backend, 0.0–1.0
    pub reverb: f64,
    /// Base tempo the groove sequencer builds on
    pub base_tempo_bpm: f64,
    pub groove_enabled: bool,
}

const PENTATONIC: &[f64] = &[0.0, 2.0, 4.0, 7.0, 9.0];
const MAJOR: &[f64] = &[0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0];
const LYDIAN: &[f64] = &[0.0, 2.0, 4.0, 6.0, 7.0, 9.0, 11.0];
const SPARSE: &[f64] = &[0.0, 7.0, 12.0];

/// The slow macro clock pacing the whole performance.
///
/// Advancing requires both a minimum dwell in the current phase and enough
/// accumulated energy. Energy decays passively every idle tick and is
/// boosted by discrete touch/motion events. If the energy thresholds are
/// never crossed the arc simply never advances — a quiet session that stays
/// in Awakening forever is a valid performance, not an error.
pub struct SessionArc {
    pub phase: ArcPhase,
    pub phase_start_ms: f64,
    pub energy: f64,
    pub peak_energy: f64,
    tuning: Tuning,
}

impl SessionArc {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            phase: ArcPhase::Awakening,
            phase_start_ms: 0.0,
            energy: 0.0,
            peak_energy: 0.0,
            tuning: tuning.clone(),
        }
    }

    /// Add energy from a discrete event (touch press, gesture, motion).
    pub fn boost(&mut self, amount: f64) {
        self.energy = (self.energy + amount).clamp(0.0, 1.0);
        if self.energy > self.peak_energy {
            self.peak_energy = self.energy;
        }
    }

    /// Per-tick update: passive decay, then at most one phase advance.
    /// Returns the new phase when a transition happened this tick.
    pub fn update(&mut self, now_ms: f64) -> Option<ArcPhase> {
        self.energy = (self.energy * self.tuning.energy_decay).clamp(0.0, 1.0);

        let t = &self.tuning;
        let dwell = now_ms - self.phase_start_ms;
        let next = match self.phase {
            ArcPhase::Awakening
                if dwell >= t.awakening_dwell_ms && self.energy >= t.discovery_entry_energy =>
            {
                Some(ArcPhase::Discovery)
            }
            ArcPhase::Discovery
                if dwell >= t.discovery_dwell_ms && self.energy >= t.flow_entry_energy =>
            {
                Some(ArcPhase::Flow)
            }
            ArcPhase::Flow if dwell >= t.flow_dwell_ms && self.energy >= t.peak_entry_energy => {
                Some(ArcPhase::Peak)
            }
            // The fade is gated on history, not just the present: a peak
            // must have happened and the room must have gone quiet since.
            ArcPhase::Peak
                if dwell >= t.peak_dwell_ms
                    && self.peak_energy >= t.fade_peak_floor
                    && self.energy < t.fade_energy_ceiling =>
            {
                Some(ArcPhase::Fade)
            }
            _ => None,
        };

        if let Some(phase) = next {
            info!(
                "arc: {} → {} at {:.1}s (energy {:.2}, peak {:.2})",
                self.phase,
                phase,
                now_ms / 1000.0,
                self.energy,
                self.peak_energy
            );
            self.phase = phase;
            self.phase_start_ms = now_ms;
        }
        next
    }

    /// The musical configuration the current phase makes available.
    pub fn profile(&self) -> PhaseProfile {
        match self.phase {
            ArcPhase::Awakening => PhaseProfile {
                scale: SPARSE,
                reverb: 0.7,
                base_tempo_bpm: 72.0,
                groove_enabled: false,
            },
            ArcPhase::Discovery => PhaseProfile {
                scale: PENTATONIC,
                reverb: 0.5,
                base_tempo_bpm: 84.0,
                groove_enabled: true,
            },
            ArcPhase::Flow => PhaseProfile {
                scale: MAJOR,
                reverb: 0.4,
                base_tempo_bpm: 96.0,
                groove_enabled: true,
            },
            ArcPhase::Peak => PhaseProfile {
                scale: LYDIAN,
                reverb: 0.3,
                base_tempo_bpm: 108.0,
                groove_enabled: true,
            },
            ArcPhase::Fade => PhaseProfile {
                scale: SPARSE,
                reverb: 0.8,
                base_tempo_bpm: 66.0,
                groove_enabled: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc() -> SessionArc {
        SessionArc::new(&Tuning::default())
    }

    #[test]
    fn test_energy_decays_strictly_to_zero_floor() {
        // With zero input, energy strictly decreases
        // tick-over-tick until it reaches (never goes below) 0.
        let mut a = arc();
        a.boost(0.8);
        let mut prev = a.energy;
        for tick in 0..10_000 {
            a.update(tick as f64 * 16.7);
            assert!(
                a.energy < prev || a.energy == 0.0 || prev < 1e-300,
                "energy must strictly decrease (tick {}): {} vs {}",
                tick,
                a.energy,
                prev
            );
            assert!(a.energy >= 0.0);
            prev = a.energy;
        }
    }

    #[test]
    fn test_boost_clamps_to_one() {
        let mut a = arc();
        for _ in 0..100 {
            a.boost(0.3);
        }
        assert_eq!(a.energy, 1.0);
        assert_eq!(a.peak_energy, 1.0);
    }

    #[test]
    fn test_no_advance_without_energy() {
        let mut a = arc();
        // An hour of idle ticks — quiet sessions never advance
        for tick in 0..216_000u64 {
            a.update(tick as f64 * 16.7);
        }
        assert_eq!(a.phase, ArcPhase::Awakening);
    }

    #[test]
    fn test_no_advance_before_min_dwell() {
        let mut a = arc();
        a.boost(1.0);
        assert!(a.update(5_000.0).is_none(), "dwell too short to advance");
        assert_eq!(a.phase, ArcPhase::Awakening);
    }

    #[test]
    fn test_full_arc_progression() {
        let mut a = arc();
        let mut now = 0.0;
        let mut seen = vec![a.phase];

        // Keep energy topped up through awakening → peak
        while a.phase != ArcPhase::Peak && now < 400_000.0 {
            now += 16.7;
            a.boost(0.01);
            if let Some(p) = a.update(now) {
                seen.push(p);
            }
        }
        assert_eq!(
            seen,
            vec![
                ArcPhase::Awakening,
                ArcPhase::Discovery,
                ArcPhase::Flow,
                ArcPhase::Peak
            ],
            "phases must advance in order, never skipping"
        );

        // Now let the room go quiet: energy decays, fade becomes reachable
        while a.phase != ArcPhase::Fade && now < 800_000.0 {
            now += 16.7;
            if let Some(p) = a.update(now) {
                seen.push(p);
            }
        }
        assert_eq!(a.phase, ArcPhase::Fade);
    }

    #[test]
    fn test_dwell_and_entry_thresholds_come_from_tuning() {
        let mut t = Tuning::default();
        t.awakening_dwell_ms = 1_000.0;
        t.discovery_entry_energy = 0.1;
        let mut a = SessionArc::new(&t);

        a.boost(0.15);
        assert!(a.update(999.0).is_none(), "one tick short of the dwell");
        a.boost(0.05);
        assert_eq!(a.update(1_000.0), Some(ArcPhase::Discovery));
    }

    #[test]
    fn test_fade_requires_prior_peak() {
        let mut a = arc();
        // Force the phase sequence up to Peak with modest energy so
        // peak_energy stays under the fade floor.
        a.phase = ArcPhase::Peak;
        a.phase_start_ms = 0.0;
        a.peak_energy = 0.5; // never reached a real peak
        a.energy = 0.05;
        assert!(a.update(100_000.0).is_none(), "no fade without a real peak");
        assert_eq!(a.phase, ArcPhase::Peak);

        a.peak_energy = 0.9;
        assert_eq!(a.update(100_001.0), Some(ArcPhase::Fade));
    }

    #[test]
    fn test_groove_gating_by_phase() {
        let mut a = arc();
        assert!(!a.profile().groove_enabled, "no groove while awakening");
        a.phase = ArcPhase::Flow;
        assert!(a.profile().groove_enabled);
        a.phase = ArcPhase::Fade;
        assert!(!a.profile().groove_enabled, "fade tears the groove down");
    }
}
