use crate::context::MusicalContext;
use crate::motion::MotionState;
use crate::session_arc::SessionArc;
use crate::synth::{SynthBackend, SynthCommand, VoiceKind};
use crate::tuning::Tuning;
use crate::types::{MotionPattern, INSTRUMENT_COUNT, KICK};
use log::info;

const STEPS: usize = 16;

/// Shared amplitude multiplier applied to the non-percussive bus.
/// Every kick drops it to `dip` immediately; it recovers linearly to 1.0
/// over the release time. The value is always within `[dip, 1.0]`.
#[derive(Debug, Clone)]
pub struct DuckingEnvelope {
    dip: f64,
    release_ms: f64,
    last_trigger_ms: Option<f64>,
}

impl DuckingEnvelope {
    pub fn new(dip: f64, release_ms: f64) -> Self {
        Self {
            dip,
            release_ms,
            last_trigger_ms: None,
        }
    }

    pub fn trigger(&mut self, at_ms: f64) {
        self.last_trigger_ms = Some(at_ms);
    }

    /// Envelope value at time `t_ms`.
    pub fn value(&self, t_ms: f64) -> f64 {
        match self.last_trigger_ms {
            None => 1.0,
            Some(trig) => {
                if t_ms < trig {
                    1.0 // query before the scheduled dip
                } else {
                    let progress = ((t_ms - trig) / self.release_ms).clamp(0.0, 1.0);
                    self.dip + (1.0 - self.dip) * progress
                }
            }
        }
    }
}

/// Fixed 16-step cyclic pattern: per-instrument trigger velocities,
/// 0.0 meaning silent on that step.
type Pattern = [[f64; STEPS]; INSTRUMENT_COUNT];

/// Backbeat pattern the sequencer starts from. Kick on 0/8 with a pickup,
/// snare on the backbeats, eighth hats, offbeat shaker.
fn base_pattern() -> Pattern {
    [
        // kick
        [
            0.9, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0, //
            0.9, 0.0, 0.0, 0.6, 0.0, 0.0, 0.0, 0.0,
        ],
        // snare
        [
            0.0, 0.0, 0.0, 0.0, 0.8, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, 0.8, 0.0, 0.0, 0.3,
        ],
        // hat
        [
            0.5, 0.0, 0.4, 0.0, 0.5, 0.0, 0.4, 0.0, //
            0.5, 0.0, 0.4, 0.0, 0.5, 0.0, 0.4, 0.2,
        ],
        // shaker
        [
            0.0, 0.3, 0.0, 0.3, 0.0, 0.3, 0.0, 0.3, //
            0.0, 0.3, 0.0, 0.3, 0.0, 0.3, 0.0, 0.3,
        ],
    ]
}

/// Swing-timed look-ahead step sequencer driving the percussive layer and
/// the shared ducking envelope.
///
/// Each tick, while the next step falls inside the lookahead window, the
/// sequencer reads the velocity table for the current step, posts trigger
/// requests at the step's timestamp, advances the step index modulo 16,
/// and advances `next_step_time` by the swung step duration. Scheduled
/// timestamps are strictly increasing; an underrun clamps to now + epsilon
/// rather than dropping the step (an audible gap is worse than a late hit).
///
/// The sequencer starts when session energy crosses the enable threshold
/// and tears down fully (texture voice included) when energy drops below
/// the lower stop threshold. The gap between the two prevents start/stop
/// chatter around a single boundary.
pub struct GrooveSequencer {
    pattern: Pattern,
    pub running: bool,
    pub step_index: usize,
    pub next_step_ms: f64,
    pub tempo_bpm: f64,
    pub duck: DuckingEnvelope,
    /// Density scaling applied to non-kick velocities, from the context
    density: f64,
    texture_voice_id: u32,
    tuning: Tuning,
}

impl GrooveSequencer {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            pattern: base_pattern(),
            running: false,
            step_index: 0,
            next_step_ms: 0.0,
            tempo_bpm: 90.0,
            duck: DuckingEnvelope::new(tuning.duck_dip, tuning.duck_release_ms),
            density: 0.5,
            texture_voice_id: 9000,
            tuning: tuning.clone(),
        }
    }

    /// Per-tick update: recompute tempo, apply start/stop hysteresis, and
    /// schedule every step due inside the lookahead window.
    pub fn update(
        &mut self,
        now_ms: f64,
        motion: &MotionState,
        ctx: &MusicalContext,
        arc: &SessionArc,
        synth: &mut dyn SynthBackend,
    ) {
        self.update_tempo(motion, ctx, arc);
        self.density = ctx.rhythmic_density;

        let profile = arc.profile();
        if !self.running {
            if profile.groove_enabled && arc.energy > self.tuning.groove_start_energy {
                self.start(now_ms, ctx, synth);
            } else {
                return;
            }
        } else if !profile.groove_enabled || arc.energy < self.tuning.groove_stop_energy {
            self.stop(now_ms, synth);
            return;
        }

        // Look-ahead scheduling: queue everything due before the renderer
        // would need it, so it never stalls waiting on a decision.
        while self.next_step_ms < now_ms + self.tuning.lookahead_ms {
            self.schedule_step(now_ms, synth);
        }
    }

    fn start(&mut self, now_ms: f64, ctx: &MusicalContext, synth: &mut dyn SynthBackend) {
        info!("groove: starting at {:.0} bpm", self.tempo_bpm);
        self.running = true;
        self.step_index = 0;
        self.next_step_ms = now_ms + self.tuning.schedule_epsilon_ms;
        synth.send(
            SynthCommand::StartVoice {
                kind: VoiceKind::GrooveTexture,
                id: self.texture_voice_id,
                freq_hz: ctx.harmonic_root_hz,
                at_ms: now_ms + self.tuning.schedule_epsilon_ms,
            },
            now_ms,
        );
    }

    /// Full teardown, including the ambient texture voice the groove owns.
    fn stop(&mut self, now_ms: f64, synth: &mut dyn SynthBackend) {
        info!("groove: stopping (energy below floor)");
        self.running = false;
        self.step_index = 0;
        synth.send(
            SynthCommand::StopVoice {
                id: self.texture_voice_id,
                at_ms: now_ms + self.tuning.schedule_epsilon_ms,
            },
            now_ms,
        );
    }

    fn schedule_step(&mut self, now_ms: f64, synth: &mut dyn SynthBackend) {
        // Underrun guard: never let a step land at or before now.
        if self.next_step_ms <= now_ms {
            self.next_step_ms = now_ms + self.tuning.schedule_epsilon_ms;
        }
        let at = self.next_step_ms;

        for inst in 0..INSTRUMENT_COUNT {
            let base_vel = self.pattern[inst][self.step_index];
            if base_vel <= 0.0 {
                continue;
            }
            // Kicks anchor the groove at full weight; the rest scale with
            // rhythmic density so sparse play stays sparse.
            let vel = if inst == KICK {
                base_vel
            } else {
                base_vel * (0.3 + 0.7 * self.density)
            };
            if vel < 0.05 {
                continue;
            }
            synth.send(
                SynthCommand::Trigger {
                    instrument: inst,
                    velocity: vel,
                    at_ms: at,
                },
                now_ms,
            );
            // Every kick ducks the ambient bus, even when the kick sample
            // itself renders silent downstream.
            if inst == KICK {
                self.duck.trigger(at);
                synth.send(
                    SynthCommand::Duck {
                        dip: self.tuning.duck_dip,
                        release_ms: self.tuning.duck_release_ms,
                        at_ms: at,
                    },
                    now_ms,
                );
            }
        }

        // Swing: even steps stretch, odd steps shrink, long-short pairs.
        let nominal = self.step_duration_ms();
        let swung = if self.step_index % 2 == 0 {
            nominal * (1.0 + self.tuning.swing)
        } else {
            nominal * (1.0 - self.tuning.swing)
        };
        self.step_index = (self.step_index + 1) % STEPS;
        self.next_step_ms += swung;
    }

    /// Nominal (unswung) 16th-note duration at the current tempo.
    fn step_duration_ms(&self) -> f64 {
        60_000.0 / self.tempo_bpm / 4.0
    }

    /// Tempo target: arc base plus motion contributions plus a pattern
    /// bonus, biased toward the performer's tapped tempo when one is
    /// detected, then smoothed 95/5 and clamped to the sane range.
    fn update_tempo(&mut self, motion: &MotionState, ctx: &MusicalContext, arc: &SessionArc) {
        let pattern_bonus = match motion.pattern {
            MotionPattern::Still | MotionPattern::Gentle => 0.0,
            MotionPattern::Rhythmic => 6.0,
            MotionPattern::Vigorous => 12.0,
            MotionPattern::Chaotic => 18.0,
        };
        let mut target = arc.profile().base_tempo_bpm
            + motion.avg_motion * 4.0
            + motion.intensity * 3.0
            + pattern_bonus;
        if ctx.detected_bpm > 0.0 {
            // The performer set a beat; meet them most of the way.
            target = target * 0.3 + ctx.detected_bpm * 0.7;
        }
        let t = &self.tuning;
        self.tempo_bpm = (self.tempo_bpm * t.tempo_smoothing + target * (1.0 - t.tempo_smoothing))
            .clamp(t.tempo_min_bpm, t.tempo_max_bpm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_arc::ArcPhase;
    use crossbeam_channel::{unbounded, Receiver};

    struct Collector {
        tx: crossbeam_channel::Sender<SynthCommand>,
    }

    impl SynthBackend for Collector {
        fn send(&mut self, cmd: SynthCommand, _now_ms: f64) {
            let _ = self.tx.send(cmd);
        }
    }

    fn harness() -> (
        GrooveSequencer,
        MotionState,
        MusicalContext,
        SessionArc,
        Collector,
        Receiver<SynthCommand>,
    ) {
        let t = Tuning::default();
        let (tx, rx) = unbounded();
        let mut arc = SessionArc::new(&t);
        arc.phase = ArcPhase::Flow; // groove-enabled phase
        (
            GrooveSequencer::new(&t),
            MotionState::new(&t),
            MusicalContext::new(&t),
            arc,
            Collector { tx },
            rx,
        )
    }

    #[test]
    fn test_duck_envelope_bounds_and_recovery() {
        // A single kick → immediate drop to dip, linear
        // recovery reaching 1.0 at exactly trigger + release.
        let duck = DuckingEnvelope::new(0.15, 180.0);
        assert_eq!(duck.value(0.0), 1.0);

        let mut duck = DuckingEnvelope::new(0.15, 180.0);
        duck.trigger(1000.0);
        assert!((duck.value(1000.0) - 0.15).abs() < 1e-12, "dips immediately");
        let halfway = duck.value(1090.0);
        assert!(
            (halfway - (0.15 + 0.85 * 0.5)).abs() < 1e-9,
            "linear recovery, got {}",
            halfway
        );
        assert!((duck.value(1180.0) - 1.0).abs() < 1e-12, "fully recovered at release");
        assert_eq!(duck.value(5000.0), 1.0);

        // Never outside [dip, 1.0] at any sampled instant
        for i in 0..500 {
            let v = duck.value(900.0 + i as f64 * 2.0);
            assert!((0.15..=1.0).contains(&v), "value {} out of bounds", v);
        }
    }

    #[test]
    fn test_next_step_time_strictly_increasing() {
        let (mut g, m, ctx, mut arc, mut synth, rx) = harness();
        arc.energy = 0.8;

        let mut prev = f64::MIN;
        for tick in 0..600 {
            let now = tick as f64 * 16.7;
            g.update(now, &m, &ctx, &arc, &mut synth);
            assert!(
                g.next_step_ms >= prev,
                "next_step_ms must never move backwards (tick {})",
                tick
            );
            assert!(g.next_step_ms > now, "always scheduled ahead of now");
            prev = g.next_step_ms;
        }

        // Scheduled trigger timestamps must also be strictly increasing
        let mut last_at = f64::MIN;
        for cmd in rx.try_iter() {
            if let SynthCommand::Trigger { at_ms, .. } = cmd {
                assert!(at_ms >= last_at, "trigger timestamps went backwards");
                last_at = at_ms;
            }
        }
        assert!(last_at > 0.0, "some triggers were scheduled");
    }

    #[test]
    fn test_hysteresis_start_stop() {
        let (mut g, m, ctx, mut arc, mut synth, _rx) = harness();

        arc.energy = 0.3; // above stop, below start
        g.update(0.0, &m, &ctx, &arc, &mut synth);
        assert!(!g.running, "must not start below the start threshold");

        arc.energy = 0.5;
        g.update(16.7, &m, &ctx, &arc, &mut synth);
        assert!(g.running, "starts above the start threshold");

        arc.energy = 0.3; // inside the hysteresis gap
        g.update(33.4, &m, &ctx, &arc, &mut synth);
        assert!(g.running, "keeps running inside the gap");

        arc.energy = 0.2;
        g.update(50.1, &m, &ctx, &arc, &mut synth);
        assert!(!g.running, "stops below the stop threshold");
    }

    #[test]
    fn test_stop_tears_down_texture_voice() {
        let (mut g, m, ctx, mut arc, mut synth, rx) = harness();
        arc.energy = 0.8;
        g.update(0.0, &m, &ctx, &arc, &mut synth);
        arc.energy = 0.1;
        g.update(16.7, &m, &ctx, &arc, &mut synth);

        let cmds: Vec<SynthCommand> = rx.try_iter().collect();
        assert!(
            cmds.iter()
                .any(|c| matches!(c, SynthCommand::StartVoice { .. })),
            "texture voice allocated on start"
        );
        assert!(
            cmds.iter().any(|c| matches!(c, SynthCommand::StopVoice { .. })),
            "texture voice released on stop"
        );
    }

    #[test]
    fn test_kick_always_posts_duck() {
        let (mut g, m, ctx, mut arc, mut synth, rx) = harness();
        arc.energy = 0.8;
        // Enough ticks to cover at least one full 16-step cycle
        for tick in 0..400 {
            g.update(tick as f64 * 16.7, &m, &ctx, &arc, &mut synth);
        }

        let cmds: Vec<SynthCommand> = rx.try_iter().collect();
        let kicks: Vec<f64> = cmds
            .iter()
            .filter_map(|c| match c {
                SynthCommand::Trigger {
                    instrument, at_ms, ..
                } if *instrument == KICK => Some(*at_ms),
                _ => None,
            })
            .collect();
        let ducks: Vec<f64> = cmds
            .iter()
            .filter_map(|c| match c {
                SynthCommand::Duck { at_ms, .. } => Some(*at_ms),
                _ => None,
            })
            .collect();
        assert!(!kicks.is_empty());
        assert_eq!(
            kicks.len(),
            ducks.len(),
            "every kick must be paired with a duck request"
        );
        for (k, d) in kicks.iter().zip(ducks.iter()) {
            assert!((k - d).abs() < 1e-9, "duck scheduled at the kick timestamp");
        }
    }

    #[test]
    fn test_swing_alternates_step_durations() {
        let (mut g, m, ctx, mut arc, mut synth, rx) = harness();
        arc.energy = 0.8;
        for tick in 0..400 {
            g.update(tick as f64 * 16.7, &m, &ctx, &arc, &mut synth);
        }

        // Every step triggers something (hats on evens, shaker on odds),
        // so the distinct trigger timestamps are the step boundaries.
        // Swing makes consecutive gaps alternate long-short.
        let mut times: Vec<f64> = rx
            .try_iter()
            .filter_map(|c| match c {
                SynthCommand::Trigger { at_ms, .. } => Some(at_ms),
                _ => None,
            })
            .collect();
        times.dedup();
        assert!(times.len() > 8);
        let d0 = times[1] - times[0];
        let d1 = times[2] - times[1];
        let d2 = times[3] - times[2];
        assert!(
            d0 > d1 && d2 > d1,
            "even steps stretch, odd steps shrink: {:.1} {:.1} {:.1}",
            d0,
            d1,
            d2
        );
    }

    #[test]
    fn test_tempo_clamped_to_range() {
        let (mut g, mut m, ctx, mut arc, mut synth, _rx) = harness();
        arc.energy = 0.8;
        // Saturate motion to push the target far above the ceiling
        for i in 0..300 {
            m.ingest(&crate::types::MotionSample {
                t_ms: i as f64,
                dx: 50.0,
                dy: 0.0,
                dz: 0.0,
            });
        }
        m.classify();
        for tick in 0..2000 {
            g.update(tick as f64 * 16.7, &m, &ctx, &arc, &mut synth);
        }
        assert!(g.tempo_bpm <= 140.0, "tempo above clamp: {:.1}", g.tempo_bpm);
        assert!(g.tempo_bpm >= 60.0);
    }

    #[test]
    fn test_tempo_follows_tapped_beat() {
        let (mut g, m, mut ctx, mut arc, mut synth, _rx) = harness();
        arc.energy = 0.8;
        ctx.detected_bpm = 120.0;
        for tick in 0..2000 {
            g.update(tick as f64 * 16.7, &m, &ctx, &arc, &mut synth);
        }
        // Target = 0.3*base(96) + 0.7*120 = 112.8
        assert!(
            (g.tempo_bpm - 112.8).abs() < 3.0,
            "tempo should settle near the biased target, got {:.1}",
            g.tempo_bpm
        );
    }
}
