use crate::context::MusicalContext;
use crate::session_arc::SessionArc;
use crate::synth::{SynthBackend, SynthCommand};
use crate::tuning::Tuning;
use crate::types::{GestureEvent, GestureLabel, MomentumDirection, PredictionHint};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArpDirection {
    Up,
    Down,
    /// Up then back down in one run
    Bounce,
}

/// A parameterized musical response, one variant per response family.
/// Carries only the fields that family needs; constructed through the
/// validating helpers below so frequencies and durations are always sane
/// by the time a recipe reaches the synthesis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseRecipe {
    /// Rapid alternation between a base note and an upper neighbor
    Trill {
        base_hz: f64,
        interval_semitones: f64,
        rate_hz: f64,
        duration_ms: f64,
    },
    /// A run across the active scale
    Arpeggio {
        degrees_hz: Vec<f64>,
        direction: ArpDirection,
        step_ms: f64,
    },
    /// Continuous slide between two frequencies
    Glissando {
        from_hz: f64,
        to_hz: f64,
        duration_ms: f64,
    },
    /// A single note repeated in time with the groove
    PulseSync {
        freq_hz: f64,
        pulses: u32,
        interval_ms: f64,
    },
    /// Several scale tones started together with staggered onsets
    ChordBloom {
        freqs_hz: Vec<f64>,
        spread_ms: f64,
    },
    /// A quiet high cluster for responses out of stillness
    Shimmer { freqs_hz: Vec<f64>, duration_ms: f64 },
}

impl ResponseRecipe {
    fn trill(base_hz: f64, interval: f64, rate_hz: f64, duration_ms: f64) -> Self {
        ResponseRecipe::Trill {
            base_hz: base_hz.clamp(20.0, 8000.0),
            interval_semitones: interval.clamp(1.0, 12.0),
            rate_hz: rate_hz.clamp(2.0, 16.0),
            duration_ms: duration_ms.clamp(80.0, 4000.0),
        }
    }

    fn arpeggio(degrees_hz: Vec<f64>, direction: ArpDirection, step_ms: f64) -> Self {
        ResponseRecipe::Arpeggio {
            degrees_hz: degrees_hz
                .into_iter()
                .map(|f| f.clamp(20.0, 8000.0))
                .collect(),
            direction,
            step_ms: step_ms.clamp(30.0, 500.0),
        }
    }

    fn glissando(from_hz: f64, to_hz: f64, duration_ms: f64) -> Self {
        ResponseRecipe::Glissando {
            from_hz: from_hz.clamp(20.0, 8000.0),
            to_hz: to_hz.clamp(20.0, 8000.0),
            duration_ms: duration_ms.clamp(100.0, 5000.0),
        }
    }
}

/// Which branch of a decision table fired, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchBranch {
    Predicted,
    TensionDriven,
    AfterStillness,
    Resolving,
    Default,
}

/// An outstanding "call" the system has made, awaiting an answering
/// gesture. Expires silently; never an error.
struct PendingCall {
    label: GestureLabel,
    expires_at_ms: f64,
}

/// Maps discrete gesture events plus the current musical context to one
/// parameterized response recipe.
///
/// Selection walks a small ordered decision table per gesture label:
/// predicted > tension-driven > resolving > stillness-driven > default,
/// skipping rows a label doesn't define. The chosen
/// recipe is handed to the synthesis collaborator with concrete
/// frequencies and timings computed from the harmonic root, tension,
/// expression depth, and the arc phase's active scale.
pub struct GestureDispatcher {
    tuning: Tuning,
    pending_call: Option<PendingCall>,
    /// Total responses issued, for session stats
    pub responses_issued: u64,
}

impl GestureDispatcher {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            tuning: tuning.clone(),
            pending_call: None,
            responses_issued: 0,
        }
    }

    /// Post a call: the system plays a phrase and waits for an answering
    /// gesture of the given label within the response window.
    pub fn post_call(&mut self, label: GestureLabel, now_ms: f64) {
        trace!("dispatch: call posted for {}", label);
        self.pending_call = Some(PendingCall {
            label,
            expires_at_ms: now_ms + self.tuning.call_window_ms,
        });
    }

    /// Expire a stale call window. Called once per tick.
    pub fn tick(&mut self, now_ms: f64) {
        if let Some(call) = &self.pending_call {
            if now_ms >= call.expires_at_ms {
                trace!("dispatch: call window expired unanswered");
                self.pending_call = None;
            }
        }
    }

    pub fn has_pending_call(&self) -> bool {
        self.pending_call.is_some()
    }

    /// Handle one discrete gesture event. Updates context bookkeeping,
    /// selects a response, and hands it to the synthesis backend.
    /// Returns the branch that fired (None for stillness, which is the
    /// void subsystem's business).
    pub fn on_gesture(
        &mut self,
        event: &GestureEvent,
        ctx: &mut MusicalContext,
        arc: &SessionArc,
        hint: Option<&PredictionHint>,
        synth: &mut dyn SynthBackend,
        now_ms: f64,
    ) -> Option<DispatchBranch> {
        ctx.note_gesture(event.label, event.t_ms);
        if event.label == GestureLabel::Stillness {
            return None;
        }

        // An answered call upgrades the response and clears the window.
        let answered_call = self
            .pending_call
            .as_ref()
            .map(|c| c.label == event.label && now_ms < c.expires_at_ms)
            .unwrap_or(false);
        if answered_call {
            debug!("dispatch: call answered with {}", event.label);
            self.pending_call = None;
        }

        // The four flags every decision table reads.
        let was_predicted = hint
            .map(|h| {
                h.predicted == Some(event.label)
                    && h.confidence >= self.tuning.prediction_confidence_floor
            })
            .unwrap_or(false);
        let high_tension = ctx.tension > self.tuning.high_tension;
        let after_stillness = ctx.gestures_since_stillness <= 1;
        let resolving = ctx.momentum == MomentumDirection::Resolving;

        let (recipe, branch) = self.select(
            event,
            ctx,
            arc,
            was_predicted,
            after_stillness || answered_call,
            high_tension,
            resolving,
        );

        debug!(
            "dispatch: {} int={:.2} → {} via {:?}",
            event.label,
            event.intensity,
            recipe_name(&recipe),
            branch
        );
        synth.send(
            SynthCommand::Play {
                recipe,
                at_ms: now_ms + self.tuning.schedule_epsilon_ms,
            },
            now_ms,
        );
        self.responses_issued += 1;
        Some(branch)
    }

    /// Ordered per-label decision table: predicted > tension > resolving >
    /// stillness > default. First applicable row wins.
    #[allow(clippy::too_many_arguments)]
    fn select(
        &self,
        event: &GestureEvent,
        ctx: &MusicalContext,
        arc: &SessionArc,
        was_predicted: bool,
        after_stillness: bool,
        high_tension: bool,
        resolving: bool,
    ) -> (ResponseRecipe, DispatchBranch) {
        // Touch position doubles as a pitch/section map: x lifts the
        // register up to an octave above the harmonic root, y picks which
        // slice of the degree set the runs draw from.
        let root = semitones_above(ctx.harmonic_root_hz, ctx.touch_register());
        let scale = arc.profile().scale;
        let depth = ctx.expression_depth;
        let tension = ctx.tension;

        // Scale degrees realized from the current harmonic root. Two
        // octaves gives runs somewhere to go.
        let degrees: Vec<f64> = scale
            .iter()
            .map(|s| semitones_above(root, *s))
            .chain(scale.iter().map(|s| semitones_above(root, *s + 12.0)))
            .collect();
        let degrees = match ctx.last_touch {
            Some((_, y)) => {
                let half = degrees.len() / 2;
                let start = ((y * half as f64) as usize).min(half.saturating_sub(1));
                degrees[start..start + half].to_vec()
            }
            None => degrees,
        };

        match event.label {
            GestureLabel::Tap => {
                if was_predicted {
                    // The system saw it coming: answer in time with the beat
                    let interval = if ctx.detected_bpm > 0.0 {
                        60_000.0 / ctx.detected_bpm
                    } else {
                        250.0
                    };
                    (
                        ResponseRecipe::PulseSync {
                            freq_hz: semitones_above(root, 12.0),
                            pulses: 4,
                            interval_ms: interval,
                        },
                        DispatchBranch::Predicted,
                    )
                } else if high_tension {
                    (
                        ResponseRecipe::trill(
                            semitones_above(root, 12.0),
                            1.0 + tension * 2.0,
                            6.0 + tension * 8.0,
                            300.0,
                        ),
                        DispatchBranch::TensionDriven,
                    )
                } else if after_stillness {
                    (
                        ResponseRecipe::Shimmer {
                            freqs_hz: degrees.iter().rev().take(3).copied().collect(),
                            duration_ms: 1200.0,
                        },
                        DispatchBranch::AfterStillness,
                    )
                } else {
                    (
                        ResponseRecipe::PulseSync {
                            freq_hz: semitones_above(root, 7.0),
                            pulses: 1,
                            interval_ms: 0.0,
                        },
                        DispatchBranch::Default,
                    )
                }
            }

            GestureLabel::Swipe => {
                let dir = if event.intensity > 0.6 {
                    ArpDirection::Up
                } else {
                    ArpDirection::Down
                };
                if was_predicted {
                    (
                        ResponseRecipe::arpeggio(degrees, ArpDirection::Bounce, 60.0),
                        DispatchBranch::Predicted,
                    )
                } else if high_tension {
                    (
                        ResponseRecipe::glissando(
                            root,
                            semitones_above(root, 12.0 + tension * 12.0),
                            400.0,
                        ),
                        DispatchBranch::TensionDriven,
                    )
                } else {
                    let step = 120.0 - 60.0 * event.intensity;
                    (
                        ResponseRecipe::arpeggio(degrees, dir, step),
                        DispatchBranch::Default,
                    )
                }
            }

            GestureLabel::Shake => {
                if high_tension {
                    // Lean into the unease: fast wide trill at the tritone
                    (
                        ResponseRecipe::trill(
                            semitones_above(root, 6.0),
                            3.0,
                            12.0,
                            500.0 + depth * 500.0,
                        ),
                        DispatchBranch::TensionDriven,
                    )
                } else if after_stillness {
                    (
                        ResponseRecipe::ChordBloom {
                            freqs_hz: degrees.iter().take(4).copied().collect(),
                            spread_ms: 220.0,
                        },
                        DispatchBranch::AfterStillness,
                    )
                } else {
                    (
                        ResponseRecipe::trill(root, 2.0, 8.0, 350.0),
                        DispatchBranch::Default,
                    )
                }
            }

            GestureLabel::Hold => {
                if was_predicted {
                    (
                        ResponseRecipe::ChordBloom {
                            freqs_hz: degrees.iter().take(5).copied().collect(),
                            spread_ms: 400.0,
                        },
                        DispatchBranch::Predicted,
                    )
                } else if resolving {
                    // De-escalating: settle downward toward the root
                    (
                        ResponseRecipe::glissando(
                            semitones_above(root, 12.0),
                            root,
                            1500.0 + depth * 1500.0,
                        ),
                        DispatchBranch::Resolving,
                    )
                } else {
                    (
                        ResponseRecipe::ChordBloom {
                            freqs_hz: degrees.iter().take(3).copied().collect(),
                            spread_ms: 300.0,
                        },
                        DispatchBranch::Default,
                    )
                }
            }

            GestureLabel::Circle => {
                if was_predicted {
                    (
                        ResponseRecipe::arpeggio(degrees, ArpDirection::Bounce, 45.0),
                        DispatchBranch::Predicted,
                    )
                } else if high_tension {
                    (
                        ResponseRecipe::arpeggio(degrees, ArpDirection::Up, 50.0),
                        DispatchBranch::TensionDriven,
                    )
                } else {
                    (
                        ResponseRecipe::arpeggio(
                            degrees.iter().take(5).copied().collect(),
                            ArpDirection::Up,
                            90.0,
                        ),
                        DispatchBranch::Default,
                    )
                }
            }

            // Handled above; unreachable by construction
            GestureLabel::Stillness => (
                ResponseRecipe::Shimmer {
                    freqs_hz: vec![root],
                    duration_ms: 500.0,
                },
                DispatchBranch::Default,
            ),
        }
    }
}

/// Equal-temperament offset from a root frequency.
pub fn semitones_above(root_hz: f64, semitones: f64) -> f64 {
    root_hz * 2.0_f64.powf(semitones / 12.0)
}

fn recipe_name(r: &ResponseRecipe) -> &'static str {
    match r {
        ResponseRecipe::Trill { .. } => "trill",
        ResponseRecipe::Arpeggio { .. } => "arpeggio",
        ResponseRecipe::Glissando { .. } => "glissando",
        ResponseRecipe::PulseSync { .. } => "pulse",
        ResponseRecipe::ChordBloom { .. } => "bloom",
        ResponseRecipe::Shimmer { .. } => "shimmer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::NullSynth;
    use crate::types::TouchEvent;

    fn setup() -> (GestureDispatcher, MusicalContext, SessionArc) {
        let t = Tuning::default();
        (
            GestureDispatcher::new(&t),
            MusicalContext::new(&t),
            SessionArc::new(&t),
        )
    }

    fn gesture(label: GestureLabel, t_ms: f64) -> GestureEvent {
        GestureEvent {
            label,
            intensity: 0.5,
            t_ms,
        }
    }

    #[test]
    fn test_stillness_resets_and_is_silent() {
        let (mut d, mut ctx, arc) = setup();
        let mut synth = NullSynth;
        d.on_gesture(&gesture(GestureLabel::Tap, 0.0), &mut ctx, &arc, None, &mut synth, 0.0);
        assert_eq!(ctx.gestures_since_stillness, 1);
        let branch = d.on_gesture(
            &gesture(GestureLabel::Stillness, 1000.0),
            &mut ctx,
            &arc,
            None,
            &mut synth,
            1000.0,
        );
        assert!(branch.is_none(), "stillness produces no response here");
        assert_eq!(ctx.gestures_since_stillness, 0);
    }

    #[test]
    fn test_predicted_branch_beats_default() {
        let (mut d, mut ctx, arc) = setup();
        let mut synth = NullSynth;
        let hint = PredictionHint {
            predicted: Some(GestureLabel::Circle),
            confidence: 0.9,
            surprise: 0.0,
        };
        // Two prior gestures so after_stillness is false
        d.on_gesture(&gesture(GestureLabel::Tap, 0.0), &mut ctx, &arc, None, &mut synth, 0.0);
        d.on_gesture(&gesture(GestureLabel::Tap, 400.0), &mut ctx, &arc, None, &mut synth, 400.0);
        let branch = d.on_gesture(
            &gesture(GestureLabel::Circle, 800.0),
            &mut ctx,
            &arc,
            Some(&hint),
            &mut synth,
            800.0,
        );
        assert_eq!(branch, Some(DispatchBranch::Predicted));
    }

    #[test]
    fn test_low_confidence_prediction_ignored() {
        let (mut d, mut ctx, arc) = setup();
        let mut synth = NullSynth;
        let hint = PredictionHint {
            predicted: Some(GestureLabel::Circle),
            confidence: 0.3, // below the floor
            surprise: 0.0,
        };
        d.on_gesture(&gesture(GestureLabel::Tap, 0.0), &mut ctx, &arc, None, &mut synth, 0.0);
        d.on_gesture(&gesture(GestureLabel::Tap, 400.0), &mut ctx, &arc, None, &mut synth, 400.0);
        let branch = d.on_gesture(
            &gesture(GestureLabel::Circle, 800.0),
            &mut ctx,
            &arc,
            Some(&hint),
            &mut synth,
            800.0,
        );
        assert_ne!(branch, Some(DispatchBranch::Predicted));
    }

    #[test]
    fn test_tension_branch_fires_when_restless() {
        let (mut d, mut ctx, arc) = setup();
        let mut synth = NullSynth;
        ctx.tension = 0.7;
        d.on_gesture(&gesture(GestureLabel::Tap, 0.0), &mut ctx, &arc, None, &mut synth, 0.0);
        let branch = d.on_gesture(
            &gesture(GestureLabel::Shake, 400.0),
            &mut ctx,
            &arc,
            None,
            &mut synth,
            400.0,
        );
        assert_eq!(branch, Some(DispatchBranch::TensionDriven));
    }

    #[test]
    fn test_after_stillness_branch() {
        let (mut d, mut ctx, arc) = setup();
        let mut synth = NullSynth;
        // First gesture after stillness: gestures_since_stillness == 1
        let branch = d.on_gesture(
            &gesture(GestureLabel::Shake, 0.0),
            &mut ctx,
            &arc,
            None,
            &mut synth,
            0.0,
        );
        assert_eq!(branch, Some(DispatchBranch::AfterStillness));
    }

    /// Frequency of the most recent PulseSync recipe sent to the channel.
    fn pulse_freq(rx: &crossbeam_channel::Receiver<SynthCommand>) -> f64 {
        let mut f = 0.0;
        for cmd in rx.try_iter() {
            if let SynthCommand::Play {
                recipe: ResponseRecipe::PulseSync { freq_hz, .. },
                ..
            } = cmd
            {
                f = freq_hz;
            }
        }
        f
    }

    #[test]
    fn test_touch_position_shifts_register() {
        let (mut d, mut ctx, arc) = setup();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut synth = crate::synth::ChannelSynth::new(tx, 1.0);
        // Two priors so the default tap row fires below
        d.on_gesture(&gesture(GestureLabel::Tap, 0.0), &mut ctx, &arc, None, &mut synth, 0.0);
        d.on_gesture(&gesture(GestureLabel::Tap, 400.0), &mut ctx, &arc, None, &mut synth, 400.0);

        d.on_gesture(&gesture(GestureLabel::Tap, 800.0), &mut ctx, &arc, None, &mut synth, 800.0);
        let base = pulse_freq(&rx);
        assert!(base > 0.0);

        // A touch at the far right lifts the register a full octave
        ctx.note_touch(&TouchEvent {
            x: 1.0,
            y: 0.0,
            pressed: true,
            t_ms: 900.0,
        });
        d.on_gesture(&gesture(GestureLabel::Tap, 1200.0), &mut ctx, &arc, None, &mut synth, 1200.0);
        let lifted = pulse_freq(&rx);
        assert!(
            (lifted / base - 2.0).abs() < 1e-9,
            "x=1.0 should double the pitch: {:.2} → {:.2}",
            base,
            lifted
        );
    }

    #[test]
    fn test_predicted_hold_beats_resolving() {
        let (mut d, mut ctx, arc) = setup();
        let mut synth = NullSynth;
        ctx.momentum = MomentumDirection::Resolving;
        d.on_gesture(&gesture(GestureLabel::Tap, 0.0), &mut ctx, &arc, None, &mut synth, 0.0);
        d.on_gesture(&gesture(GestureLabel::Tap, 400.0), &mut ctx, &arc, None, &mut synth, 400.0);

        let hint = PredictionHint {
            predicted: Some(GestureLabel::Hold),
            confidence: 0.9,
            surprise: 0.0,
        };
        let branch = d.on_gesture(
            &gesture(GestureLabel::Hold, 800.0),
            &mut ctx,
            &arc,
            Some(&hint),
            &mut synth,
            800.0,
        );
        assert_eq!(
            branch,
            Some(DispatchBranch::Predicted),
            "a confident prediction outranks the resolving row"
        );

        let branch = d.on_gesture(
            &gesture(GestureLabel::Hold, 1200.0),
            &mut ctx,
            &arc,
            None,
            &mut synth,
            1200.0,
        );
        assert_eq!(branch, Some(DispatchBranch::Resolving));
    }

    #[test]
    fn test_call_window_expires_silently() {
        let (mut d, _ctx, _arc) = setup();
        d.post_call(GestureLabel::Tap, 0.0);
        assert!(d.has_pending_call());
        d.tick(2999.0);
        assert!(d.has_pending_call(), "window still open");
        d.tick(3000.0);
        assert!(!d.has_pending_call(), "expiry clears the call, no error");
    }

    #[test]
    fn test_answered_call_clears_window() {
        let (mut d, mut ctx, arc) = setup();
        let mut synth = NullSynth;
        d.post_call(GestureLabel::Tap, 0.0);
        d.on_gesture(&gesture(GestureLabel::Tap, 500.0), &mut ctx, &arc, None, &mut synth, 500.0);
        assert!(!d.has_pending_call());
    }

    #[test]
    fn test_recipes_are_validated() {
        let (mut d, mut ctx, arc) = setup();
        ctx.tension = 0.9;
        // Collect what actually gets sent
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut synth = crate::synth::ChannelSynth::new(tx, 1.0);
        d.on_gesture(&gesture(GestureLabel::Tap, 0.0), &mut ctx, &arc, None, &mut synth, 0.0);
        d.on_gesture(&gesture(GestureLabel::Swipe, 300.0), &mut ctx, &arc, None, &mut synth, 300.0);
        for cmd in rx.try_iter() {
            if let SynthCommand::Play { recipe, .. } = cmd {
                match recipe {
                    ResponseRecipe::Trill { base_hz, rate_hz, .. } => {
                        assert!((20.0..=8000.0).contains(&base_hz));
                        assert!((2.0..=16.0).contains(&rate_hz));
                    }
                    ResponseRecipe::Glissando { from_hz, to_hz, .. } => {
                        assert!((20.0..=8000.0).contains(&from_hz));
                        assert!((20.0..=8000.0).contains(&to_hz));
                    }
                    _ => {}
                }
            }
        }
    }
}
