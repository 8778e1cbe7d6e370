use crate::context::MusicalContext;
use crate::dispatch::GestureDispatcher;
use crate::groove::GrooveSequencer;
use crate::motion::MotionState;
use crate::session_arc::SessionArc;
use crate::synth::SynthBackend;
use crate::tuning::Tuning;
use crate::types::{GestureLabel, InputEvent, PredictionHint, SessionClock, Snapshot, TICK_HZ};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, info};
use std::thread;
use std::time::Duration;

/// All mutable conductor state, owned exclusively by the tick loop.
/// Components receive it piecewise by reference each tick; nothing keeps
/// private static state and no other thread ever mutates it.
pub struct ConductorContext {
    pub motion: MotionState,
    pub music: MusicalContext,
    pub arc: SessionArc,
    pub dispatcher: GestureDispatcher,
    pub groove: GrooveSequencer,
    pub void: crate::void_layer::VoidLayer,
    /// Latest prediction-collaborator signal; None if it never arrives
    hint: Option<PredictionHint>,
    /// Gesture events queued since the last tick
    pending_gestures: Vec<crate::types::GestureEvent>,
    last_tick_ms: f64,
    last_call_ms: f64,
}

impl ConductorContext {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            motion: MotionState::new(tuning),
            music: MusicalContext::new(tuning),
            arc: SessionArc::new(tuning),
            dispatcher: GestureDispatcher::new(tuning),
            groove: GrooveSequencer::new(tuning),
            void: crate::void_layer::VoidLayer::new(tuning),
            hint: None,
            pending_gestures: Vec::new(),
            last_tick_ms: 0.0,
            last_call_ms: f64::MIN,
        }
    }

    /// Queue one input event. Cheap; real processing happens in
    /// [`run_tick`](Self::run_tick). Safe to call with any garbage the
    /// sensors produce — invalid samples are dropped at ingest.
    pub fn apply_event(&mut self, event: InputEvent, tuning: &Tuning) {
        match event {
            InputEvent::Motion(sample) => self.motion.ingest(&sample),
            InputEvent::Touch(touch) => {
                self.music.note_touch(&touch);
                if touch.pressed {
                    self.arc.boost(tuning.touch_energy_boost);
                }
            }
            InputEvent::Gesture(g) => self.pending_gestures.push(g),
            InputEvent::Prediction(h) => self.hint = Some(h),
        }
    }

    /// One conductor tick. Fixed order, nothing suspends mid-tick:
    /// classify → context → arc → gestures → void → groove lookahead.
    pub fn run_tick(&mut self, now_ms: f64, tuning: &Tuning, synth: &mut dyn SynthBackend) {
        let dt_ms = (now_ms - self.last_tick_ms).max(0.0);
        self.last_tick_ms = now_ms;

        // 1. Classification over the motion window
        self.motion.classify();

        // 2. Motion feeds session energy (classifier side effect)
        let contribution = self.motion.energy_contribution();
        if contribution > 0.0 {
            self.arc.boost(contribution);
        }

        // 3. Musical context
        self.music.update(&self.motion, self.arc.energy, self.hint.as_ref());

        // 4. Session arc (phase transitions are logged events)
        self.arc.update(now_ms);

        // 5. Gesture dispatch, drained in arrival order
        let gestures: Vec<_> = self.pending_gestures.drain(..).collect();
        for g in &gestures {
            if g.label != GestureLabel::Stillness {
                self.arc.boost(tuning.gesture_energy_boost * g.intensity);
            }
            self.dispatcher
                .on_gesture(g, &mut self.music, &self.arc, self.hint.as_ref(), synth, now_ms);
        }
        self.dispatcher.tick(now_ms);
        self.maybe_post_call(now_ms);

        // 6. Void layer follows the raw smoothed motion level
        self.void.update(
            now_ms,
            dt_ms,
            self.motion.motion(),
            self.music.harmonic_root_hz,
            synth,
        );

        // 7. Groove lookahead runs last, reading everything above
        self.groove
            .update(now_ms, &self.motion, &self.music, &self.arc, synth);
    }

    /// When the performer has settled into a steady beat, occasionally
    /// answer with a call of our own and leave the window open. At most
    /// one call per 20 s; expiry is silent.
    fn maybe_post_call(&mut self, now_ms: f64) {
        if self.dispatcher.has_pending_call() {
            return;
        }
        if self.music.detected_bpm > 0.0
            && self.music.gestures_since_stillness > 4
            && now_ms - self.last_call_ms > 20_000.0
        {
            self.dispatcher.post_call(GestureLabel::Tap, now_ms);
            self.last_call_ms = now_ms;
        }
    }

    /// Read-only telemetry for rendering and debug layers.
    pub fn snapshot(&self, now_ms: f64) -> Snapshot {
        Snapshot {
            t_ms: now_ms,
            pattern: self.motion.pattern,
            avg_motion: self.motion.avg_motion,
            intensity: self.motion.intensity,
            energy: self.arc.energy,
            tension: self.music.tension,
            harmonic_root_hz: self.music.harmonic_root_hz,
            root_semitone_offset: self.music.root_semitone_offset,
            momentum: self.music.momentum,
            emotional_arc: self.music.emotional_arc,
            expression_depth: self.music.expression_depth,
            rhythmic_density: self.music.rhythmic_density,
            detected_bpm: self.music.detected_bpm,
            arc_phase: self.arc.phase.to_string(),
            void_phase: self.void.phase.to_string(),
            void_depth: self.void.depth,
            groove_running: self.groove.running,
            groove_step: self.groove.step_index,
            tempo_bpm: self.groove.tempo_bpm,
        }
    }
}

/// The conductor thread: drains queued input at the start of each tick,
/// runs the fixed-order update, and fans snapshots out to consumers.
/// Exits when the input channel closes.
pub struct Conductor {
    input_rx: Receiver<InputEvent>,
    snapshot_txs: Vec<Sender<Snapshot>>,
    synth: Box<dyn SynthBackend>,
    clock: SessionClock,
    tuning: Tuning,
    ctx: ConductorContext,
}

impl Conductor {
    pub fn new(
        input_rx: Receiver<InputEvent>,
        snapshot_txs: Vec<Sender<Snapshot>>,
        synth: Box<dyn SynthBackend>,
        clock: SessionClock,
        tuning: Tuning,
    ) -> Self {
        let ctx = ConductorContext::new(&tuning);
        Self {
            input_rx,
            snapshot_txs,
            synth,
            clock,
            tuning,
            ctx,
        }
    }

    /// Run the tick loop. Blocks the calling thread.
    pub fn run(&mut self) {
        info!("Conductor running at {} Hz", TICK_HZ);
        let tick = Duration::from_micros(1_000_000 / TICK_HZ as u64);
        let mut tick_count: u64 = 0;

        loop {
            // Drain everything queued since the last tick. Events are
            // never processed inline from the source threads.
            let mut disconnected = false;
            loop {
                match self.input_rx.try_recv() {
                    Ok(event) => self.ctx.apply_event(event, &self.tuning),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }

            let now = self.clock.now_ms();
            self.ctx.run_tick(now, &self.tuning, self.synth.as_mut());

            let snap = self.ctx.snapshot(now);
            for tx in &self.snapshot_txs {
                let _ = tx.send(snap.clone());
            }

            tick_count += 1;
            if tick_count % 600 == 0 {
                debug!("conductor: {} ticks, {}", tick_count, snap);
            }

            if disconnected {
                break;
            }
            thread::sleep(tick);
        }

        info!("Conductor shutting down after {} ticks", tick_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::NullSynth;
    use crate::types::{GestureEvent, MotionSample, TouchEvent};

    const DT: f64 = 1000.0 / 60.0;

    fn ctx() -> (ConductorContext, Tuning, NullSynth) {
        let t = Tuning::default();
        (ConductorContext::new(&t), t, NullSynth)
    }

    #[test]
    fn test_runs_with_zero_motion_input() {
        // Motion permission denied: only touch energy arrives. The core
        // must keep updating without any motion samples at all.
        let (mut c, t, mut synth) = ctx();
        for i in 0..600 {
            let now = i as f64 * DT;
            if i % 10 == 0 {
                c.apply_event(
                    InputEvent::Touch(TouchEvent {
                        x: 0.5,
                        y: 0.5,
                        pressed: true,
                        t_ms: now,
                    }),
                    &t,
                );
            }
            c.run_tick(now, &t, &mut synth);
        }
        assert!(c.arc.energy > 0.0, "touch alone must sustain energy");
        let snap = c.snapshot(10_000.0);
        assert!(snap.energy > 0.0);
    }

    #[test]
    fn test_energy_rises_during_motion_burst() {
        // 2 s of magnitude-5 samples at 60 Hz should push energy past 0.5
        let (mut c, t, mut synth) = ctx();
        for i in 0..120 {
            let now = i as f64 * DT;
            c.apply_event(
                InputEvent::Motion(MotionSample {
                    t_ms: now,
                    dx: 5.0,
                    dy: 0.0,
                    dz: 0.0,
                }),
                &t,
            );
            c.run_tick(now, &t, &mut synth);
        }
        assert!(
            c.arc.energy > 0.5,
            "burst should push energy above 0.5, got {:.3}",
            c.arc.energy
        );
        let p = c.motion.pattern;
        assert!(
            p == crate::types::MotionPattern::Vigorous || p == crate::types::MotionPattern::Chaotic,
            "burst pattern was {:?}",
            p
        );
    }

    #[test]
    fn test_touch_position_reaches_the_dispatcher() {
        let (mut c, t, mut synth) = ctx();
        c.apply_event(
            InputEvent::Touch(TouchEvent {
                x: 0.75,
                y: 0.25,
                pressed: true,
                t_ms: 0.0,
            }),
            &t,
        );
        c.run_tick(DT, &t, &mut synth);
        assert_eq!(c.music.last_touch, Some((0.75, 0.25)));
        assert!((c.music.touch_register() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_gesture_events_processed_at_tick_not_inline() {
        let (mut c, t, mut synth) = ctx();
        c.apply_event(
            InputEvent::Gesture(GestureEvent {
                label: GestureLabel::Tap,
                intensity: 0.8,
                t_ms: 5.0,
            }),
            &t,
        );
        // Queued, not yet dispatched
        assert_eq!(c.dispatcher.responses_issued, 0);
        c.run_tick(DT, &t, &mut synth);
        assert_eq!(c.dispatcher.responses_issued, 1);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let (mut c, t, mut synth) = ctx();
        c.apply_event(
            InputEvent::Gesture(GestureEvent {
                label: GestureLabel::Swipe,
                intensity: 1.0,
                t_ms: 0.0,
            }),
            &t,
        );
        c.run_tick(DT, &t, &mut synth);
        let snap = c.snapshot(DT);
        assert_eq!(snap.arc_phase, "awakening");
        assert_eq!(snap.void_phase, "present");
        assert!(snap.energy > 0.0);
        // Snapshot must serialize for the telemetry consumers
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"arc_phase\":\"awakening\""));
    }

    #[test]
    fn test_prediction_hint_optional() {
        let (mut c, t, mut synth) = ctx();
        // Without any hint the loop runs and tension stays calm
        for i in 0..300 {
            c.run_tick(i as f64 * DT, &t, &mut synth);
        }
        assert!(c.music.tension < 0.05);

        // With a surprising hint tension climbs
        c.apply_event(
            InputEvent::Prediction(PredictionHint {
                predicted: None,
                confidence: 0.0,
                surprise: 1.0,
            }),
            &t,
        );
        for i in 300..900 {
            c.run_tick(i as f64 * DT, &t, &mut synth);
        }
        assert!(c.music.tension > 0.3);
    }
}
