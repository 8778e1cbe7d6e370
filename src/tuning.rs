//! Every empirically chosen constant in the conductor, gathered in one place.
//!
//! These thresholds and smoothing factors were tuned by ear against live
//! performances; none of them derive from a physical model. Keeping them in
//! a single config struct makes sessions reproducible and lets tests pin
//! exact values without hunting through the engine code.

/// Tunable constants for the whole conductor. `Default` carries the values
/// the engine ships with.
#[derive(Debug, Clone)]
pub struct Tuning {
    // ── Motion classifier ──────────────────────────────────────────────
    /// EMA blend: how much of the old smoothed motion survives each sample.
    pub motion_smoothing: f64,
    /// Ring buffer capacity for smoothed motion values.
    pub motion_window: usize,
    /// Below this many buffered samples, classification is skipped.
    pub min_samples_to_classify: usize,
    /// Pattern boundaries, evaluated low-to-high, first match wins.
    pub still_avg_max: f64,
    pub gentle_avg_max: f64,
    pub gentle_mad_max: f64,
    pub rhythmic_mad_max: f64,
    pub vigorous_avg_min: f64,
    pub vigorous_mad_max: f64,
    pub chaotic_mad_min: f64,
    /// Motion above this feeds session energy...
    pub energy_motion_floor: f64,
    /// ...at this rate per tick.
    pub energy_motion_rate: f64,

    // ── Musical context ────────────────────────────────────────────────
    /// Tension EMA factor toward its per-tick target.
    pub tension_smoothing: f64,
    /// Weight of the surprise signal in the tension target.
    pub tension_surprise_weight: f64,
    /// Weight of the current harmonic displacement in the tension target.
    pub tension_harmonic_weight: f64,
    /// Root drift EMA factor toward `tension * root_semitone_cap`.
    pub root_smoothing: f64,
    /// Maximum harmonic displacement in semitones (a tritone).
    pub root_semitone_cap: f64,
    /// Fixed base the harmonic root drifts around, in Hz.
    pub base_root_hz: f64,
    /// Tap-tempo detection: bounds on the mean inter-gesture interval.
    pub tempo_interval_min_ms: f64,
    pub tempo_interval_max_ms: f64,
    /// Coefficient-of-variation ceiling for "the performer is tapping a beat".
    pub tempo_cv_max: f64,
    /// Per-tick decay applied to the BPM estimate when taps stop.
    pub tempo_decay: f64,

    // ── Session arc ────────────────────────────────────────────────────
    /// Passive per-tick energy decay when no events arrive.
    pub energy_decay: f64,
    /// Energy added per touch press.
    pub touch_energy_boost: f64,
    /// Energy added per discrete gesture, scaled by its intensity.
    pub gesture_energy_boost: f64,
    /// Minimum dwell per phase before the arc may advance out of it.
    pub awakening_dwell_ms: f64,
    pub discovery_dwell_ms: f64,
    pub flow_dwell_ms: f64,
    pub peak_dwell_ms: f64,
    /// Energy floors for entering each successive phase.
    pub discovery_entry_energy: f64,
    pub flow_entry_energy: f64,
    pub peak_entry_energy: f64,
    /// Peak energy that must have been reached before the fade can begin.
    pub fade_peak_floor: f64,
    /// Energy must fall below this for the fade transition.
    pub fade_energy_ceiling: f64,

    // ── Gesture dispatch ───────────────────────────────────────────────
    /// Prediction confidence floor for the "predicted" dispatch branch.
    pub prediction_confidence_floor: f64,
    /// Tension above this selects the tension-driven branch.
    pub high_tension: f64,
    /// Call-and-response window length; expiry silently clears the call.
    pub call_window_ms: f64,

    // ── Groove sequencer ───────────────────────────────────────────────
    /// How far ahead of "now" steps are scheduled.
    pub lookahead_ms: f64,
    /// Swing amount: even steps stretch by (1+s), odd shrink by (1-s).
    pub swing: f64,
    /// Duck floor and linear recovery time after each kick.
    pub duck_dip: f64,
    pub duck_release_ms: f64,
    /// Energy hysteresis for starting/stopping the sequencer.
    pub groove_start_energy: f64,
    pub groove_stop_energy: f64,
    /// Tempo clamp range.
    pub tempo_min_bpm: f64,
    pub tempo_max_bpm: f64,
    /// Per-tick 95/5 smoothing toward the tempo target.
    pub tempo_smoothing: f64,
    /// Scheduling underruns are clamped to now + this, never dropped.
    pub schedule_epsilon_ms: f64,

    // ── Void subsystem ─────────────────────────────────────────────────
    /// Motion below this counts as stillness.
    pub void_motion_threshold: f64,
    /// Stillness must persist this long before SETTLING is entered.
    pub void_settle_ms: f64,
    /// Depth growth per second of continued stillness.
    pub void_depth_rate: f64,
    /// Depth drain per second once motion returns; the layer exits only
    /// when the drain reaches zero.
    pub void_drain_rate: f64,
    /// Depth phase boundaries: SETTLING→DEEP and DEEP→TRANSCENDENT.
    pub void_deep_depth: f64,
    pub void_transcendent_depth: f64,
    /// Overtone voice hysteresis: added above the first, removed below the
    /// second. The 0.1 gap prevents voice churn at the boundary.
    pub void_overtone_on: f64,
    pub void_overtone_off: f64,
    /// Breath oscillator advance per tick, in radians.
    pub breath_rate: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            motion_smoothing: 0.8,
            motion_window: 150,
            min_samples_to_classify: 20,
            still_avg_max: 0.3,
            gentle_avg_max: 0.8,
            gentle_mad_max: 0.5,
            rhythmic_mad_max: 1.5,
            vigorous_avg_min: 1.5,
            vigorous_mad_max: 3.0,
            chaotic_mad_min: 3.0,
            energy_motion_floor: 0.5,
            energy_motion_rate: 0.003,

            tension_smoothing: 0.05,
            tension_surprise_weight: 0.8,
            tension_harmonic_weight: 0.2,
            root_smoothing: 0.02,
            root_semitone_cap: 6.0,
            base_root_hz: 110.0,
            tempo_interval_min_ms: 200.0,
            tempo_interval_max_ms: 2000.0,
            tempo_cv_max: 0.3,
            tempo_decay: 0.95,

            energy_decay: 0.995,
            touch_energy_boost: 0.04,
            gesture_energy_boost: 0.08,
            awakening_dwell_ms: 15_000.0,
            discovery_dwell_ms: 30_000.0,
            flow_dwell_ms: 60_000.0,
            peak_dwell_ms: 45_000.0,
            discovery_entry_energy: 0.2,
            flow_entry_energy: 0.4,
            peak_entry_energy: 0.6,
            fade_peak_floor: 0.7,
            fade_energy_ceiling: 0.15,

            prediction_confidence_floor: 0.6,
            high_tension: 0.4,
            call_window_ms: 3000.0,

            lookahead_ms: 100.0,
            swing: 0.12,
            duck_dip: 0.15,
            duck_release_ms: 180.0,
            groove_start_energy: 0.4,
            groove_stop_energy: 0.25,
            tempo_min_bpm: 60.0,
            tempo_max_bpm: 140.0,
            tempo_smoothing: 0.95,
            schedule_epsilon_ms: 1.0,

            void_motion_threshold: 0.1,
            void_settle_ms: 3000.0,
            void_depth_rate: 0.08,
            void_drain_rate: 0.4,
            void_deep_depth: 0.5,
            void_transcendent_depth: 0.8,
            void_overtone_on: 0.9,
            void_overtone_off: 0.8,
            breath_rate: 0.02,
        }
    }
}
