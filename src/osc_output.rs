use crate::synth::{ParamTarget, SynthCommand, VoiceKind};
use crate::types::{Snapshot, INSTRUMENT_NAMES};
use crossbeam_channel::{Receiver, select};
use log::{debug, error, info};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::UdpSocket;

/// Sends synth commands and telemetry to an external renderer as OSC over
/// UDP. Fire-and-forget: a missing receiver just means silence.
pub struct OscOutput {
    cmd_rx: Receiver<SynthCommand>,
    snap_rx: Receiver<Snapshot>,
    target: String,
}

impl OscOutput {
    pub fn new(cmd_rx: Receiver<SynthCommand>, snap_rx: Receiver<Snapshot>, target: String) -> Self {
        Self {
            cmd_rx,
            snap_rx,
            target,
        }
    }

    /// Run the OSC sender loop. Blocks the calling thread; exits when both
    /// input channels close.
    pub fn run(&self) {
        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to bind UDP socket: {}", e);
                return;
            }
        };
        info!("OSC output → {}", self.target);

        loop {
            select! {
                recv(self.cmd_rx) -> msg => match msg {
                    Ok(cmd) => {
                        if let Err(e) = self.send_command(&socket, &cmd) {
                            debug!("OSC send error: {}", e);
                        }
                    }
                    Err(_) => break,
                },
                recv(self.snap_rx) -> msg => match msg {
                    Ok(snap) => {
                        if let Err(e) = self.send_snapshot(&socket, &snap) {
                            debug!("OSC send error: {}", e);
                        }
                    }
                    Err(_) => break,
                },
            }
        }

        // One side closed; flush whatever the other still holds.
        for cmd in self.cmd_rx.try_iter() {
            let _ = self.send_command(&socket, &cmd);
        }
        for snap in self.snap_rx.try_iter() {
            let _ = self.send_snapshot(&socket, &snap);
        }
        info!("OSC output shutting down");
    }

    fn send_command(
        &self,
        socket: &UdpSocket,
        cmd: &SynthCommand,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match cmd {
            SynthCommand::Trigger {
                instrument,
                velocity,
                at_ms,
            } => {
                let name = INSTRUMENT_NAMES.get(*instrument).unwrap_or(&"perc");
                self.send(
                    socket,
                    &format!("/conductor/trigger/{}", name),
                    vec![OscType::Float(*velocity as f32), OscType::Double(*at_ms)],
                )?;
            }
            SynthCommand::Duck {
                dip,
                release_ms,
                at_ms,
            } => {
                self.send(
                    socket,
                    "/conductor/duck",
                    vec![
                        OscType::Float(*dip as f32),
                        OscType::Float(*release_ms as f32),
                        OscType::Double(*at_ms),
                    ],
                )?;
            }
            SynthCommand::Ramp {
                target,
                value,
                duration_ms,
                at_ms,
            } => {
                let name = match target {
                    ParamTarget::AmbientGain => "ambient_gain",
                    ParamTarget::FilterCutoff => "filter_cutoff",
                    ParamTarget::ReverbAmount => "reverb",
                    ParamTarget::VoiceFrequency => "freq",
                };
                self.send(
                    socket,
                    &format!("/conductor/ramp/{}", name),
                    vec![
                        OscType::Float(*value as f32),
                        OscType::Float(*duration_ms as f32),
                        OscType::Double(*at_ms),
                    ],
                )?;
            }
            SynthCommand::StartVoice {
                kind,
                id,
                freq_hz,
                at_ms,
            } => {
                let name = match kind {
                    VoiceKind::VoidDrone => "void_drone",
                    VoiceKind::VoidOvertone => "void_overtone",
                    VoiceKind::GrooveTexture => "groove_texture",
                };
                self.send(
                    socket,
                    &format!("/conductor/voice/{}/start", name),
                    vec![
                        OscType::Int(*id as i32),
                        OscType::Float(*freq_hz as f32),
                        OscType::Double(*at_ms),
                    ],
                )?;
            }
            SynthCommand::StopVoice { id, at_ms } => {
                self.send(
                    socket,
                    "/conductor/voice/stop",
                    vec![OscType::Int(*id as i32), OscType::Double(*at_ms)],
                )?;
            }
            SynthCommand::Play { recipe, at_ms } => {
                // The renderer owns the recipe details; serialize whole.
                let body = serde_json::to_string(recipe)?;
                self.send(
                    socket,
                    "/conductor/play",
                    vec![OscType::String(body), OscType::Double(*at_ms)],
                )?;
            }
        }
        Ok(())
    }

    fn send_snapshot(
        &self,
        socket: &UdpSocket,
        snap: &Snapshot,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.send(
            socket,
            "/conductor/state/energy",
            vec![OscType::Float(snap.energy as f32)],
        )?;
        self.send(
            socket,
            "/conductor/state/tension",
            vec![OscType::Float(snap.tension as f32)],
        )?;
        self.send(
            socket,
            "/conductor/state/pattern",
            vec![OscType::String(snap.pattern.to_string())],
        )?;
        self.send(
            socket,
            "/conductor/state/void_depth",
            vec![OscType::Float(snap.void_depth as f32)],
        )?;
        self.send(
            socket,
            "/conductor/state/tempo",
            vec![OscType::Float(snap.tempo_bpm as f32)],
        )?;
        Ok(())
    }

    fn send(
        &self,
        socket: &UdpSocket,
        addr: &str,
        args: Vec<OscType>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let msg = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let buf = rosc::encoder::encode(&msg)?;
        socket.send_to(&buf, &self.target)?;
        Ok(())
    }
}
