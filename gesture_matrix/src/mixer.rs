//! Audio sink that volume and pause changes are pushed to.
//!
//! The music scene adjusts playback volume and pauses/resumes playback from
//! both the gesture loop and the console.  The sink lives inside
//! [`ControlState`](crate::control::ControlState)'s lock so every push is
//! ordered with the value it reflects.

use tracing::{info, warn};

/// Anything that accepts volume / pause changes.
pub trait Mixer: Send {
    /// `volume` is already clamped to 0.0–1.0.
    fn set_volume(&mut self, volume: f32);
    fn pause(&mut self);
    fn resume(&mut self);
}

// ── null backend (no audio, or used by scenes without playback) ──────────

pub struct NullMixer;

impl Mixer for NullMixer {
    fn set_volume(&mut self, _volume: f32) {}
    fn pause(&mut self) {}
    fn resume(&mut self) {}
}

// ── midir backend ─────────────────────────────────────────────────────────

const CC_CHANNEL_VOLUME: u8 = 7;
const CC_ALL_SOUND_OFF:  u8 = 120;

/// Raw MIDI output; a seam so the mixer can be driven without a port.
pub trait MidiSink: Send {
    fn send(&mut self, message: &[u8]) -> Result<(), String>;
}

impl MidiSink for midir::MidiOutputConnection {
    fn send(&mut self, message: &[u8]) -> Result<(), String> {
        midir::MidiOutputConnection::send(self, message).map_err(|e| e.to_string())
    }
}

/// Drives channel volume (CC 7) on a MIDI output.  Pausing silences the
/// channel; volume changes while paused are only remembered, and resuming
/// restores the last volume.
pub struct MidiMixer<S: MidiSink = midir::MidiOutputConnection> {
    sink:    S,
    channel: u8,
    volume:  f32,
    paused:  bool,
}

impl<S: MidiSink> MidiMixer<S> {
    pub fn new(sink: S, channel: u8) -> Self {
        MidiMixer { sink, channel, volume: 0.0, paused: false }
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        let status = 0xB0 | (self.channel & 0x0F);
        if let Err(e) = self.sink.send(&[status, controller, value]) {
            warn!(controller, "MIDI send failed: {}", e);
        }
    }
}

/// Map 0.0–1.0 to a 7-bit controller value.
pub fn volume_to_cc(volume: f32) -> u8 {
    (volume.clamp(0.0, 1.0) * 127.0).round() as u8
}

impl<S: MidiSink> Mixer for MidiMixer<S> {
    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if !self.paused {
            self.control_change(CC_CHANNEL_VOLUME, volume_to_cc(volume));
        }
    }
    fn pause(&mut self) {
        self.paused = true;
        self.control_change(CC_ALL_SOUND_OFF, 0);
        self.control_change(CC_CHANNEL_VOLUME, 0);
    }
    fn resume(&mut self) {
        self.paused = false;
        let v = self.volume;
        self.control_change(CC_CHANNEL_VOLUME, volume_to_cc(v));
    }
}

/// Try to open the first available MIDI output port, preferring a softsynth.
/// Falls back to [`NullMixer`] with a warning if none is found.
pub fn open_mixer(channel: u8) -> Box<dyn Mixer> {
    let midi_out = match midir::MidiOutput::new("gesture_matrix_mixer") {
        Ok(m) => m,
        Err(e) => {
            warn!("MIDI init error: {}; volume changes will not be audible", e);
            return Box::new(NullMixer);
        }
    };

    let ports = midi_out.ports();
    if ports.is_empty() {
        warn!("no MIDI output ports found; volume changes will not be audible");
        return Box::new(NullMixer);
    }

    let port_idx = ports
        .iter()
        .position(|p| {
            midi_out
                .port_name(p)
                .map(|n| {
                    let n = n.to_lowercase();
                    n.contains("fluid") || n.contains("timidity") || n.contains("synth")
                })
                .unwrap_or(false)
        })
        .unwrap_or(0);

    let port = &ports[port_idx];
    let name = midi_out.port_name(port).unwrap_or_else(|_| "Unknown".to_string());
    info!(port = %name, "opening MIDI mixer");

    match midi_out.connect(port, "gesture-matrix-volume") {
        Ok(conn) => Box::new(MidiMixer::new(conn, channel)),
        Err(e) => {
            warn!("failed to connect MIDI port: {}; using null mixer", e);
            Box::new(NullMixer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_maps_to_full_cc_range() {
        assert_eq!(volume_to_cc(0.0), 0);
        assert_eq!(volume_to_cc(1.0), 127);
        assert_eq!(volume_to_cc(0.5), 64);
    }

    struct Wire(Vec<[u8; 3]>);

    impl MidiSink for Wire {
        fn send(&mut self, m: &[u8]) -> Result<(), String> {
            self.0.push([m[0], m[1], m[2]]);
            Ok(())
        }
    }

    #[test]
    fn volume_changes_while_paused_stay_silent_until_resume() {
        let mut m = MidiMixer::new(Wire(Vec::new()), 2);
        m.set_volume(0.5);
        m.pause();
        m.set_volume(0.8);
        m.set_volume(0.9);
        assert_eq!(m.sink.0, vec![[0xB2, 7, 64], [0xB2, 120, 0], [0xB2, 7, 0]]);

        m.resume();
        assert_eq!(m.sink.0.last(), Some(&[0xB2, 7, 114]));
        m.set_volume(0.0);
        assert_eq!(m.sink.0.last(), Some(&[0xB2, 7, 0]));
        assert_eq!(m.sink.0.len(), 5);
    }

    #[test]
    fn out_of_range_volume_is_clamped() {
        assert_eq!(volume_to_cc(-3.0), 0);
        assert_eq!(volume_to_cc(7.0), 127);
    }
}
