//! Shared control state: brightness, volume, pause and the arming latch.
//!
//! Writers (sensing loop, console loop) take the mutex for the whole
//! read-clamp-write sequence, and push volume/pause to the [`Mixer`] while
//! still holding it.  The render loop reads `brightness` and `paused` from
//! lock-free mirrors that are only ever stored under the same mutex.
//!
//! `active` is a one-shot latch (set by arming, never cleared).  `paused` is
//! a resettable flag.  They are deliberately separate primitives.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::mixer::{Mixer, NullMixer};
use crate::state_machine::Action;

pub const MAX_BRIGHTNESS: u8 = 100;

/// A consistent copy of the control values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Controls {
    pub brightness: u8,
    pub volume:     f32,
    pub paused:     bool,
    pub active:     bool,
}

struct Guarded {
    brightness: u8,
    volume:     f32,
    paused:     bool,
    mixer:      Box<dyn Mixer>,
}

pub struct ControlState {
    guarded: Mutex<Guarded>,
    brightness_mirror: AtomicU8,
    paused_mirror:     AtomicBool,
    active:            AtomicBool,
}

impl ControlState {
    /// Initial values are clamped into range.
    pub fn new(brightness: u8, volume: f32) -> Self {
        Self::with_mixer(brightness, volume, Box::new(NullMixer))
    }

    pub fn with_mixer(brightness: u8, volume: f32, mut mixer: Box<dyn Mixer>) -> Self {
        let brightness = brightness.min(MAX_BRIGHTNESS);
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        mixer.set_volume(volume);
        ControlState {
            guarded: Mutex::new(Guarded { brightness, volume, paused: false, mixer }),
            brightness_mirror: AtomicU8::new(brightness),
            paused_mirror:     AtomicBool::new(false),
            active:            AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Guarded> {
        self.guarded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── writers ──────────────────────────────────────────────────────────

    /// Apply one action atomically and return the resulting snapshot.
    pub fn apply(&self, action: Action) -> Controls {
        match action {
            Action::Arm => { self.activate(); }
            Action::IncreaseBrightness { step } => { self.adjust_brightness(i16::from(step)); }
            Action::DecreaseBrightness { step } => { self.adjust_brightness(-i16::from(step)); }
            Action::IncreaseVolume { step }     => { self.adjust_volume(step); }
            Action::DecreaseVolume { step }     => { self.adjust_volume(-step); }
            Action::TogglePause                 => { self.toggle_pause(); }
        }
        self.snapshot()
    }

    /// Add `delta`, clamped to 0–100.  Returns the new brightness.
    pub fn adjust_brightness(&self, delta: i16) -> u8 {
        let mut g = self.lock();
        let next = (i16::from(g.brightness) + delta).clamp(0, i16::from(MAX_BRIGHTNESS)) as u8;
        g.brightness = next;
        self.brightness_mirror.store(next, Ordering::Release);
        debug!(brightness = next, "brightness adjusted");
        next
    }

    /// Add `delta`, clamped to 0.0–1.0.  Non-finite deltas are ignored.
    pub fn adjust_volume(&self, delta: f32) -> f32 {
        let mut g = self.lock();
        if delta.is_finite() {
            let next = (g.volume + delta).clamp(0.0, 1.0);
            g.volume = next;
            g.mixer.set_volume(next);
            debug!(volume = next, "volume adjusted");
        }
        g.volume
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        let mut g = self.lock();
        if volume.is_finite() {
            g.volume = volume.clamp(0.0, 1.0);
            let v = g.volume;
            g.mixer.set_volume(v);
        }
        g.volume
    }

    /// Flip pause and return the new value.
    pub fn toggle_pause(&self) -> bool {
        let mut g = self.lock();
        g.paused = !g.paused;
        if g.paused { g.mixer.pause() } else { g.mixer.resume() }
        self.paused_mirror.store(g.paused, Ordering::Release);
        debug!(paused = g.paused, "pause toggled");
        g.paused
    }

    /// Set the arming latch.  Returns `true` only for the call that set it.
    pub fn activate(&self) -> bool {
        !self.active.swap(true, Ordering::AcqRel)
    }

    // ── readers ──────────────────────────────────────────────────────────

    /// Lock-free; eventually consistent with the last write.
    pub fn brightness(&self) -> u8 {
        self.brightness_mirror.load(Ordering::Acquire)
    }

    /// Lock-free; eventually consistent with the last write.
    pub fn is_paused(&self) -> bool {
        self.paused_mirror.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn snapshot(&self) -> Controls {
        let g = self.lock();
        Controls {
            brightness: g.brightness,
            volume:     g.volume,
            paused:     g.paused,
            active:     self.is_active(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
