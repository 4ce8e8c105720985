//! Gesture state machine: arming, debouncing, and label → action mapping.
//!
//! ```text
//!   Unarmed ──Start──▶ Armed          (one-shot, emits Action::Arm)
//!
//!   Armed:  Up    → Increase{Brightness,Volume}   (debounced)
//!           Down  → Decrease{Brightness,Volume}   (debounced)
//!           Start → TogglePause                   (toggle scenes only,
//!                                                  own debounce window)
//!           Neutral → nothing
//! ```
//!
//! The machine is owned by the sensing loop and never shared.  Time is passed
//! in explicitly so sequences can be replayed in tests.

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::gesture::GestureLabel;

// ════════════════════════════════════════════════════════════════════════════
// Action / ControlMode
// ════════════════════════════════════════════════════════════════════════════

/// What Up/Down adjust in the active scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Brightness,
    Volume,
}

/// A control action emitted by the state machine (or the console).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    /// The user showed the Start pose for the first time.
    Arm,
    IncreaseBrightness { step: u8 },
    DecreaseBrightness { step: u8 },
    IncreaseVolume { step: f32 },
    DecreaseVolume { step: f32 },
    TogglePause,
}

// ════════════════════════════════════════════════════════════════════════════
// MachineConfig
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub mode:            ControlMode,
    pub brightness_step: u8,
    pub volume_step:     f32,
    /// Minimum spacing between repeated identical Up/Down actions.
    pub debounce:        Duration,
    /// Whether Start, once armed, toggles pause.
    pub start_toggles_pause: bool,
    /// Minimum spacing between toggles (also measured from arming).
    pub toggle_debounce: Duration,
    /// How long the sensing loop rests after a toggle so the hand can leave
    /// the Start pose.
    pub toggle_cooldown: Duration,
    /// Skip the arming gesture.
    pub start_armed:     bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            mode:                ControlMode::Brightness,
            brightness_step:     10,
            volume_step:         0.01,
            debounce:            Duration::from_millis(300),
            start_toggles_pause: false,
            toggle_debounce:     Duration::from_secs(3),
            toggle_cooldown:     Duration::from_secs(3),
            start_armed:         false,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GestureState / GestureStateMachine
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureState {
    /// Never reverts to false once set.
    pub armed:          bool,
    /// Label of the last emitted Arm or Up/Down action.
    pub last_label:     GestureLabel,
    pub last_action_at: Option<Instant>,
    pub last_toggle_at: Option<Instant>,
}

pub struct GestureStateMachine {
    config: MachineConfig,
    state:  GestureState,
}

impl GestureStateMachine {
    pub fn new(config: MachineConfig) -> Self {
        let state = GestureState {
            armed:          config.start_armed,
            last_label:     GestureLabel::Neutral,
            last_action_at: None,
            last_toggle_at: None,
        };
        GestureStateMachine { config, state }
    }

    pub fn is_armed(&self) -> bool { self.state.armed }
    pub fn state(&self) -> &GestureState { &self.state }
    pub fn config(&self) -> &MachineConfig { &self.config }

    /// Feed one label observed at `now`; returns the action to apply, if any.
    pub fn observe(&mut self, label: GestureLabel, now: Instant) -> Option<Action> {
        if !self.state.armed {
            if label == GestureLabel::Start {
                self.state.armed = true;
                self.state.last_label = label;
                self.state.last_toggle_at = Some(now);
                return Some(Action::Arm);
            }
            return None;
        }

        match label {
            GestureLabel::Up | GestureLabel::Down => {
                let changed = self.state.last_label != label;
                if !changed && !elapsed(self.state.last_action_at, now, self.config.debounce) {
                    return None;
                }
                self.state.last_label = label;
                self.state.last_action_at = Some(now);
                Some(self.adjustment(label == GestureLabel::Up))
            }
            GestureLabel::Start if self.config.start_toggles_pause => {
                if !elapsed(self.state.last_toggle_at, now, self.config.toggle_debounce) {
                    return None;
                }
                self.state.last_toggle_at = Some(now);
                Some(Action::TogglePause)
            }
            _ => None,
        }
    }

    /// Rest period the sensing loop must observe after applying `action`.
    pub fn cooldown_after(&self, action: &Action) -> Option<Duration> {
        match action {
            Action::TogglePause if !self.config.toggle_cooldown.is_zero() => {
                Some(self.config.toggle_cooldown)
            }
            _ => None,
        }
    }

    fn adjustment(&self, up: bool) -> Action {
        let c = &self.config;
        match (c.mode, up) {
            (ControlMode::Brightness, true)  => Action::IncreaseBrightness { step: c.brightness_step },
            (ControlMode::Brightness, false) => Action::DecreaseBrightness { step: c.brightness_step },
            (ControlMode::Volume, true)      => Action::IncreaseVolume { step: c.volume_step },
            (ControlMode::Volume, false)     => Action::DecreaseVolume { step: c.volume_step },
        }
    }
}

fn elapsed(since: Option<Instant>, now: Instant, window: Duration) -> bool {
    since.map_or(true, |t| now.saturating_duration_since(t) >= window)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
