//! The sensing loop: tracker → classifier → state machine → ControlState.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::control::ControlState;
use crate::gesture::{classify, DEFAULT_THRESHOLD};
use crate::signal::StopSignal;
use crate::state_machine::GestureStateMachine;
use crate::tracker::HandTracker;

#[derive(Clone, Debug)]
pub struct SensingConfig {
    pub threshold:     f32,
    /// Minimum spacing between polls when the tracker returns early.
    pub poll_interval: Duration,
}

impl Default for SensingConfig {
    fn default() -> Self {
        SensingConfig { threshold: DEFAULT_THRESHOLD, poll_interval: Duration::from_millis(100) }
    }
}

/// Why the sensing loop returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SensingEnd {
    Stopped,
    /// The tracker failed to deliver a frame.  Rendering carries on.
    ReadFailure(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensingOutcome {
    pub end:           SensingEnd,
    /// Polls attempted, including the failing one.
    pub frames_polled: u64,
    pub actions:       u64,
    pub armed:         bool,
}

/// Run until the stop signal is set or the tracker fails.
///
/// Tracker errors end the loop and are reported in the outcome, never
/// propagated.  The tracker stays with the caller, who releases it.
pub fn run_sensing<T: HandTracker + ?Sized>(
    tracker: &mut T,
    machine: &mut GestureStateMachine,
    controls: &ControlState,
    stop: &StopSignal,
    config: &SensingConfig,
) -> SensingOutcome {
    info!(armed = machine.is_armed(), "sensing loop started");

    let mut frames_polled = 0u64;
    let mut actions = 0u64;
    let mut end = SensingEnd::Stopped;

    while !stop.is_stopped() {
        let polled_at = Instant::now();
        frames_polled += 1;

        let sample = match tracker.poll() {
            Ok(s) => s,
            Err(e) => {
                warn!(frame = frames_polled, "sensing loop ending: {}", e);
                end = SensingEnd::ReadFailure(e.to_string());
                break;
            }
        };

        if let Some(sample) = sample {
            let label = classify(&sample, config.threshold);
            debug!(%label, "classified");

            if let Some(action) = machine.observe(label, Instant::now()) {
                let now = controls.apply(action);
                actions += 1;
                info!(
                    %label,
                    ?action,
                    brightness = now.brightness,
                    volume = now.volume,
                    paused = now.paused,
                    "gesture applied"
                );
                if let Some(cooldown) = machine.cooldown_after(&action) {
                    debug!(ms = cooldown.as_millis() as u64, "cooling down");
                    stop.sleep(cooldown);
                    continue;
                }
            }
        }

        if let Some(rest) = config.poll_interval.checked_sub(polled_at.elapsed()) {
            stop.sleep(rest);
        }
    }

    info!(frames = frames_polled, actions, "sensing loop exited");
    SensingOutcome { end, frames_polled, actions, armed: machine.is_armed() }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
