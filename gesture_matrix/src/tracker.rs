//! Hand-tracking collaborators: keyboard simulation and LeapMotion hardware.
//!
//! The public interface is [`HandTracker`].  The sensing loop doesn't need to
//! know whether samples came from real hardware or the keyboard simulator.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tracing::debug;

use crate::error::SceneError;
use crate::gesture::{GestureSample, Joint, Point};

// ════════════════════════════════════════════════════════════════════════════
// HandTracker trait
// ════════════════════════════════════════════════════════════════════════════

/// Yields zero or one hand per polled frame.
///
/// `Ok(None)` means no hand was detected, which is not an error.  An `Err`
/// means the device failed and the sensing loop should end.
pub trait HandTracker {
    fn poll(&mut self) -> Result<Option<GestureSample>, SceneError>;

    /// Release the capture device.  Called exactly once, at teardown.
    fn release(&mut self) {}
}

// ════════════════════════════════════════════════════════════════════════════
// Synthetic poses
// ════════════════════════════════════════════════════════════════════════════

/// Hand poses the simulator can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimPose {
    OpenHand,
    ThumbUp,
    ThumbDown,
    Fist,
}

/// A plausible landmark set for `pose`, in normalised image coordinates.
pub fn pose_sample(pose: SimPose) -> GestureSample {
    let mut s = GestureSample::new([Point::new(0.5, 0.55); Joint::COUNT])
        .with_joint(Joint::Wrist, Point::new(0.5, 0.7));

    // Curled fingers: tips tucked below their PIP joints.
    for (i, (tip, pip)) in Joint::FINGERS.into_iter().enumerate() {
        let x = 0.42 + 0.05 * i as f32;
        s = s.with_joint(pip, Point::new(x, 0.45)).with_joint(tip, Point::new(x, 0.52));
    }
    let thumb = |y| Point::new(0.35, y);

    match pose {
        SimPose::OpenHand => {
            for (i, (tip, pip)) in Joint::FINGERS.into_iter().enumerate() {
                let x = 0.40 + 0.06 * i as f32;
                s = s.with_joint(pip, Point::new(x, 0.40)).with_joint(tip, Point::new(x, 0.22));
            }
            s.with_joint(Joint::ThumbTip, thumb(0.55))
        }
        SimPose::ThumbUp   => s.with_joint(Joint::ThumbTip, thumb(0.40)),
        SimPose::ThumbDown => s.with_joint(Joint::ThumbTip, thumb(0.92)),
        SimPose::Fist      => s.with_joint(Joint::ThumbTip, thumb(0.70)),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SimHandTracker: keyboard simulation (always available)
// ════════════════════════════════════════════════════════════════════════════

/// Tracker fed by [`SimPose`]s from the panel emulator's window.
///
/// Each poll waits up to one frame interval for a pose; nothing arriving
/// means no hand is in view.  When the window side hangs up the tracker
/// reports a frame read failure, like an unplugged camera.
pub struct SimHandTracker {
    rx:    Receiver<SimPose>,
    frame: Duration,
}

impl SimHandTracker {
    pub fn new(rx: Receiver<SimPose>, frame: Duration) -> Self {
        SimHandTracker { rx, frame }
    }
}

/// A connected (window sender, tracker) pair.
pub fn sim_channel(frame: Duration) -> (Sender<SimPose>, SimHandTracker) {
    let (tx, rx) = mpsc::channel();
    (tx, SimHandTracker::new(rx, frame))
}

impl HandTracker for SimHandTracker {
    fn poll(&mut self) -> Result<Option<GestureSample>, SceneError> {
        match self.rx.recv_timeout(self.frame) {
            Ok(mut pose) => {
                // Only the freshest pose matters.
                while let Ok(p) = self.rx.try_recv() { pose = p; }
                Ok(Some(pose_sample(pose)))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SceneError::FrameReadFailure(
                "simulator window disconnected".to_string(),
            )),
        }
    }

    fn release(&mut self) {
        debug!("simulated tracker released");
    }
}

// ════════════════════════════════════════════════════════════════════════════
// LeapHandTracker: real hardware (feature = "leap")
// ════════════════════════════════════════════════════════════════════════════

/// Tracker backed by a LeapMotion controller.
///
/// Requires the `leap` feature flag and the LeapC shared library installed.
/// Leap coordinates (millimetres, y up) are mapped into the normalised image
/// space the classifier expects (0–1, y down) over a 400 mm cube above the
/// device.
#[cfg(feature = "leap")]
pub struct LeapHandTracker {
    connection: leaprs::Connection,
}

#[cfg(feature = "leap")]
impl LeapHandTracker {
    const RANGE_MM: f32 = 400.0;
    const POLL_MS: u32 = 100;

    pub fn open() -> Result<Self, SceneError> {
        use leaprs::*;
        let mut connection = Connection::create(ConnectionConfig::default())
            .map_err(|e| SceneError::DeviceUnavailable(format!("LeapC connection: {:?}", e)))?;
        connection
            .open()
            .map_err(|e| SceneError::DeviceUnavailable(format!("LeapMotion device: {:?}", e)))?;
        Ok(LeapHandTracker { connection })
    }

    fn normalise(x: f32, y: f32, z: f32) -> Point {
        Point {
            x: (x + Self::RANGE_MM / 2.0) / Self::RANGE_MM,
            y: 1.0 - y / Self::RANGE_MM,
            z: z / Self::RANGE_MM,
        }
    }
}

#[cfg(feature = "leap")]
impl HandTracker for LeapHandTracker {
    fn poll(&mut self) -> Result<Option<GestureSample>, SceneError> {
        use leaprs::*;

        // Poll timeouts just mean no new frame.
        let msg = match self.connection.poll(Self::POLL_MS) {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };
        let Event::Tracking(frame) = msg.event() else { return Ok(None) };
        let Some(hand) = frame.hands().into_iter().next() else { return Ok(None) };

        let mut points = Vec::with_capacity(Joint::COUNT);
        let w = hand.arm().next_joint();
        points.push(Self::normalise(w.x, w.y, w.z));
        // Thumb first, then index → pinky: base, second, third joint, tip.
        for digit in hand.digits() {
            for j in [
                digit.proximal().prev_joint(),
                digit.intermediate().prev_joint(),
                digit.distal().prev_joint(),
                digit.distal().next_joint(),
            ] {
                points.push(Self::normalise(j.x, j.y, j.z));
            }
        }
        Ok(GestureSample::from_points(&points))
    }

    fn release(&mut self) {
        debug!("LeapMotion tracker released");
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
