//! Hand landmarks and the gesture classifier.
//!
//! A [`GestureSample`] is one detected hand in one camera frame, expressed as
//! the 21 standard hand-landmark joints in normalised image coordinates
//! (x right, y **down**, both 0.0–1.0).  [`classify`] reduces it to one of
//! four [`GestureLabel`]s.  Nothing in here keeps state.

use std::fmt;

/// Default vertical thumb/wrist separation that counts as "pointing".
pub const DEFAULT_THRESHOLD: f32 = 0.05;

// ════════════════════════════════════════════════════════════════════════════
// Point / Joint
// ════════════════════════════════════════════════════════════════════════════

/// A joint position.  `z` is depth relative to the wrist and is ignored by
/// the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Point { x, y, z: 0.0 }
    }
}

/// The 21 hand-landmark indices, in tracker order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Joint {
    Wrist = 0,
    ThumbCmc, ThumbMcp, ThumbIp, ThumbTip,
    IndexMcp, IndexPip, IndexDip, IndexTip,
    MiddleMcp, MiddlePip, MiddleDip, MiddleTip,
    RingMcp, RingPip, RingDip, RingTip,
    PinkyMcp, PinkyPip, PinkyDip, PinkyTip,
}

impl Joint {
    pub const COUNT: usize = 21;

    /// (tip, second joint) for the four non-thumb fingers.
    pub const FINGERS: [(Joint, Joint); 4] = [
        (Joint::IndexTip,  Joint::IndexPip),
        (Joint::MiddleTip, Joint::MiddlePip),
        (Joint::RingTip,   Joint::RingPip),
        (Joint::PinkyTip,  Joint::PinkyPip),
    ];
}

// ════════════════════════════════════════════════════════════════════════════
// GestureSample
// ════════════════════════════════════════════════════════════════════════════

/// One hand, one frame.  Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct GestureSample {
    points: [Point; Joint::COUNT],
}

impl GestureSample {
    pub fn new(points: [Point; Joint::COUNT]) -> Self {
        GestureSample { points }
    }

    /// Build from a tracker's landmark list.  Returns `None` when the list
    /// is too short to contain every joint; extra points are ignored.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let points: [Point; Joint::COUNT] = points.get(..Joint::COUNT)?.try_into().ok()?;
        Some(GestureSample { points })
    }

    pub fn joint(&self, joint: Joint) -> Point {
        self.points[joint as usize]
    }

    /// Copy with one joint moved.  Handy for building synthetic poses.
    pub fn with_joint(mut self, joint: Joint, p: Point) -> Self {
        self.points[joint as usize] = p;
        self
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GestureLabel
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GestureLabel {
    /// Open hand: all four fingers extended.
    Start,
    /// Thumb well above the wrist.
    Up,
    /// Thumb well below the wrist.
    Down,
    Neutral,
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GestureLabel::Start   => "Start",
            GestureLabel::Up      => "Up",
            GestureLabel::Down    => "Down",
            GestureLabel::Neutral => "Neutral",
        };
        f.write_str(s)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// classify
// ════════════════════════════════════════════════════════════════════════════

/// Map one sample to a label.  First match wins:
///
/// 1. `Start`: every fingertip is above (smaller y than) its own PIP joint.
/// 2. `Up`   : `thumb_tip.y - wrist.y < -threshold`.
/// 3. `Down` : `thumb_tip.y - wrist.y >  threshold`.
/// 4. `Neutral`.
pub fn classify(sample: &GestureSample, threshold: f32) -> GestureLabel {
    let all_extended = Joint::FINGERS
        .iter()
        .all(|&(tip, pip)| sample.joint(tip).y < sample.joint(pip).y);
    if all_extended {
        return GestureLabel::Start;
    }

    let thumb_to_wrist = sample.joint(Joint::ThumbTip).y - sample.joint(Joint::Wrist).y;
    if thumb_to_wrist < -threshold {
        GestureLabel::Up
    } else if thumb_to_wrist > threshold {
        GestureLabel::Down
    } else {
        GestureLabel::Neutral
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
