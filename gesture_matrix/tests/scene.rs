//! End-to-end scene runs with scripted trackers and recording panels.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use gesture_matrix::config::{main_scene, BackgroundSource, SceneConfig};
use gesture_matrix::control::ControlState;
use gesture_matrix::display::{Display, FrameBuffer};
use gesture_matrix::error::SceneError;
use gesture_matrix::frames::FrameSequence;
use gesture_matrix::gesture::GestureSample;
use gesture_matrix::render::OverlayText;
use gesture_matrix::scene::Scene;
use gesture_matrix::sensing::SensingEnd;
use gesture_matrix::signal::StopSignal;
use gesture_matrix::tracker::{pose_sample, HandTracker, SimPose};

// ════════════════════════════════════════════════════════════════════════════
// Fixtures
// ════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Log {
    swaps:           usize,
    clears:          usize,
    releases:        usize,
    brightness:      Vec<u8>,
    events:          Vec<&'static str>,
    swaps_at_failure: Option<usize>,
}

type SharedLog = Arc<Mutex<Log>>;

struct Panel {
    size:       usize,
    log:        SharedLog,
    stop_after: Option<(usize, StopSignal)>,
}

impl Display for Panel {
    fn width(&self) -> usize { self.size }
    fn height(&self) -> usize { self.size }

    fn set_brightness(&mut self, b: u8) {
        self.log.lock().unwrap().brightness.push(b);
    }

    fn swap(&mut self, frame: FrameBuffer) -> Result<FrameBuffer, SceneError> {
        let mut log = self.log.lock().unwrap();
        log.swaps += 1;
        log.events.push("swap");
        if let Some((n, stop)) = &self.stop_after {
            if log.swaps >= *n {
                stop.request_stop();
            }
        }
        Ok(frame)
    }

    fn clear(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.clears += 1;
        log.events.push("clear");
    }
}

enum Script {
    /// Play the poses, then fail.
    Poses(VecDeque<Option<SimPose>>),
    /// Never see a hand.
    Empty,
    /// Block in every poll for this long, ignoring stop.
    Stuck(Duration),
    Panic,
}

struct Tracker {
    script: Script,
    log:    SharedLog,
}

impl HandTracker for Tracker {
    fn poll(&mut self) -> Result<Option<GestureSample>, SceneError> {
        match &mut self.script {
            Script::Poses(q) => match q.pop_front() {
                Some(p) => Ok(p.map(pose_sample)),
                None => {
                    let mut log = self.log.lock().unwrap();
                    log.swaps_at_failure = Some(log.swaps);
                    Err(SceneError::FrameReadFailure("no frame".into()))
                }
            },
            Script::Empty => Ok(None),
            Script::Stuck(d) => {
                thread::sleep(*d);
                Ok(None)
            }
            Script::Panic => panic!("tracker driver crashed"),
        }
    }

    fn release(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.releases += 1;
        log.events.push("release");
    }
}

fn test_config() -> SceneConfig {
    let mut c = main_scene();
    c.panel.width = 8;
    c.panel.height = 8;
    c.background = BackgroundSource::Placeholder { frames: 3 };
    c.overlay.text = OverlayText::Static { text: "HI".into() };
    c.timing.tick_ms = 1;
    c.timing.wait_poll_ms = 1;
    c.timing.sensing_poll_ms = 1;
    c.timing.join_timeout_ms = 2000;
    c
}

fn scene(config: SceneConfig) -> Scene {
    let frames = Arc::new(FrameSequence::placeholder(8, 8, 3));
    Scene::new(config, frames, Arc::new(ControlState::new(50, 0.5)))
}

fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + timeout;
    while Instant::now() < until {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn ten_ticks_then_stop_releases_each_device_once() {
    let log = SharedLog::default();
    let s = scene(test_config());
    let stop = s.stop_signal();

    let (l1, l2) = (log.clone(), log.clone());
    let running = s
        .start(
            move || Ok(Panel { size: 8, log: l1, stop_after: Some((10, stop)) }),
            move || Ok(Tracker { script: Script::Empty, log: l2 }),
        )
        .unwrap();
    let report = running.wait().unwrap();

    let render = report.render.as_ref().expect("render outcome");
    assert_eq!(render.frames_shown, 10);
    assert_eq!(render.cursor.frame_index, 10 % 3);
    assert_eq!(report.sensing.as_ref().expect("sensing outcome").end, SensingEnd::Stopped);
    assert!(report.clean());

    let log = log.lock().unwrap();
    assert_eq!(log.swaps, 10);
    assert_eq!(log.clears, 1);
    assert_eq!(log.releases, 1);
    // Teardown only after the last frame.
    let tail: Vec<_> = log.events.iter().rev().take(2).copied().collect();
    assert!(tail.contains(&"clear") && tail.contains(&"release"));
}

#[test]
fn sensing_failure_does_not_stop_rendering() {
    let log = SharedLog::default();
    let s = scene(test_config());
    let controls = s.controls();

    let (l1, l2) = (log.clone(), log.clone());
    let script = VecDeque::from([Some(SimPose::Fist), Some(SimPose::OpenHand), Some(SimPose::ThumbUp)]);
    let running = s
        .start(
            move || Ok(Panel { size: 8, log: l1, stop_after: None }),
            move || Ok(Tracker { script: Script::Poses(script), log: l2 }),
        )
        .unwrap();

    // The render loop keeps swapping well after the tracker failed.
    let kept_rendering = eventually(Duration::from_secs(5), || {
        let log = log.lock().unwrap();
        matches!(log.swaps_at_failure, Some(n) if log.swaps > n + 5)
    });
    assert!(kept_rendering);
    assert!(!running.stop_signal().is_stopped());

    running.request_stop();
    let report = running.wait().unwrap();

    let sensing = report.sensing.expect("sensing outcome");
    assert!(matches!(sensing.end, SensingEnd::ReadFailure(_)));
    assert_eq!(sensing.frames_polled, 4);
    assert_eq!(sensing.actions, 2);
    assert!(sensing.armed);

    assert_eq!(controls.brightness(), 60);
    let log = log.lock().unwrap();
    assert_eq!(log.brightness.last(), Some(&60));
    assert_eq!(log.clears, 1);
    assert_eq!(log.releases, 1);
}

#[test]
fn display_open_failure_aborts_startup_and_releases_tracker() {
    let log = SharedLog::default();
    let l2 = log.clone();
    let err = scene(test_config())
        .start(
            || -> Result<Panel, SceneError> { Err(SceneError::DeviceUnavailable("no panel".into())) },
            move || Ok(Tracker { script: Script::Empty, log: l2 }),
        )
        .err()
        .expect("startup must fail");

    assert!(matches!(err, SceneError::DeviceUnavailable(_)));
    let log = log.lock().unwrap();
    assert_eq!(log.swaps, 0);
    assert_eq!(log.releases, 1);
}

#[test]
fn tracker_open_failure_aborts_startup_and_clears_display() {
    let log = SharedLog::default();
    let l1 = log.clone();
    let err = scene(test_config())
        .start(
            move || Ok(Panel { size: 8, log: l1, stop_after: None }),
            || -> Result<Tracker, SceneError> { Err(SceneError::DeviceUnavailable("no camera".into())) },
        )
        .err()
        .expect("startup must fail");

    assert!(err.is_fatal());
    let log = log.lock().unwrap();
    assert_eq!(log.swaps, 0);
    assert_eq!(log.clears, 1);
}

#[test]
fn panel_size_must_match_frames() {
    let log = SharedLog::default();
    let (l1, l2) = (log.clone(), log.clone());
    let err = scene(test_config())
        .start(
            move || Ok(Panel { size: 16, log: l1, stop_after: None }),
            move || Ok(Tracker { script: Script::Empty, log: l2 }),
        )
        .err()
        .expect("startup must fail");
    assert!(matches!(err, SceneError::Configuration(_)));
    assert_eq!(log.lock().unwrap().releases, 1);
}

#[test]
fn stuck_tracker_is_detached_after_join_timeout() {
    let mut cfg = test_config();
    cfg.timing.join_timeout_ms = 100;
    let log = SharedLog::default();
    let s = scene(cfg);
    let stop = s.stop_signal();

    let (l1, l2) = (log.clone(), log.clone());
    let running = s
        .start(
            move || Ok(Panel { size: 8, log: l1, stop_after: Some((3, stop)) }),
            move || Ok(Tracker { script: Script::Stuck(Duration::from_secs(3)), log: l2 }),
        )
        .unwrap();

    let started = Instant::now();
    let report = running.wait().unwrap();
    assert!(started.elapsed() < Duration::from_millis(2500));

    assert!(report.render.is_some());
    assert!(report.sensing.is_none());
    assert!(matches!(
        report.timed_out.as_slice(),
        [SceneError::ShutdownTimeout { loop_name: "sensing", timeout_ms: 100 }]
    ));
    assert_eq!(log.lock().unwrap().clears, 1);
}

#[test]
fn external_stop_ends_an_idle_scene() {
    let log = SharedLog::default();
    let (l1, l2) = (log.clone(), log.clone());
    let running = scene(test_config())
        .start(
            move || Ok(Panel { size: 8, log: l1, stop_after: None }),
            move || Ok(Tracker { script: Script::Empty, log: l2 }),
        )
        .unwrap();

    let stop = running.stop_signal();
    let h = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        stop.request_stop();
    });
    let report = running.wait().unwrap();
    h.join().unwrap();

    assert!(report.clean());
    assert!(report.render.expect("render outcome").frames_shown > 0);
    let log = log.lock().unwrap();
    assert_eq!((log.clears, log.releases), (1, 1));
}

#[test]
fn panicking_tracker_is_reported_without_waiting_for_timeout() {
    let mut cfg = test_config();
    cfg.timing.join_timeout_ms = 5000;
    let log = SharedLog::default();
    let s = scene(cfg);
    let stop = s.stop_signal();

    let (l1, l2) = (log.clone(), log.clone());
    let running = s
        .start(
            move || Ok(Panel { size: 8, log: l1, stop_after: Some((5, stop)) }),
            move || Ok(Tracker { script: Script::Panic, log: l2 }),
        )
        .unwrap();

    let started = Instant::now();
    let err = running.wait().unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(err, SceneError::FrameReadFailure(_)));

    let log = log.lock().unwrap();
    assert_eq!((log.clears, log.releases), (1, 1));
    // The crashed tracker is only released once rendering has finished.
    let last_swap = log.events.iter().rposition(|e| *e == "swap").expect("some frames");
    let release = log.events.iter().position(|e| *e == "release").expect("released");
    assert!(release > last_swap);
}

#[test]
fn invalid_config_opens_no_device() {
    let mut cfg = test_config();
    cfg.overlay.text = OverlayText::Clock { format: "%Q".into() };
    let log = SharedLog::default();
    let (l1, l2) = (log.clone(), log.clone());
    let opened = Arc::new(Mutex::new(0));
    let (o1, o2) = (opened.clone(), opened.clone());

    let err = scene(cfg)
        .start(
            move || {
                *o1.lock().unwrap() += 1;
                Ok(Panel { size: 8, log: l1, stop_after: None })
            },
            move || {
                *o2.lock().unwrap() += 1;
                Ok(Tracker { script: Script::Empty, log: l2 })
            },
        )
        .err()
        .expect("startup must fail");

    assert!(matches!(err, SceneError::Configuration(_)));
    assert_eq!(*opened.lock().unwrap(), 0);
    let log = log.lock().unwrap();
    assert_eq!((log.swaps, log.clears, log.releases), (0, 0, 0));
}

#[test]
fn music_scene_waits_for_the_start_pose() {
    let mut cfg = test_config();
    cfg.timing.wait_until_active = true;
    let log = SharedLog::default();
    let (l1, l2) = (log.clone(), log.clone());
    let running = scene(cfg)
        .start(
            move || Ok(Panel { size: 8, log: l1, stop_after: None }),
            move || Ok(Tracker { script: Script::Empty, log: l2 }),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(log.lock().unwrap().swaps, 0);

    running.controls().activate();
    assert!(eventually(Duration::from_secs(5), || log.lock().unwrap().swaps > 0));

    running.request_stop();
    let report = running.wait().unwrap();
    assert!(report.render.expect("render outcome").waits > 0);
}
