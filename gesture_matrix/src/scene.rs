//! Scene lifecycle: run the render and sensing loops side by side and shut
//! them down within a bounded time.
//!
//! ```text
//!            ┌──────────── render thread ────────────┐
//!  start ──▶ │ open display → go? → FrameRenderer::run│──┐ exit notice
//!            └────────────────────────────────────────┘  │
//!            ┌──────────── sensing thread ───────────┐   ├──▶ wait(): collect
//!            │ open tracker → go? → run_sensing       │──┘    notices until
//!            └────────────────────────────────────────┘       join_timeout,
//!                                                              then release
//! ```
//!
//! Each loop opens its own device on its own thread (the display window and
//! the tracker are not `Send`) and holds it after the loop returns until the
//! orchestrator sends the release go-ahead.  That happens once, after both
//! loops have reported exit or the join timeout has passed, so the display
//! is cleared and the tracker released exactly once, after both loops are
//! done, on every path including startup failures.
//!
//! A panic inside a loop is caught on its thread, so the exit notice still
//! goes out and the device is still released at the go-ahead; the panic is
//! then resumed and shows up when the thread is joined.  The render loop's
//! exit notice also requests stop: once the display is gone there is nothing
//! left to show.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::SceneConfig;
use crate::control::ControlState;
use crate::display::Display;
use crate::error::SceneError;
use crate::frames::FrameSequence;
use crate::render::{FrameRenderer, RenderOutcome};
use crate::sensing::{run_sensing, SensingConfig, SensingOutcome};
use crate::signal::StopSignal;
use crate::state_machine::GestureStateMachine;
use crate::tracker::HandTracker;

// ════════════════════════════════════════════════════════════════════════════
// Loop bookkeeping
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopKind {
    Render,
    Sensing,
}

impl LoopKind {
    pub fn name(self) -> &'static str {
        match self {
            LoopKind::Render  => "render",
            LoopKind::Sensing => "sensing",
        }
    }
}

enum LoopOutcome {
    Render(RenderOutcome),
    Sensing(SensingOutcome),
}

/// Reports loop exit when dropped.
struct ExitNotice {
    kind:         LoopKind,
    tx:           Sender<LoopKind>,
    stop_on_exit: Option<StopSignal>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        if let Some(stop) = &self.stop_on_exit {
            stop.request_stop();
        }
        let _ = self.tx.send(self.kind);
    }
}

struct LoopHandle {
    kind:    LoopKind,
    thread:  JoinHandle<Option<LoopOutcome>>,
    ready:   Receiver<Result<(), SceneError>>,
    go:      Option<Sender<()>>,
    release: Option<Sender<()>>,
}

/// Spawn one loop thread: open the device, report readiness, wait for the
/// go signal, run `body`, report exit, wait for the release go-ahead, then
/// `release` the device.  A panic in `body` is carried past the release.
fn spawn_loop<D, O, B, R>(
    kind: LoopKind,
    exits: Sender<LoopKind>,
    stop_on_exit: Option<StopSignal>,
    open: O,
    body: B,
    release: R,
) -> Result<LoopHandle, SceneError>
where
    O: FnOnce() -> Result<D, SceneError> + Send + 'static,
    B: FnOnce(&mut D) -> LoopOutcome + Send + 'static,
    R: FnOnce(&mut D) + Send + 'static,
{
    let (ready_tx, ready) = mpsc::channel();
    let (go, go_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let thread = thread::Builder::new()
        .name(kind.name().to_string())
        .spawn(move || {
            let notice = ExitNotice { kind, tx: exits, stop_on_exit };
            let mut device = match open() {
                Ok(d) => d,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return None;
                }
            };
            let _ = ready_tx.send(Ok(()));

            let outcome = go_rx
                .recv()
                .ok()
                .map(|()| panic::catch_unwind(AssertUnwindSafe(|| body(&mut device))));
            drop(notice);

            // A dropped sender also means go ahead.
            let _ = release_rx.recv();
            release(&mut device);
            debug!(loop_name = kind.name(), "device released");

            match outcome {
                Some(Ok(o)) => Some(o),
                Some(Err(payload)) => panic::resume_unwind(payload),
                None => None,
            }
        })
        .map_err(|e| SceneError::DeviceUnavailable(format!("cannot spawn {} thread: {}", kind.name(), e)))?;

    Ok(LoopHandle { kind, thread, ready, go: Some(go), release: Some(release_tx) })
}

// ════════════════════════════════════════════════════════════════════════════
// SceneReport
// ════════════════════════════════════════════════════════════════════════════

/// How a scene ended.
#[derive(Debug, Default)]
pub struct SceneReport {
    /// `None` if the loop never ran, panicked, or was detached.
    pub render:    Option<RenderOutcome>,
    pub sensing:   Option<SensingOutcome>,
    /// One [`SceneError::ShutdownTimeout`] per loop that was detached.
    pub timed_out: Vec<SceneError>,
    pub panicked:  Vec<LoopKind>,
}

impl SceneReport {
    pub fn clean(&self) -> bool {
        self.timed_out.is_empty() && self.panicked.is_empty()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Scene
// ════════════════════════════════════════════════════════════════════════════

/// A configured scene, not yet running.
pub struct Scene {
    config:   SceneConfig,
    frames:   Arc<FrameSequence>,
    controls: Arc<ControlState>,
    stop:     StopSignal,
}

impl Scene {
    pub fn new(config: SceneConfig, frames: Arc<FrameSequence>, controls: Arc<ControlState>) -> Self {
        Scene { config, frames, controls, stop: StopSignal::new() }
    }

    /// Available before `start` so signal handlers can be installed first.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn controls(&self) -> Arc<ControlState> {
        Arc::clone(&self.controls)
    }

    /// Open both devices on their loop threads and start the loops.
    ///
    /// Fails without opening anything if the config is invalid.  Fails with
    /// the first device error if either device cannot be opened or the
    /// display does not match the frame size; whatever did open is released
    /// before returning.
    pub fn start<D, T, OD, OT>(self, open_display: OD, open_tracker: OT) -> Result<RunningScene, SceneError>
    where
        D: Display + 'static,
        T: HandTracker + 'static,
        OD: FnOnce() -> Result<D, SceneError> + Send + 'static,
        OT: FnOnce() -> Result<T, SceneError> + Send + 'static,
    {
        let Scene { config, frames, controls, stop } = self;
        config.validate()?;
        let (exit_tx, exits) = mpsc::channel();

        let mut running = RunningScene {
            stop:         stop.clone(),
            controls:     Arc::clone(&controls),
            loops:        Vec::with_capacity(2),
            exits,
            join_timeout: config.join_timeout(),
        };

        // ── render ───────────────────────────────────────────────────────
        let (fw, fh) = (frames.width(), frames.height());
        let open_checked = move || {
            let display = open_display()?;
            if (display.width(), display.height()) != (fw, fh) {
                return Err(SceneError::config(format!(
                    "display is {}x{} but frames are {}x{}",
                    display.width(),
                    display.height(),
                    fw,
                    fh
                )));
            }
            Ok(display)
        };
        let renderer = FrameRenderer::new(config.render_config(), frames, Arc::clone(&controls), stop.clone());
        let render = spawn_loop(
            LoopKind::Render,
            exit_tx.clone(),
            Some(stop.clone()),
            open_checked,
            move |display: &mut D| LoopOutcome::Render(renderer.run(display)),
            |display: &mut D| display.clear(),
        )?;
        running.loops.push(render);

        // ── sensing ──────────────────────────────────────────────────────
        let mut machine = GestureStateMachine::new(config.machine_config());
        let sensing_config = SensingConfig {
            threshold:     config.control.threshold,
            poll_interval: config.sensing_poll(),
        };
        let sensing_stop = stop.clone();
        let sensing = spawn_loop(
            LoopKind::Sensing,
            exit_tx,
            None,
            open_tracker,
            move |tracker: &mut T| {
                LoopOutcome::Sensing(run_sensing(tracker, &mut machine, &controls, &sensing_stop, &sensing_config))
            },
            |tracker: &mut T| tracker.release(),
        );
        match sensing {
            Ok(h) => running.loops.push(h),
            Err(e) => {
                running.abort();
                return Err(e);
            }
        }

        // ── handshake ────────────────────────────────────────────────────
        let mut failure = None;
        for l in &running.loops {
            let result = l.ready.recv().unwrap_or_else(|_| {
                Err(SceneError::DeviceUnavailable(format!("{} thread died while opening its device", l.kind.name())))
            });
            if let Err(e) = result {
                error!(loop_name = l.kind.name(), "startup failed: {}", e);
                failure.get_or_insert(e);
            }
        }
        if let Some(e) = failure {
            running.abort();
            return Err(e);
        }

        for l in &mut running.loops {
            if let Some(go) = l.go.take() {
                let _ = go.send(());
            }
        }
        info!(scene = %config.name, "scene running");
        Ok(running)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// RunningScene
// ════════════════════════════════════════════════════════════════════════════

pub struct RunningScene {
    stop:         StopSignal,
    controls:     Arc<ControlState>,
    loops:        Vec<LoopHandle>,
    exits:        Receiver<LoopKind>,
    join_timeout: Duration,
}

impl RunningScene {
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn controls(&self) -> Arc<ControlState> {
        Arc::clone(&self.controls)
    }

    /// Block until stop is requested (by the caller, the console, a signal
    /// handler, or the display closing), then shut down.
    ///
    /// A loop that panicked is reported as an error after teardown.
    pub fn wait(mut self) -> Result<SceneReport, SceneError> {
        self.stop.wait();
        info!("stop requested, shutting down");
        let report = self.shutdown();

        if let Some(kind) = report.panicked.first() {
            let msg = format!("{} loop panicked", kind.name());
            return Err(match kind {
                LoopKind::Render  => SceneError::RenderFailure(msg),
                LoopKind::Sensing => SceneError::FrameReadFailure(msg),
            });
        }
        Ok(report)
    }

    /// Stop without running: cancel the go signal and tear down.
    fn abort(&mut self) {
        self.stop.request_stop();
        for l in &mut self.loops {
            l.go.take();
        }
        self.shutdown();
    }

    fn shutdown(&mut self) -> SceneReport {
        let mut report = SceneReport::default();
        if self.loops.is_empty() {
            return report;
        }

        // 1. Collect exit notices until every loop reported or time is up.
        let deadline = Instant::now() + self.join_timeout;
        let mut exited: Vec<LoopKind> = Vec::with_capacity(self.loops.len());
        while exited.len() < self.loops.len() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.exits.recv_timeout(left) {
                Ok(kind) => exited.push(kind),
                Err(_) => break,
            }
        }

        // 2. Release go-ahead, once, to every loop.
        for l in &mut self.loops {
            if let Some(release) = l.release.take() {
                let _ = release.send(());
            }
        }

        // 3. Join the loops that exited; detach the rest.
        let timeout_ms = self.join_timeout.as_millis() as u64;
        for l in self.loops.drain(..) {
            if !exited.contains(&l.kind) {
                warn!(loop_name = l.kind.name(), timeout_ms, "loop did not exit in time, detaching");
                report.timed_out.push(SceneError::ShutdownTimeout { loop_name: l.kind.name(), timeout_ms });
                continue;
            }
            match l.thread.join() {
                Ok(Some(LoopOutcome::Render(o)))  => report.render = Some(o),
                Ok(Some(LoopOutcome::Sensing(o))) => report.sensing = Some(o),
                Ok(None) => {}
                Err(_) => {
                    error!(loop_name = l.kind.name(), "loop panicked");
                    report.panicked.push(l.kind);
                }
            }
        }

        info!(clean = report.clean(), "scene stopped");
        report
    }
}

impl Drop for RunningScene {
    fn drop(&mut self) {
        if !self.loops.is_empty() {
            self.stop.request_stop();
            self.shutdown();
        }
    }
}
