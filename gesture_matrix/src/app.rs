//! Scene wiring: background assets, devices, mixer and Ctrl-C.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{BackgroundSource, SceneConfig};
use crate::console::spawn_console;
use crate::control::ControlState;
use crate::display::{rgb, WindowDisplay};
use crate::error::SceneError;
use crate::frames::{self, FrameSequence};
use crate::mixer::{open_mixer, Mixer, NullMixer};
use crate::scene::{RunningScene, Scene, SceneReport};
use crate::signal::StopSignal;
use crate::state_machine::ControlMode;
use crate::tracker::SimPose;

// ════════════════════════════════════════════════════════════════════════════
// Startup pieces
// ════════════════════════════════════════════════════════════════════════════

/// Decode and fit the configured background, once, before any loop starts.
pub fn load_frames(config: &SceneConfig) -> Result<FrameSequence, SceneError> {
    let (w, h) = (config.panel.width, config.panel.height);
    match &config.background {
        BackgroundSource::Placeholder { frames } => Ok(FrameSequence::placeholder(w, h, *frames)),
        BackgroundSource::Gif { path } => frames::load_gif(path, w, h),
        BackgroundSource::Still { path, shrink, background } => {
            let [r, g, b] = *background;
            frames::load_still(path, w, h, *shrink, rgb(r, g, b))
        }
    }
}

/// Scenes that drive audio get a MIDI mixer; the rest a null sink.
pub fn mixer_for(config: &SceneConfig) -> Box<dyn Mixer> {
    let audio = config.control.mode == ControlMode::Volume
        || config.control.start_toggles_pause
        || config.control.console;
    if audio {
        open_mixer(config.control.midi_channel)
    } else {
        Box::new(NullMixer)
    }
}

fn install_ctrlc(stop: StopSignal) {
    // Only one handler per process; a second scene keeps the first one.
    if let Err(e) = ctrlc::set_handler(move || stop.request_stop()) {
        warn!("Ctrl-C handler not installed: {}", e);
    }
}

fn display_opener(
    config: &SceneConfig,
    sim_tx: Option<std::sync::mpsc::Sender<SimPose>>,
) -> impl FnOnce() -> Result<WindowDisplay, SceneError> + Send + 'static {
    let title = format!("gesture_matrix: {}", config.name);
    let (w, h, scale) = (config.panel.width, config.panel.height, config.panel.window_scale);
    move || WindowDisplay::open(&title, w, h, scale, sim_tx)
}

#[cfg(not(feature = "leap"))]
fn start(scene: Scene, config: &SceneConfig) -> Result<RunningScene, SceneError> {
    use crate::tracker::sim_channel;

    let (sim_tx, tracker) = sim_channel(config.sensing_poll());
    info!("simulation mode: hold Space/O, Up, Down or F in the panel window");
    scene.start(display_opener(config, Some(sim_tx)), move || Ok(tracker))
}

#[cfg(feature = "leap")]
fn start(scene: Scene, config: &SceneConfig) -> Result<RunningScene, SceneError> {
    use crate::tracker::LeapHandTracker;

    info!("hardware mode: LeapMotion");
    scene.start(display_opener(config, None), LeapHandTracker::open)
}

// ════════════════════════════════════════════════════════════════════════════
// run()
// ════════════════════════════════════════════════════════════════════════════

/// Run one scene until Ctrl-C, `q` on the console, or the window closes.
pub fn run(config: SceneConfig) -> Result<SceneReport, SceneError> {
    config.validate()?;

    let frames = Arc::new(load_frames(&config)?);
    info!(scene = %config.name, frames = frames.len(), "background ready");

    let controls = Arc::new(ControlState::with_mixer(
        config.control.initial_brightness,
        config.control.initial_volume,
        mixer_for(&config),
    ));

    let scene = Scene::new(config.clone(), frames, controls);
    install_ctrlc(scene.stop_signal());

    let running = start(scene, &config)?;

    if config.control.console {
        if let Err(e) = spawn_console(running.controls(), running.stop_signal()) {
            warn!("console unavailable: {}", e);
        }
    }

    let report = running.wait()?;
    for e in &report.timed_out {
        warn!("{}", e);
    }
    if let Some(s) = &report.sensing {
        info!(actions = s.actions, frames = s.frames_polled, end = ?s.end, "sensing summary");
    }
    if let Some(r) = &report.render {
        info!(frames = r.frames_shown, failures = r.failures, "render summary");
    }
    Ok(report)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
