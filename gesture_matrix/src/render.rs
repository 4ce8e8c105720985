//! The render loop: background frame + scrolling text → display, at a fixed
//! cadence.
//!
//! Per tick:
//!
//! 1. push the current brightness to the display;
//! 2. if the scene waits (not yet armed, or paused), pump the display, sleep
//!    one polling interval and re-check;
//! 3. copy background frame `frame_index` into the canvas;
//! 4. draw the overlay text at `text_offset`;
//! 5. scroll the text one pixel left, wrapping to the canvas width once it
//!    has fully left the panel;
//! 6. advance `frame_index` modulo the sequence length;
//! 7. swap the canvas onto the display;
//! 8. sleep whatever is left of the tick budget.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::control::ControlState;
use crate::display::{Display, FrameBuffer};
use crate::error::SceneError;
use crate::font;
use crate::frames::FrameSequence;
use crate::signal::StopSignal;

// ════════════════════════════════════════════════════════════════════════════
// OverlayText
// ════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_CLOCK_FORMAT: &str = "%H:%M:%S";

fn default_clock_format() -> String {
    DEFAULT_CLOCK_FORMAT.to_string()
}

/// What the scrolling overlay says.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayText {
    /// Fixed label, e.g. a song title.
    Static { text: String },
    /// Local wall-clock time, re-sampled on every tick.
    Clock {
        #[serde(default = "default_clock_format")]
        format: String,
    },
}

impl OverlayText {
    pub fn clock() -> Self {
        OverlayText::Clock { format: default_clock_format() }
    }

    /// The text to draw right now.
    pub fn sample(&self) -> Cow<'_, str> {
        match self {
            OverlayText::Static { text } => Cow::Borrowed(text),
            OverlayText::Clock { format } => {
                Cow::Owned(chrono::Local::now().format(format).to_string())
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// RenderCursor
// ════════════════════════════════════════════════════════════════════════════

/// Animation position, owned by the render loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderCursor {
    pub frame_index: usize,
    /// Left edge of the overlay text, in canvas pixels.
    pub text_offset: i32,
}

impl RenderCursor {
    /// Text starts just off the right edge.
    pub fn new(canvas_width: usize) -> Self {
        RenderCursor { frame_index: 0, text_offset: canvas_width as i32 }
    }

    /// Advance one tick.
    pub fn advance(&mut self, text_width: i32, canvas_width: usize, frame_count: usize) {
        self.text_offset -= 1;
        if self.text_offset + text_width < 0 {
            self.text_offset = canvas_width as i32;
        }
        self.frame_index = (self.frame_index + 1) % frame_count.max(1);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// RenderConfig / RenderOutcome
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub tick:              Duration,
    pub wait_poll:         Duration,
    /// Hold the display until the user arms the scene.
    pub wait_until_active: bool,
    /// Hold the display while paused.
    pub wait_when_paused:  bool,
    pub overlay:           OverlayText,
    pub text_color:        u32,
    pub text_y:            i32,
    pub font_scale:        usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            tick:              Duration::from_millis(50),
            wait_poll:         Duration::from_millis(100),
            wait_until_active: false,
            wait_when_paused:  false,
            overlay:           OverlayText::clock(),
            text_color:        0xFFFFFFFF,
            text_y:            10,
            font_scale:        2,
        }
    }
}

/// What the render loop reports when it returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOutcome {
    pub cursor:         RenderCursor,
    /// Ticks that composited and swapped a frame.
    pub frames_shown:   u64,
    /// Ticks spent waiting.
    pub waits:          u64,
    /// Ticks whose frame was dropped.
    pub failures:       u64,
    /// The display went away (window closed) rather than a stop request.
    pub display_closed: bool,
}

// ════════════════════════════════════════════════════════════════════════════
// FrameRenderer
// ════════════════════════════════════════════════════════════════════════════

pub struct FrameRenderer {
    config:   RenderConfig,
    frames:   Arc<FrameSequence>,
    controls: Arc<ControlState>,
    stop:     StopSignal,
    cursor:   RenderCursor,
}

impl FrameRenderer {
    pub fn new(
        config: RenderConfig,
        frames: Arc<FrameSequence>,
        controls: Arc<ControlState>,
        stop: StopSignal,
    ) -> Self {
        let cursor = RenderCursor::new(frames.width());
        FrameRenderer { config, frames, controls, stop, cursor }
    }

    pub fn cursor(&self) -> RenderCursor { self.cursor }

    fn should_wait(&self) -> bool {
        (self.config.wait_until_active && !self.controls.is_active())
            || (self.config.wait_when_paused && self.controls.is_paused())
    }

    /// Run until the stop signal is set or the display closes.
    pub fn run<D: Display + ?Sized>(mut self, display: &mut D) -> RenderOutcome {
        info!(frames = self.frames.len(), tick_ms = self.config.tick.as_millis() as u64, "render loop started");

        let mut outcome = RenderOutcome {
            cursor:         self.cursor,
            frames_shown:   0,
            waits:          0,
            failures:       0,
            display_closed: false,
        };
        let mut canvas = display.create_frame_buffer();

        while !self.stop.is_stopped() {
            if !display.is_open() {
                info!("display closed, requesting stop");
                outcome.display_closed = true;
                self.stop.request_stop();
                break;
            }

            let tick_start = Instant::now();
            display.set_brightness(self.controls.brightness());

            if self.should_wait() {
                outcome.waits += 1;
                display.idle();
                self.stop.sleep(self.config.wait_poll);
                continue;
            }

            match self.render_tick(display, canvas) {
                Ok(next) => {
                    outcome.frames_shown += 1;
                    canvas = next;
                }
                Err((e, next)) => {
                    warn!(frame = self.cursor.frame_index, "dropped frame: {}", e);
                    outcome.failures += 1;
                    canvas = next.unwrap_or_else(|| display.create_frame_buffer());
                }
            }

            if let Some(rest) = self.config.tick.checked_sub(tick_start.elapsed()) {
                self.stop.sleep(rest);
            }
        }

        outcome.cursor = self.cursor;
        info!(
            frames_shown = outcome.frames_shown,
            failures = outcome.failures,
            "render loop exited"
        );
        outcome
    }

    /// Composite, advance, swap.  On failure hands back the canvas if it
    /// survived, so the next tick can reuse it.
    fn render_tick<D: Display + ?Sized>(
        &mut self,
        display: &mut D,
        mut canvas: FrameBuffer,
    ) -> Result<FrameBuffer, (SceneError, Option<FrameBuffer>)> {
        let text = self.config.overlay.sample();
        let composed = canvas.set_image(self.frames.get(self.cursor.frame_index)).map(|()| {
            font::draw_text(
                &mut canvas,
                self.cursor.text_offset,
                self.config.text_y,
                self.config.text_color,
                &text,
                self.config.font_scale,
            )
        });

        let text_width = match &composed {
            Ok(w) => *w,
            Err(_) => font::text_width(&text, self.config.font_scale),
        };
        self.cursor.advance(text_width, self.frames.width(), self.frames.len());

        if let Err(e) = composed {
            return Err((e, Some(canvas)));
        }
        debug!(offset = self.cursor.text_offset, frame = self.cursor.frame_index, "swap");
        display.swap(canvas).map_err(|e| (e, None))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Frame;

    /// Display that records swaps and stops the scene after `stop_after`.
    struct Recorder {
        width:       usize,
        height:      usize,
        swaps:       u64,
        idles:       u64,
        brightness:  Vec<u8>,
        first_rows:  Vec<u32>,
        stop_after:  u64,
        stop:        StopSignal,
        fail_on:     Option<u64>,
    }

    impl Recorder {
        fn new(stop: &StopSignal, stop_after: u64) -> Self {
            Recorder {
                width: 8, height: 8, swaps: 0, idles: 0,
                brightness: Vec::new(), first_rows: Vec::new(),
                stop_after, stop: stop.clone(), fail_on: None,
            }
        }
    }

    impl Display for Recorder {
        fn width(&self) -> usize { self.width }
        fn height(&self) -> usize { self.height }
        fn set_brightness(&mut self, b: u8) { self.brightness.push(b); }
        fn swap(&mut self, frame: FrameBuffer) -> Result<FrameBuffer, SceneError> {
            self.swaps += 1;
            if self.swaps >= self.stop_after { self.stop.request_stop(); }
            if self.fail_on == Some(self.swaps) {
                return Err(SceneError::RenderFailure("vsync lost".into()));
            }
            self.first_rows.push(frame.pixels()[0]);
            Ok(frame)
        }
        fn idle(&mut self) {
            self.idles += 1;
            if self.idles >= self.stop_after { self.stop.request_stop(); }
        }
        fn clear(&mut self) {}
    }

    fn three_frames() -> Arc<FrameSequence> {
        let frames = (0..3).map(|i| Frame::solid(8, 8, 0xFF000000 | i)).collect();
        Arc::new(FrameSequence::new(frames).unwrap())
    }

    fn fast_config() -> RenderConfig {
        RenderConfig {
            tick: Duration::from_millis(1),
            wait_poll: Duration::from_millis(1),
            overlay: OverlayText::Static { text: "HI".into() },
            text_y: 100, // keep text off the sampled pixel
            ..Default::default()
        }
    }

    #[test]
    fn ten_ticks_over_three_frames() {
        let stop = StopSignal::new();
        let controls = Arc::new(ControlState::new(50, 0.5));
        let r = FrameRenderer::new(fast_config(), three_frames(), controls, stop.clone());
        let mut d = Recorder::new(&stop, 10);

        let out = r.run(&mut d);

        assert_eq!(d.swaps, 10);
        assert_eq!(out.frames_shown, 10);
        assert_eq!(out.cursor.frame_index, 10 % 3);
        // Background frames loop 0,1,2,0,…
        let expected: Vec<u32> = (0..10).map(|i| 0xFF000000 | (i % 3)).collect();
        assert_eq!(d.first_rows, expected);
    }

    #[test]
    fn brightness_is_pushed_every_tick() {
        let stop = StopSignal::new();
        let controls = Arc::new(ControlState::new(30, 0.5));
        let r = FrameRenderer::new(fast_config(), three_frames(), controls, stop.clone());
        let mut d = Recorder::new(&stop, 4);
        r.run(&mut d);
        assert_eq!(d.brightness, vec![30; 4]);
    }

    #[test]
    fn cursor_wraps_once_text_leaves_the_canvas() {
        let mut c = RenderCursor::new(64);
        let width = 32;
        let mut wrapped = false;
        for _ in 0..200 {
            c.advance(width, 64, 5);
            assert!(c.text_offset + width >= 0);
            if c.text_offset == 64 { wrapped = true; }
        }
        assert!(wrapped);
    }

    #[test]
    fn scroll_cycle_is_periodic() {
        let mut c = RenderCursor::new(64);
        let width = 10;
        // From 64 down to -10 is 74 steps; the 75th wraps.
        for _ in 0..74 { c.advance(width, 64, 1); }
        assert_eq!(c.text_offset, -10);
        c.advance(width, 64, 1);
        assert_eq!(c.text_offset, 64);
    }

    #[test]
    fn waits_until_armed() {
        let stop = StopSignal::new();
        let controls = Arc::new(ControlState::new(50, 0.5));
        let cfg = RenderConfig { wait_until_active: true, ..fast_config() };
        let r = FrameRenderer::new(cfg, three_frames(), controls, stop.clone());
        let mut d = Recorder::new(&stop, 3);
        let out = r.run(&mut d);
        assert_eq!(d.swaps, 0);
        assert_eq!(out.waits, 3);
        assert_eq!(out.cursor, RenderCursor::new(8));
    }

    #[test]
    fn renders_once_armed() {
        let stop = StopSignal::new();
        let controls = Arc::new(ControlState::new(50, 0.5));
        controls.activate();
        let cfg = RenderConfig { wait_until_active: true, ..fast_config() };
        let r = FrameRenderer::new(cfg, three_frames(), controls, stop.clone());
        let mut d = Recorder::new(&stop, 2);
        r.run(&mut d);
        assert_eq!(d.swaps, 2);
    }

    #[test]
    fn paused_scene_holds_the_display() {
        let stop = StopSignal::new();
        let controls = Arc::new(ControlState::new(50, 0.5));
        controls.toggle_pause();
        let cfg = RenderConfig { wait_when_paused: true, ..fast_config() };
        let r = FrameRenderer::new(cfg, three_frames(), controls, stop.clone());
        let mut d = Recorder::new(&stop, 2);
        let out = r.run(&mut d);
        assert_eq!(d.swaps, 0);
        assert_eq!(out.waits, 2);
    }

    #[test]
    fn swap_failure_skips_the_tick_and_continues() {
        let stop = StopSignal::new();
        let controls = Arc::new(ControlState::new(50, 0.5));
        let r = FrameRenderer::new(fast_config(), three_frames(), controls, stop.clone());
        let mut d = Recorder::new(&stop, 5);
        d.fail_on = Some(2);
        let out = r.run(&mut d);
        assert_eq!(d.swaps, 5);
        assert_eq!(out.failures, 1);
        assert_eq!(out.frames_shown, 4);
    }

    #[test]
    fn mismatched_frame_is_a_dropped_tick() {
        let stop = StopSignal::new();
        let controls = Arc::new(ControlState::new(50, 0.5));
        let frames = Arc::new(FrameSequence::new(vec![Frame::solid(4, 4, 0)]).unwrap());
        let r = FrameRenderer::new(fast_config(), frames, controls, stop.clone());
        let mut d = Recorder::new(&stop, 1);
        let stopper = stop.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            stopper.request_stop();
        });
        let out = r.run(&mut d);
        t.join().unwrap();
        assert_eq!(d.swaps, 0);
        assert!(out.failures >= 1);
    }

    #[test]
    fn clock_overlay_samples_current_time() {
        let text = OverlayText::clock().sample().into_owned();
        assert_eq!(text.len(), 8);
        assert_eq!(text.as_bytes()[2], b':');
    }

    #[test]
    fn overlay_deserialises_from_toml() {
        #[derive(Deserialize)]
        struct W { overlay: OverlayText }
        let w: W = toml::from_str("[overlay]\nkind = \"static\"\ntext = \"song\"\n").unwrap();
        assert_eq!(w.overlay, OverlayText::Static { text: "song".into() });
        let w: W = toml::from_str("[overlay]\nkind = \"clock\"\n").unwrap();
        assert_eq!(w.overlay, OverlayText::clock());
    }
}
