//! Display-driver seam and the `minifb` panel emulator.
//!
//! The render loop talks to a [`Display`]: it asks for a frame buffer,
//! composites into it and hands it back through [`Display::swap`], which is
//! where a real panel waits for vsync.  [`WindowDisplay`] emulates a small
//! LED matrix in a scaled-up window and doubles as the keyboard source for
//! the hand-pose simulator.

use std::sync::mpsc::Sender;

use minifb::{Key, Scale, Window, WindowOptions};
use tracing::{debug, info};

use crate::control::MAX_BRIGHTNESS;
use crate::error::SceneError;
use crate::frames::Frame;
use crate::tracker::SimPose;

pub const BLACK: u32 = 0xFF000000;

/// Pack an opaque colour.
pub const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    0xFF000000 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

// ════════════════════════════════════════════════════════════════════════════
// FrameBuffer
// ════════════════════════════════════════════════════════════════════════════

/// An off-screen canvas the size of the panel.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuffer {
    width:  usize,
    height: usize,
    pixels: Vec<u32>,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        FrameBuffer { width, height, pixels: vec![BLACK; width * height] }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }
    pub fn pixels(&self) -> &[u32] { &self.pixels }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    /// Off-canvas coordinates are ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x < 0 || y < 0 { return; }
        let (x, y) = (x as usize, y as usize);
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    pub fn fill(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    pub fn clear(&mut self) {
        self.fill(BLACK);
    }

    /// Copy a background frame in.  Sizes must match.
    pub fn set_image(&mut self, frame: &Frame) -> Result<(), SceneError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(SceneError::RenderFailure(format!(
                "frame is {}x{}, canvas is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        self.pixels.copy_from_slice(&frame.pixels);
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Display trait
// ════════════════════════════════════════════════════════════════════════════

/// The display-driver collaborator.  Owned by the render loop only.
pub trait Display {
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    /// 0–100.
    fn set_brightness(&mut self, brightness: u8);

    fn create_frame_buffer(&mut self) -> FrameBuffer {
        FrameBuffer::new(self.width(), self.height())
    }

    /// Present `frame` and return a buffer to draw the next frame into.
    /// May block until the panel's refresh.
    fn swap(&mut self, frame: FrameBuffer) -> Result<FrameBuffer, SceneError>;

    /// Called instead of `swap` while the render loop is waiting.
    fn idle(&mut self) {}

    /// False once the device is gone or the user asked to close it.
    fn is_open(&self) -> bool { true }

    /// Blank the panel.  Called once at teardown.
    fn clear(&mut self);
}

/// Scale every channel by `brightness`/100.
pub fn dim(color: u32, brightness: u8) -> u32 {
    let b = u32::from(brightness.min(MAX_BRIGHTNESS));
    let ch = |shift: u32| (((color >> shift) & 0xFF) * b / 100) << shift;
    0xFF000000 | ch(16) | ch(8) | ch(0)
}

// ════════════════════════════════════════════════════════════════════════════
// WindowDisplay: minifb panel emulator
// ════════════════════════════════════════════════════════════════════════════

/// Emulates the LED panel in a window.
///
/// Held keys are forwarded to the simulator tracker as hand poses:
///
/// | Key | Pose |
/// |---|---|
/// | `Space` / `O` | open hand (Start) |
/// | `Up` | thumb up |
/// | `Down` | thumb down |
/// | `F` | fist (Neutral) |
/// | `Q` / `Escape` | close |
pub struct WindowDisplay {
    window:     Window,
    width:      usize,
    height:     usize,
    brightness: u8,
    front:      FrameBuffer,
    presented:  Vec<u32>,
    sim_tx:     Option<Sender<SimPose>>,
    quit:       bool,
}

impl WindowDisplay {
    pub fn open(
        title: &str,
        width: usize,
        height: usize,
        scale: usize,
        sim_tx: Option<Sender<SimPose>>,
    ) -> Result<Self, SceneError> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                scale: window_scale(scale),
                ..WindowOptions::default()
            },
        )
        .map_err(|e| SceneError::DeviceUnavailable(format!("display window: {}", e)))?;

        info!(width, height, scale, "panel emulator opened");
        Ok(WindowDisplay {
            window,
            width,
            height,
            brightness: MAX_BRIGHTNESS,
            front:      FrameBuffer::new(width, height),
            presented:  vec![BLACK; width * height],
            sim_tx,
            quit:       false,
        })
    }

    fn poll_input(&mut self) {
        if self.window.is_key_down(Key::Q) || self.window.is_key_down(Key::Escape) {
            debug!("close requested from keyboard");
            self.quit = true;
            return;
        }

        let Some(tx) = &self.sim_tx else { return };
        let pose = if self.window.is_key_down(Key::Space) || self.window.is_key_down(Key::O) {
            Some(SimPose::OpenHand)
        } else if self.window.is_key_down(Key::Up) {
            Some(SimPose::ThumbUp)
        } else if self.window.is_key_down(Key::Down) {
            Some(SimPose::ThumbDown)
        } else if self.window.is_key_down(Key::F) {
            Some(SimPose::Fist)
        } else {
            None
        };
        if let Some(pose) = pose {
            if tx.send(pose).is_err() {
                // Sensing loop is gone; stop forwarding.
                self.sim_tx = None;
            }
        }
    }
}

fn window_scale(scale: usize) -> Scale {
    match scale {
        0 | 1 => Scale::X1,
        2 | 3 => Scale::X2,
        4..=7 => Scale::X4,
        8..=15 => Scale::X8,
        16..=31 => Scale::X16,
        _ => Scale::X32,
    }
}

impl Display for WindowDisplay {
    fn width(&self) -> usize { self.width }
    fn height(&self) -> usize { self.height }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(MAX_BRIGHTNESS);
    }

    fn swap(&mut self, frame: FrameBuffer) -> Result<FrameBuffer, SceneError> {
        for (out, &px) in self.presented.iter_mut().zip(frame.pixels()) {
            *out = dim(px, self.brightness);
        }
        self.window
            .update_with_buffer(&self.presented, self.width, self.height)
            .map_err(|e| SceneError::RenderFailure(format!("window update: {}", e)))?;
        self.poll_input();
        Ok(std::mem::replace(&mut self.front, frame))
    }

    fn idle(&mut self) {
        self.window.update();
        self.poll_input();
    }

    fn is_open(&self) -> bool {
        !self.quit && self.window.is_open()
    }

    fn clear(&mut self) {
        self.presented.fill(BLACK);
        if self.window.is_open() {
            // Best effort; the window may already be closing.
            let _ = self.window.update_with_buffer(&self.presented, self.width, self.height);
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_packs_opaque() {
        assert_eq!(rgb(0x12, 0x34, 0x56), 0xFF123456);
    }

    #[test]
    fn set_pixel_clips() {
        let mut fb = FrameBuffer::new(4, 4);
        fb.set_pixel(-1, 0, 1);
        fb.set_pixel(4, 0, 1);
        fb.set_pixel(0, 4, 1);
        assert!(fb.pixels().iter().all(|&p| p == BLACK));
        fb.set_pixel(3, 3, 7);
        assert_eq!(fb.pixel(3, 3), Some(7));
    }

    #[test]
    fn set_image_rejects_wrong_size() {
        let mut fb = FrameBuffer::new(4, 4);
        let err = fb.set_image(&Frame::solid(4, 3, 0)).unwrap_err();
        assert!(matches!(err, SceneError::RenderFailure(_)));
        fb.set_image(&Frame::solid(4, 4, 9)).unwrap();
        assert_eq!(fb.pixel(2, 2), Some(9));
    }

    #[test]
    fn dim_scales_channels() {
        assert_eq!(dim(rgb(200, 100, 50), 100), rgb(200, 100, 50));
        assert_eq!(dim(rgb(200, 100, 50), 50), rgb(100, 50, 25));
        assert_eq!(dim(rgb(200, 100, 50), 0), BLACK);
    }

    #[test]
    fn window_scale_rounds_down_to_supported_factor() {
        assert!(matches!(window_scale(1), Scale::X1));
        assert!(matches!(window_scale(10), Scale::X8));
        assert!(matches!(window_scale(100), Scale::X32));
    }
}
