//! Background frame sequences.
//!
//! Frames are decoded and fitted to the canvas once, before any loop starts,
//! and are read-only afterwards.  The sequence is shared between threads
//! through an `Arc` without further synchronisation.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, RgbaImage};
use tracing::{info, warn};

use crate::display::rgb;
use crate::error::SceneError;

// ════════════════════════════════════════════════════════════════════════════
// Frame / FrameSequence
// ════════════════════════════════════════════════════════════════════════════

/// One canvas-sized background image, packed ARGB.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width:  usize,
    pub height: usize,
    pub pixels: Vec<u32>,
}

impl Frame {
    pub fn solid(width: usize, height: usize, color: u32) -> Self {
        Frame { width, height, pixels: vec![color; width * height] }
    }
}

/// Fixed-length, non-empty, ordered sequence of frames.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    frames: Vec<Frame>,
    width:  usize,
    height: usize,
}

impl FrameSequence {
    /// Every frame must match the first frame's size.
    pub fn new(frames: Vec<Frame>) -> Result<Self, SceneError> {
        let first = frames
            .first()
            .ok_or_else(|| SceneError::config("frame sequence has no frames"))?;
        let (width, height) = (first.width, first.height);
        if let Some(i) = frames.iter().position(|f| f.width != width || f.height != height) {
            return Err(SceneError::config(format!(
                "frame {} is {}x{}, expected {}x{}",
                i, frames[i].width, frames[i].height, width, height
            )));
        }
        Ok(FrameSequence { frames, width, height })
    }

    pub fn len(&self) -> usize { self.frames.len() }
    pub fn is_empty(&self) -> bool { self.frames.is_empty() }
    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }

    /// Frame at `index` modulo the sequence length.
    pub fn get(&self, index: usize) -> &Frame {
        &self.frames[index % self.frames.len()]
    }

    /// Hue-cycling frames, used when no background asset is configured.
    pub fn placeholder(width: usize, height: usize, count: usize) -> Self {
        let count = count.max(1);
        let frames = (0..count)
            .map(|i| {
                let shift = i as f32 / count as f32 * 360.0;
                let mut pixels = Vec::with_capacity(width * height);
                for y in 0..height {
                    for x in 0..width {
                        let diag = (x + y) as f32 / (width + height).max(1) as f32 * 360.0;
                        pixels.push(hsv_to_argb(diag + shift, 0.8, 0.35));
                    }
                }
                Frame { width, height, pixels }
            })
            .collect();
        FrameSequence { frames, width, height }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Loaders
// ════════════════════════════════════════════════════════════════════════════

/// Decode every frame of a GIF, fit each to the canvas keeping its aspect
/// ratio, and centre it on black.  Decoding stops at the first bad frame.
pub fn load_gif(path: &Path, width: usize, height: usize) -> Result<FrameSequence, SceneError> {
    let file = File::open(path)
        .map_err(|e| SceneError::config(format!("cannot open {}: {}", path.display(), e)))?;
    let decoder = GifDecoder::new(BufReader::new(file))
        .map_err(|e| SceneError::config(format!("{} is not a valid GIF: {}", path.display(), e)))?;

    info!(path = %path.display(), "preprocessing GIF frames");
    let mut frames = Vec::new();
    for (i, frame) in decoder.into_frames().enumerate() {
        match frame {
            Ok(f) => frames.push(fit_centered(&f.into_buffer(), width, height, 1.0, rgb(0, 0, 0))),
            Err(e) => {
                warn!(frame = i, "stopping at undecodable GIF frame: {}", e);
                break;
            }
        }
    }
    info!(frames = frames.len(), "preprocessing completed");
    FrameSequence::new(frames)
}

/// Single still image (album art): shrink to `shrink` of the canvas and
/// centre it on `background`.
pub fn load_still(
    path: &Path,
    width: usize,
    height: usize,
    shrink: f32,
    background: u32,
) -> Result<FrameSequence, SceneError> {
    let img = image::open(path)
        .map_err(|e| SceneError::config(format!("cannot open {}: {}", path.display(), e)))?
        .to_rgba8();
    FrameSequence::new(vec![fit_centered(&img, width, height, shrink, background)])
}

/// Largest size that fits in `max_w`×`max_h` with the source aspect ratio,
/// never enlarging the source.
pub fn fit_size(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (0, 0);
    }
    if src_w <= max_w && src_h <= max_h {
        return (src_w, src_h);
    }
    let scale = (max_w as f32 / src_w as f32).min(max_h as f32 / src_h as f32);
    (
        ((src_w as f32 * scale).round() as u32).clamp(1, max_w.max(1)),
        ((src_h as f32 * scale).round() as u32).clamp(1, max_h.max(1)),
    )
}

fn fit_centered(img: &RgbaImage, width: usize, height: usize, shrink: f32, background: u32) -> Frame {
    let max_w = ((width as f32 * shrink) as u32).clamp(1, width.max(1) as u32);
    let max_h = ((height as f32 * shrink) as u32).clamp(1, height.max(1) as u32);
    let (nw, nh) = fit_size(img.width(), img.height(), max_w, max_h);

    let mut frame = Frame::solid(width, height, background);
    if nw == 0 || nh == 0 {
        return frame;
    }
    let resized = if (nw, nh) == img.dimensions() {
        img.clone()
    } else {
        imageops::resize(img, nw, nh, FilterType::Lanczos3)
    };

    let ox = (width - nw as usize) / 2;
    let oy = (height - nh as usize) / 2;
    for (x, y, px) in resized.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let idx = (oy + y as usize) * width + ox + x as usize;
        frame.pixels[idx] = blend_over(frame.pixels[idx], rgb(r, g, b), a);
    }
    frame
}

/// Composite `src` at coverage `alpha` over `dst`.
fn blend_over(dst: u32, src: u32, alpha: u8) -> u32 {
    let t = alpha as u32;
    let mix = |shift: u32| {
        let d = (dst >> shift) & 0xFF;
        let s = (src >> shift) & 0xFF;
        ((s * t + d * (255 - t)) / 255) << shift
    };
    0xFF000000 | mix(16) | mix(8) | mix(0)
}

/// Convert HSV → packed ARGB (0xAARRGGBB, A=0xFF).
fn hsv_to_argb(h: f32, s: f32, v: f32) -> u32 {
    let h  = h.rem_euclid(360.0);
    let hi = (h / 60.0) as u32;
    let f  = h / 60.0 - hi as f32;
    let p  = v * (1.0 - s);
    let q  = v * (1.0 - s * f);
    let t  = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match hi {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    rgb((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
