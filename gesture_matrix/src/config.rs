//! Scene configuration: presets, TOML files and `GESTURE_MATRIX_*`
//! environment overrides.
//!
//! Precedence, lowest first: preset → TOML file → environment.  Every field
//! has a default, so a file only needs the keys it changes:
//!
//! ```toml
//! name = "lobby"
//!
//! [background]
//! kind = "gif"
//! path = "res/gifs/city.gif"
//!
//! [overlay]
//! text  = { kind = "clock", format = "%H:%M" }
//! color = [255, 200, 0]
//!
//! [timing]
//! debounce_ms = 250
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::display::rgb;
use crate::error::SceneError;
use crate::gesture::DEFAULT_THRESHOLD;
use crate::render::{OverlayText, RenderConfig};
use crate::state_machine::{ControlMode, MachineConfig};

pub const ENV_PREFIX: &str = "GESTURE_MATRIX_";

// ════════════════════════════════════════════════════════════════════════════
// Sections
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PanelConfig {
    pub width:        usize,
    pub height:       usize,
    /// Emulator window pixels per LED.
    pub window_scale: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig { width: 64, height: 64, window_scale: 8 }
    }
}

/// Where the looping background comes from.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundSource {
    /// Generated hue cycle; needs no assets.
    Placeholder {
        #[serde(default = "default_placeholder_frames")]
        frames: usize,
    },
    /// Animated GIF, every frame fitted to the panel.
    Gif { path: PathBuf },
    /// One still image shrunk onto a solid background (album art).
    Still {
        path: PathBuf,
        #[serde(default = "default_shrink")]
        shrink: f32,
        #[serde(default = "default_still_background")]
        background: [u8; 3],
    },
}

fn default_placeholder_frames() -> usize { 48 }
fn default_shrink() -> f32 { 0.5 }
fn default_still_background() -> [u8; 3] { [245, 236, 205] }

impl Default for BackgroundSource {
    fn default() -> Self {
        BackgroundSource::Placeholder { frames: default_placeholder_frames() }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    pub text:  OverlayText,
    pub color: [u8; 3],
    /// Top edge of the text, in panel pixels.
    pub y:     i32,
    pub scale: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            text:  OverlayText::clock(),
            color: [255, 255, 255],
            y:     4,
            scale: 2,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub mode:                ControlMode,
    pub brightness_step:     u8,
    pub volume_step:         f32,
    /// Classifier dead band around the wrist, normalised units.
    pub threshold:           f32,
    pub start_armed:         bool,
    pub start_toggles_pause: bool,
    pub initial_brightness:  u8,
    pub initial_volume:      f32,
    /// Read `+ - p q` commands from stdin.
    pub console:             bool,
    /// MIDI channel the mixer drives (0–15).
    pub midi_channel:        u8,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            mode:                ControlMode::Brightness,
            brightness_step:     10,
            volume_step:         0.01,
            threshold:           DEFAULT_THRESHOLD,
            start_armed:         false,
            start_toggles_pause: false,
            initial_brightness:  50,
            initial_volume:      0.5,
            console:             false,
            midi_channel:        0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_ms:            u64,
    pub wait_poll_ms:       u64,
    pub sensing_poll_ms:    u64,
    pub debounce_ms:        u64,
    pub toggle_debounce_ms: u64,
    pub toggle_cooldown_ms: u64,
    pub join_timeout_ms:    u64,
    pub wait_until_active:  bool,
    pub wait_when_paused:   bool,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            tick_ms:            50,
            wait_poll_ms:       100,
            sensing_poll_ms:    100,
            debounce_ms:        300,
            toggle_debounce_ms: 3000,
            toggle_cooldown_ms: 3000,
            join_timeout_ms:    3000,
            wait_until_active:  false,
            wait_when_paused:   false,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SceneConfig
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    pub name:       String,
    pub panel:      PanelConfig,
    pub background: BackgroundSource,
    pub overlay:    OverlayConfig,
    pub control:    ControlConfig,
    pub timing:     TimingConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig::main_scene()
    }
}

/// Clock scrolling over a looping GIF; Up/Down adjust brightness.
pub fn main_scene() -> SceneConfig {
    SceneConfig::main_scene()
}

/// Song title scrolling over album art; Up/Down adjust volume and Start
/// pauses or resumes.
pub fn music_scene(title: &str) -> SceneConfig {
    SceneConfig::music_scene(title)
}

impl SceneConfig {
    pub fn main_scene() -> Self {
        SceneConfig {
            name:       "main".to_string(),
            panel:      PanelConfig::default(),
            background: BackgroundSource::Gif { path: PathBuf::from("res/gifs/city.gif") },
            overlay:    OverlayConfig::default(),
            control:    ControlConfig::default(),
            timing:     TimingConfig::default(),
        }
    }

    pub fn music_scene(title: &str) -> Self {
        let panel = PanelConfig::default();
        SceneConfig {
            name:  "music".to_string(),
            background: BackgroundSource::Still {
                path:       PathBuf::from("res/album.png"),
                shrink:     default_shrink(),
                background: default_still_background(),
            },
            overlay: OverlayConfig {
                text:  OverlayText::Static { text: title.to_string() },
                color: [4, 4, 3],
                y:     panel.height as i32 - 14,
                scale: 2,
            },
            control: ControlConfig {
                mode:                ControlMode::Volume,
                volume_step:         0.1,
                start_toggles_pause: true,
                console:             true,
                ..ControlConfig::default()
            },
            timing: TimingConfig {
                wait_until_active: true,
                wait_when_paused:  true,
                ..TimingConfig::default()
            },
            panel,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SceneError> {
        toml::from_str(raw).map_err(|e| SceneError::config(format!("invalid scene config: {}", e)))
    }

    /// Read a TOML file, then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| SceneError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut cfg = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), scene = %cfg.name, "scene config loaded");
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `GESTURE_MATRIX_*` overrides.  `lookup` is `std::env::var` in
    /// production.  Unparseable values are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

        if let Some(v) = get("GIF") {
            self.background = BackgroundSource::Gif { path: PathBuf::from(v) };
        }
        if let Some(v) = get("TITLE") {
            self.overlay.text = OverlayText::Static { text: v };
        }
        if let Some(v) = get("MODE") {
            match v.to_ascii_lowercase().as_str() {
                "brightness" => self.control.mode = ControlMode::Brightness,
                "volume"     => self.control.mode = ControlMode::Volume,
                _ => warn!(value = %v, "ignoring {}MODE", ENV_PREFIX),
            }
        }

        override_parsed(&get, "BRIGHTNESS", &mut self.control.initial_brightness);
        override_parsed(&get, "VOLUME", &mut self.control.initial_volume);
        override_parsed(&get, "BRIGHTNESS_STEP", &mut self.control.brightness_step);
        override_parsed(&get, "VOLUME_STEP", &mut self.control.volume_step);
        override_parsed(&get, "THRESHOLD", &mut self.control.threshold);
        override_parsed(&get, "START_ARMED", &mut self.control.start_armed);
        override_parsed(&get, "CONSOLE", &mut self.control.console);
        override_parsed(&get, "MIDI_CHANNEL", &mut self.control.midi_channel);
        override_parsed(&get, "WINDOW_SCALE", &mut self.panel.window_scale);
        override_parsed(&get, "TICK_MS", &mut self.timing.tick_ms);
        override_parsed(&get, "DEBOUNCE_MS", &mut self.timing.debounce_ms);
        override_parsed(&get, "TOGGLE_DEBOUNCE_MS", &mut self.timing.toggle_debounce_ms);
        override_parsed(&get, "TOGGLE_COOLDOWN_MS", &mut self.timing.toggle_cooldown_ms);
        override_parsed(&get, "JOIN_TIMEOUT_MS", &mut self.timing.join_timeout_ms);
    }

    /// Reject values the loops cannot run with.
    pub fn validate(&self) -> Result<(), SceneError> {
        let p = &self.panel;
        if p.width == 0 || p.height == 0 {
            return Err(SceneError::config(format!("panel must be non-empty, got {}x{}", p.width, p.height)));
        }
        if self.overlay.scale == 0 {
            return Err(SceneError::config("overlay.scale must be at least 1"));
        }
        if let OverlayText::Clock { format } = &self.overlay.text {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(SceneError::config(format!("invalid clock format {:?}", format)));
            }
        }
        match &self.background {
            BackgroundSource::Placeholder { frames } if *frames == 0 => {
                return Err(SceneError::config("placeholder background needs at least one frame"));
            }
            BackgroundSource::Still { shrink, .. } if !(*shrink > 0.0 && *shrink <= 1.0) => {
                return Err(SceneError::config(format!("background.shrink must be in (0, 1], got {}", shrink)));
            }
            _ => {}
        }

        let c = &self.control;
        if c.initial_brightness > 100 {
            return Err(SceneError::config(format!("initial_brightness {} exceeds 100", c.initial_brightness)));
        }
        if !(0.0..=1.0).contains(&c.initial_volume) {
            return Err(SceneError::config(format!("initial_volume {} outside [0, 1]", c.initial_volume)));
        }
        if !(c.volume_step.is_finite() && c.volume_step >= 0.0) {
            return Err(SceneError::config(format!("volume_step {} must be a non-negative number", c.volume_step)));
        }
        if !(c.threshold.is_finite() && c.threshold >= 0.0) {
            return Err(SceneError::config(format!("threshold {} must be a non-negative number", c.threshold)));
        }
        if c.midi_channel > 15 {
            return Err(SceneError::config(format!("midi_channel {} outside 0-15", c.midi_channel)));
        }

        let t = &self.timing;
        for (name, value) in [
            ("tick_ms", t.tick_ms),
            ("wait_poll_ms", t.wait_poll_ms),
            ("sensing_poll_ms", t.sensing_poll_ms),
        ] {
            if value == 0 {
                return Err(SceneError::config(format!("timing.{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration { Duration::from_millis(self.timing.tick_ms) }
    pub fn join_timeout(&self) -> Duration { Duration::from_millis(self.timing.join_timeout_ms) }
    pub fn sensing_poll(&self) -> Duration { Duration::from_millis(self.timing.sensing_poll_ms) }

    pub fn text_color(&self) -> u32 {
        let [r, g, b] = self.overlay.color;
        rgb(r, g, b)
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            mode:                self.control.mode,
            brightness_step:     self.control.brightness_step,
            volume_step:         self.control.volume_step,
            debounce:            Duration::from_millis(self.timing.debounce_ms),
            start_toggles_pause: self.control.start_toggles_pause,
            toggle_debounce:     Duration::from_millis(self.timing.toggle_debounce_ms),
            toggle_cooldown:     Duration::from_millis(self.timing.toggle_cooldown_ms),
            start_armed:         self.control.start_armed,
        }
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            tick:              self.tick(),
            wait_poll:         Duration::from_millis(self.timing.wait_poll_ms),
            wait_until_active: self.timing.wait_until_active,
            wait_when_paused:  self.timing.wait_when_paused,
            overlay:           self.overlay.text.clone(),
            text_color:        self.text_color(),
            text_y:            self.overlay.y,
            font_scale:        self.overlay.scale,
        }
    }
}

fn override_parsed<T, G>(get: &G, suffix: &str, slot: &mut T)
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(suffix) else { return };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warn!(value = %raw, "ignoring {}{}: not a valid value", ENV_PREFIX, suffix),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (format!("{}{}", ENV_PREFIX, k), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn presets_validate() {
        main_scene().validate().unwrap();
        music_scene("Song").validate().unwrap();
    }

    #[test]
    fn music_preset_uses_volume_and_toggle() {
        let cfg = music_scene("Song");
        let m = cfg.machine_config();
        assert_eq!(m.mode, ControlMode::Volume);
        assert!(m.start_toggles_pause);
        assert_eq!(m.toggle_cooldown, Duration::from_secs(3));
        assert!(cfg.control.console);
        assert_eq!(cfg.overlay.text, OverlayText::Static { text: "Song".into() });
    }

    #[test]
    fn main_preset_debounces_at_300ms() {
        let m = main_scene().machine_config();
        assert_eq!(m.mode, ControlMode::Brightness);
        assert_eq!(m.debounce, Duration::from_millis(300));
        assert!(!m.start_toggles_pause);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = SceneConfig::from_toml_str(
            r#"
            name = "lobby"
            [background]
            kind = "placeholder"
            [control]
            mode = "volume"
            [timing]
            debounce_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(cfg.name, "lobby");
        assert_eq!(cfg.background, BackgroundSource::Placeholder { frames: 48 });
        assert_eq!(cfg.control.mode, ControlMode::Volume);
        assert_eq!(cfg.control.initial_brightness, 50);
        assert_eq!(cfg.timing.debounce_ms, 250);
        assert_eq!(cfg.timing.tick_ms, 50);
    }

    #[test]
    fn still_background_defaults_to_goose_yellow() {
        let cfg = SceneConfig::from_toml_str("[background]\nkind = \"still\"\npath = \"a.png\"\n").unwrap();
        match cfg.background {
            BackgroundSource::Still { shrink, background, .. } => {
                assert_eq!(shrink, 0.5);
                assert_eq!(background, [245, 236, 205]);
            }
            other => panic!("unexpected background {:?}", other),
        }
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        let err = SceneConfig::from_toml_str("timing = 3").unwrap_err();
        assert!(matches!(err, SceneError::Configuration(_)));
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let mut cfg = main_scene();
        cfg.apply_env(env(&[
            ("BRIGHTNESS", "80"),
            ("MODE", "volume"),
            ("DEBOUNCE_MS", "not-a-number"),
            ("TITLE", "hello"),
        ]));
        assert_eq!(cfg.control.initial_brightness, 80);
        assert_eq!(cfg.control.mode, ControlMode::Volume);
        assert_eq!(cfg.timing.debounce_ms, 300);
        assert_eq!(cfg.overlay.text, OverlayText::Static { text: "hello".into() });
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = main_scene();
        cfg.control.initial_brightness = 101;
        assert!(cfg.validate().is_err());

        let mut cfg = main_scene();
        cfg.control.initial_volume = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = main_scene();
        cfg.timing.tick_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = main_scene();
        cfg.panel.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = main_scene();
        cfg.overlay.text = OverlayText::Clock { format: "%Q".into() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = SceneConfig::load(Path::new("/no/such/scene.toml")).unwrap_err();
        assert!(matches!(err, SceneError::Configuration(_)));
    }
}
