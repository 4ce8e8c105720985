//! # gesture_matrix
//!
//! Hand-gesture control for small LED matrix panels.  Two loops run side by
//! side: a sensing loop classifies hand poses and adjusts shared control
//! state, and a render loop scrolls a text overlay across a looping
//! background at a fixed frame rate.
//!
//! ## Gesture → Action mapping
//!
//! | Gesture | Condition | Action |
//! |---|---|---|
//! | Open hand (Start) | not yet armed | Arm the scene (one-shot) |
//! | Open hand (Start) | armed, music scene | Pause / resume (3 s debounce + cooldown) |
//! | Thumb up (Up) | armed | Brightness +10, or volume +step |
//! | Thumb down (Down) | armed | Brightness −10, or volume −step |
//! | Anything else (Neutral) | | nothing |
//!
//! Repeated Up/Down is debounced: a held pose acts again only once the
//! debounce interval has passed, while a change of pose acts immediately.
//!
//! ## Feature flags
//!
//! * (default): **Simulation mode**: a `minifb` window emulates the panel
//!   and held keys stand in for hand poses.
//! * `leap`: **Hardware mode**: polls a real LeapMotion controller via LeapC.
//!
//! ### Simulation keyboard shortcuts
//!
//! | Key | Pose |
//! |---|---|
//! | `Space` / `O` | Open hand |
//! | `Up` | Thumb up |
//! | `Down` | Thumb down |
//! | `F` | Fist |
//! | `Q` / `Escape` | Quit |

pub mod error;
pub mod gesture;
pub mod state_machine;
pub mod signal;
pub mod mixer;
pub mod control;
pub mod tracker;
pub mod display;
pub mod font;
pub mod frames;
pub mod render;
pub mod sensing;
pub mod console;
pub mod config;
pub mod scene;
pub mod app;
