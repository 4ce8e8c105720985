//! Error taxonomy shared by every loop and the orchestrator.

use thiserror::Error;

/// Everything that can go wrong while setting up or running a scene.
///
/// Only `DeviceUnavailable` and `Configuration` are fatal at startup.
/// `FrameReadFailure` ends the sensing loop, `RenderFailure` skips one tick.
#[derive(Debug, Error)]
pub enum SceneError {
    /// Camera, tracker or display could not be opened.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The tracker failed to deliver a frame.
    #[error("frame read failure: {0}")]
    FrameReadFailure(String),

    /// Compositing or swapping a frame failed.
    #[error("render failure: {0}")]
    RenderFailure(String),

    /// Missing asset or out-of-range setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A loop did not acknowledge the stop signal in time.
    #[error("{loop_name} loop did not exit within {timeout_ms} ms")]
    ShutdownTimeout {
        loop_name: &'static str,
        timeout_ms: u64,
    },
}

impl SceneError {
    pub fn config(message: impl Into<String>) -> Self {
        SceneError::Configuration(message.into())
    }

    /// True for errors that must abort scene startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SceneError::DeviceUnavailable(_) | SceneError::Configuration(_)
        )
    }
}
