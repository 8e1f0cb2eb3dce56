//! The window service contract used by the frame loop.

use thiserror::Error;

/// Events the frame loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    CloseRequested,
    Resized { width: u32, height: u32 },
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Creation(String),
}

/// Window creation parameters.
#[derive(Debug, Clone)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    /// Key that requests a close, like the close button does.
    pub close_key: Option<winit::keyboard::KeyCode>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "FrameBench".to_string(),
            width: 1280,
            height: 720,
            resizable: false,
            close_key: Some(winit::keyboard::KeyCode::Escape),
        }
    }
}

/// A window (or a stand-in for one) driving the frame loop.
pub trait WindowService {
    /// Process pending events and start a new frame.
    fn poll_events(&mut self) -> Vec<WindowSignal>;
    /// Seconds between the last two `poll_events` calls.
    fn delta_time(&self) -> f32;
    /// Client area in physical pixels.
    fn size(&self) -> (u32, u32);
}
