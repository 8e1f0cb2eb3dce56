//! Window, event and keyboard services for the frame loop.

mod headless;
mod keys;
mod window;
mod winit_window;

pub use headless::HeadlessWindow;
pub use keys::InputState;
pub use window::{WindowError, WindowService, WindowSettings, WindowSignal};
pub use winit_window::WinitWindow;

// Re-export for convenience
pub use winit::event::ElementState;
pub use winit::keyboard::KeyCode;
