//! Desktop window backed by a pumped winit event loop.
//!
//! The frame loop owns the iteration, so events are pumped once per frame
//! instead of handing control to `EventLoop::run_app`.

use std::sync::Arc;
use std::time::Duration;

use engine_core::Time;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::keys::InputState;
use crate::window::{WindowError, WindowService, WindowSettings, WindowSignal};

const CREATE_ATTEMPTS: u32 = 100;

/// Application handler collecting signals between pumps.
struct Pump {
    attributes: WindowAttributes,
    window: Option<Arc<Window>>,
    signals: Vec<WindowSignal>,
    input: InputState,
    error: Option<String>,
}

impl ApplicationHandler for Pump {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(w) => self.window = Some(Arc::new(w)),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                self.error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.signals.push(WindowSignal::CloseRequested),
            WindowEvent::Resized(size) => self.signals.push(WindowSignal::Resized {
                width: size.width,
                height: size.height,
            }),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.input.process_keyboard(code, event.state);
                }
            }
            _ => {}
        }
    }
}

/// A real window. Create it on the main thread.
pub struct WinitWindow {
    event_loop: EventLoop<()>,
    pump: Pump,
    settings: WindowSettings,
    time: Time,
    delta: f32,
}

impl WinitWindow {
    pub fn new(settings: WindowSettings) -> Result<Self, WindowError> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let attributes = Window::default_attributes()
            .with_title(settings.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(settings.width, settings.height))
            .with_resizable(settings.resizable);

        let mut window = Self {
            event_loop,
            pump: Pump {
                attributes,
                window: None,
                signals: Vec::new(),
                input: InputState::new(),
                error: None,
            },
            settings,
            time: Time::new(),
            delta: 0.0,
        };

        for _ in 0..CREATE_ATTEMPTS {
            let status = window
                .event_loop
                .pump_app_events(Some(Duration::from_millis(10)), &mut window.pump);
            if let Some(error) = window.pump.error.take() {
                return Err(WindowError::Creation(error));
            }
            if window.pump.window.is_some() {
                break;
            }
            if let PumpStatus::Exit(code) = status {
                return Err(WindowError::Creation(format!("event loop exited with code {code}")));
            }
        }
        let Some(handle) = window.pump.window.as_ref() else {
            return Err(WindowError::Creation("window was never created".into()));
        };
        let size = handle.inner_size();
        log::info!("Created window '{}' ({}x{})", window.settings.title, size.width, size.height);
        window.pump.signals.clear();
        window.time.reset_frame_start();
        Ok(window)
    }

    /// The native window, for creating a surface.
    pub fn window(&self) -> Option<Arc<Window>> {
        self.pump.window.clone()
    }

    pub fn input(&self) -> &InputState {
        &self.pump.input
    }
}

impl WindowService for WinitWindow {
    fn poll_events(&mut self) -> Vec<WindowSignal> {
        self.pump.input.begin_frame();
        let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.pump);

        let mut signals = std::mem::take(&mut self.pump.signals);
        let close_key = self.settings.close_key.is_some_and(|key| self.pump.input.is_key_pressed(key));
        if matches!(status, PumpStatus::Exit(_)) || close_key {
            signals.push(WindowSignal::CloseRequested);
        }

        self.time.update();
        self.delta = self.time.delta_seconds();
        signals
    }

    fn delta_time(&self) -> f32 {
        self.delta
    }

    fn size(&self) -> (u32, u32) {
        match &self.pump.window {
            Some(window) => {
                let size = window.inner_size();
                (size.width, size.height)
            }
            None => (self.settings.width, self.settings.height),
        }
    }
}
