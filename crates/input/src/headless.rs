//! Window stand-in for headless runs and tests.

use std::collections::VecDeque;

use crate::window::{WindowService, WindowSignal};

/// Fixed-step window with no event source other than a script.
#[derive(Debug)]
pub struct HeadlessWindow {
    width: u32,
    height: u32,
    delta: f32,
    frame: u64,
    close_after: Option<u64>,
    scripted: VecDeque<(u64, WindowSignal)>,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32, delta: f32) -> Self {
        Self {
            width,
            height,
            delta,
            frame: 0,
            close_after: None,
            scripted: VecDeque::new(),
        }
    }

    /// Request a close on frame `frame` (1-based).
    pub fn close_after(mut self, frame: u64) -> Self {
        self.close_after = Some(frame);
        self
    }

    /// Deliver `signal` on frame `frame` (1-based). Signals must be scripted in frame order.
    pub fn script(mut self, frame: u64, signal: WindowSignal) -> Self {
        self.scripted.push_back((frame, signal));
        self
    }

    pub fn frames_polled(&self) -> u64 {
        self.frame
    }
}

impl WindowService for HeadlessWindow {
    fn poll_events(&mut self) -> Vec<WindowSignal> {
        self.frame += 1;
        let mut signals = Vec::new();
        while let Some((frame, signal)) = self.scripted.front().copied() {
            if frame > self.frame {
                break;
            }
            self.scripted.pop_front();
            if let WindowSignal::Resized { width, height } = signal {
                self.width = width;
                self.height = height;
            }
            signals.push(signal);
        }
        if self.close_after == Some(self.frame) {
            signals.push(WindowSignal::CloseRequested);
        }
        signals
    }

    fn delta_time(&self) -> f32 {
        self.delta
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
