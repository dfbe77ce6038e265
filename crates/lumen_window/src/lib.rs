use std::sync::Arc;

use lumen_core::time::Time;
use thiserror::Error;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("event loop failed: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    CreateWindow(#[from] winit::error::OsError),
    #[error("application failed to start: {0}")]
    Init(String),
}

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Lumen".into(),
            width: 1280,
            height: 720,
        }
    }
}

/// What the runner should do after a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application driven by [`run_app`].
pub trait WindowApp {
    /// Called once, when the window first exists.
    fn init(&mut self, window: Arc<Window>) -> Result<(), String>;

    /// Window input (keys, cursor, wheel). Resize and redraw go through
    /// [`WindowApp::resized`] and [`WindowApp::frame`].
    fn window_event(&mut self, _event: &WindowEvent) {}

    fn device_event(&mut self, _event: &DeviceEvent) {}

    fn resized(&mut self, width: u32, height: u32);

    fn frame(&mut self, time: &Time) -> AppControl;

    /// Called before the event loop exits. GPU work should be drained here.
    fn exiting(&mut self) {}
}

// Holds the app while waiting for the OS to hand us a window
struct Runner<A> {
    app: A,
    config: WindowConfig,
    window: Option<Arc<Window>>,
    time: Time,
    error: Option<WindowError>,
}

impl<A: WindowApp> Runner<A> {
    fn new(app: A, config: WindowConfig) -> Self {
        Self {
            app,
            config,
            window: None,
            time: Time::default(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: WindowError) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl<A: WindowApp> ApplicationHandler for Runner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };

        if let Err(e) = self.app.init(window.clone()) {
            return self.fail(event_loop, WindowError::Init(e));
        }
        self.window = Some(window);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if self.window.is_some() {
            self.app.device_event(&event);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if self.window.is_none() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.app.resized(size.width, size.height),
            WindowEvent::RedrawRequested => {
                // 1. Tick the clock
                self.time.update();

                // 2. Run the frame
                if self.app.frame(&self.time) == AppControl::Exit {
                    event_loop.exit();
                }
            }
            event => self.app.window_event(&event),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            self.app.exiting();
        }
    }
}

/// Opens a window and drives `app` until it exits or the window closes.
pub fn run_app<A: WindowApp>(app: A, config: WindowConfig) -> Result<(), WindowError> {
    let event_loop = EventLoop::new()?;

    // Poll keeps frames coming even without OS events.
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = Runner::new(app, config);
    event_loop.run_app(&mut runner)?;

    match runner.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_matches_the_default_camera_viewport() {
        let config = WindowConfig::default();
        let camera = lumen_core::Camera::default();
        assert_eq!((config.width, config.height), camera.viewport());
    }

    #[test]
    fn init_failures_carry_the_message() {
        let err = WindowError::Init("no adapter".into());
        assert_eq!(err.to_string(), "application failed to start: no adapter");
    }
}
