use anyhow::{Context, Result};
use glam::UVec2;
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App, AppControl};
use crate::device::{Device, DeviceConfig, GpuInit, RenderDevice, WgpuBackend};
use crate::time::{FixedStep, FrameClock};

/// Window and loop configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    /// Fixed updates per second.
    pub fixed_rate: f32,
    pub gpu: GpuInit,
    pub device: DeviceConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "kiln".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            fixed_rate: 60.0,
            gpu: GpuInit::default(),
            device: DeviceConfig::default(),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window and drives `app` until it exits or the window closes.
    pub fn run<A>(config: RuntimeConfig, app: A) -> Result<()>
    where
        A: App + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = RuntimeState::new(config, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[not_covariant]
    device: Device<WgpuBackend<'this>>,
}

struct RuntimeState<A: App + 'static> {
    config: RuntimeConfig,
    app: A,

    window: Option<WindowEntry>,
    app_ready: bool,

    clock: FrameClock,
    fixed: FixedStep,

    exit_requested: bool,
    /// First fatal error; returned from [`Runtime::run`].
    error: Option<anyhow::Error>,
}

impl<A: App + 'static> RuntimeState<A> {
    fn new(config: RuntimeConfig, app: A) -> Self {
        let fixed = FixedStep::new(config.fixed_rate);
        Self {
            config,
            app,
            window: None,
            app_ready: false,
            clock: FrameClock::new(),
            fixed,
            exit_requested: false,
            error: None,
        }
    }

    fn fail(&mut self, error: anyhow::Error) {
        log::error!("{error:#}");
        self.error.get_or_insert(error);
        self.exit_requested = true;
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop.create_window(attrs).context("failed to create window")?;

        let gpu = self.config.gpu.clone();
        let device_config = self.config.device;

        let mut entry = WindowEntryTryBuilder {
            window,
            device_builder: |w| -> Result<_> {
                let backend = pollster::block_on(WgpuBackend::new(w, gpu))?;
                let size = backend.size();
                let size = UVec2::new(size.width.max(1), size.height.max(1));
                Device::new(backend, device_config, size).context("failed to create render device")
            },
        }
        .try_build()?;

        let app = &mut self.app;
        entry.with_device_mut(|device| app.init(device)).context("app init failed")?;
        self.app_ready = true;

        entry.with_window(|w| w.request_redraw());
        self.window = Some(entry);
        self.clock.reset();
        Ok(())
    }

    /// Disposes the app's resources, then the device, then the window.
    fn shutdown(&mut self) {
        let Some(mut entry) = self.window.take() else {
            return;
        };

        if self.app_ready {
            let app = &mut self.app;
            entry.with_device_mut(|device| app.dispose(device));
            self.app_ready = false;
        }

        log::info!("shutting down render device");
        drop(entry);
    }

    fn frame(&mut self) -> Result<AppControl> {
        let time = self.clock.tick();

        for _ in 0..self.fixed.advance(time.dt) {
            if self.app.fixed_update(self.fixed.step()) == AppControl::Exit {
                return Ok(AppControl::Exit);
            }
        }

        if self.app.update(time) == AppControl::Exit {
            return Ok(AppControl::Exit);
        }

        let (app, entry) = (&mut self.app, &mut self.window);
        let Some(entry) = entry.as_mut() else {
            return Ok(AppControl::Continue);
        };

        entry.with_mut(|fields| -> Result<()> {
            app.render(fields.device)?;
            fields.window.pre_present_notify();
            fields.device.present()
        })?;

        Ok(AppControl::Continue)
    }
}

impl<A: App + 'static> ApplicationHandler for RuntimeState<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.create_window(event_loop) {
            self.fail(e);
            self.shutdown();
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            self.shutdown();
            event_loop.exit();
            return;
        }

        // Continuous redraw.
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = &self.window {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if self.exit_requested {
            self.shutdown();
            event_loop.exit();
            return;
        }

        if self.app.on_window_event(&event) == AppControl::Exit {
            self.exit_requested = true;
        }

        match &event {
            WindowEvent::CloseRequested => {
                self.exit_requested = true;
            }

            WindowEvent::Resized(new_size) => {
                if let Some(entry) = self.window.as_mut() {
                    entry.with_device_mut(|device| device.backend_mut().resize(*new_size));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.window.as_mut() {
                    let new_size = entry.with_window(|w| w.inner_size());
                    entry.with_device_mut(|device| device.backend_mut().resize(new_size));
                }
            }

            WindowEvent::RedrawRequested if !self.exit_requested => match self.frame() {
                Ok(AppControl::Exit) => self.exit_requested = true,
                Ok(AppControl::Continue) => {}
                Err(e) => self.fail(e),
            },

            _ => {}
        }

        if self.exit_requested {
            self.shutdown();
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
