use anyhow::Result;
use winit::event::WindowEvent;

use crate::device::RenderDevice;
use crate::time::FrameTime;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract driven by [`Runtime`](crate::window::Runtime).
///
/// Per frame the runtime calls `fixed_update` zero or more times, then
/// `update`, then `render`, then presents. Resources created on the device
/// belong to the app and must be released in [`dispose`](Self::dispose),
/// which runs before the device is torn down.
pub trait App {
    /// Called once, after the device is ready.
    fn init(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        let _ = device;
        Ok(())
    }

    /// Called for window events, before the runtime handles them.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called at the fixed rate of the runtime's [`FixedStep`](crate::time::FixedStep).
    fn fixed_update(&mut self, step: f32) -> AppControl {
        let _ = step;
        AppControl::Continue
    }

    fn update(&mut self, time: FrameTime) -> AppControl;

    /// Draws the frame into the device framebuffer.
    fn render(&mut self, device: &mut dyn RenderDevice) -> Result<()>;

    fn dispose(&mut self, device: &mut dyn RenderDevice);
}
