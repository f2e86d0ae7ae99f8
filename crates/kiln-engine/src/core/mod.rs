//! Core engine-facing contracts.
//!
//! This module defines the interface between the runtime (platform loop) and
//! the application. The app never sees the backend type; it draws through
//! `&mut dyn RenderDevice`.

mod app;

pub use app::{App, AppControl};
