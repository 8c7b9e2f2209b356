//! Sandboxed capture of what a module's registration writes.

pub mod loader;
pub mod session;
pub mod typelib;

#[cfg(windows)]
pub use loader::LibLoader;
pub use session::{CaptureOutput, CaptureSession};
