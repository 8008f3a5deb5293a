//! Browser layer: context abstraction, chromium backend and errors.

mod chromium;
mod context;
mod errors;

pub use chromium::ChromiumLauncher;
pub use context::{
    BrowserContext, BrowserPage, ContextLauncher, ContextOptions, DESKTOP_WINDOW,
    DEVICE_SCALE_FACTOR, MOBILE_WINDOW,
};
pub use errors::BrowserError;
