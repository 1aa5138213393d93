pub mod settings;

pub use settings::{CoverOverride, Hub, Logger, Notification, Settings};
