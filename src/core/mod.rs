pub mod config;
pub mod logging;
pub mod types;

pub use config::GrabberConfig;
