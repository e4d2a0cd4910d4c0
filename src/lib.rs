pub mod core;
pub mod features;
pub mod scraping;
pub mod setup;

pub use crate::core::types::*;
pub use crate::core::GrabberConfig;
pub use features::{download, grabber, hotkeys, Grabber, TriggerHandler};
pub use scraping::{browser_manager, network_log, NetworkLog};
