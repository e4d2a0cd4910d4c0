pub mod download;
pub mod grabber;
pub mod hotkeys;

pub use grabber::{Grabber, TriggerHandler};
